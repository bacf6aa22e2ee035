//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use socrates_core::{ImageEncoding, RecognitionSettings, TutorTheme};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the service keeps records in memory.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub vision_model: String,
    pub classify_model: String,
    pub tutor_model: String,
    pub tutor_theme: TutorTheme,
    pub cors_origin: String,
    pub recognition: RecognitionSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        // --- AI Provider Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let openai_base_url = lookup("OPENAI_BASE_URL");
        let vision_model = var_or("VISION_MODEL", "gpt-4o");
        let classify_model = var_or("CLASSIFY_MODEL", "gpt-4o-mini");
        let tutor_model = var_or("TUTOR_MODEL", "gpt-4o");
        let tutor_theme = var_or("TUTOR_THEME", "junior")
            .parse::<TutorTheme>()
            .map_err(|e| ConfigError::InvalidValue("TUTOR_THEME".to_string(), e.to_string()))?;

        // --- Recognition Limits ---
        let max_image_mb = parse_number::<usize>("MAX_IMAGE_MB", &var_or("MAX_IMAGE_MB", "10"))?;
        let timeout_secs = parse_number::<u64>(
            "RECOGNITION_TIMEOUT_SECS",
            &var_or("RECOGNITION_TIMEOUT_SECS", "60"),
        )?;
        let accepted_encodings = var_or(
            "ACCEPTED_IMAGE_TYPES",
            "image/jpeg,image/png,image/webp",
        )
        .split(',')
        .map(|mime| {
            ImageEncoding::from_mime(mime).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "ACCEPTED_IMAGE_TYPES".to_string(),
                    format!("'{}' is not a supported image type", mime.trim()),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            openai_base_url,
            vision_model,
            classify_model,
            tutor_model,
            tutor_theme,
            cors_origin,
            recognition: RecognitionSettings {
                max_image_bytes: max_image_mb * 1024 * 1024,
                accepted_encodings,
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), format!("'{}' is not a valid number", raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_any_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.recognition.max_image_bytes, 10 * 1024 * 1024);
        assert_eq!(config.recognition.timeout, Duration::from_secs(60));
        assert_eq!(config.recognition.accepted_encodings.len(), 3);
        assert_eq!(config.tutor_theme, TutorTheme::Junior);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("MAX_IMAGE_MB", "2"),
            ("RECOGNITION_TIMEOUT_SECS", "15"),
            ("ACCEPTED_IMAGE_TYPES", "image/png"),
            ("TUTOR_THEME", "senior"),
            ("DATABASE_URL", "postgres://localhost/socrates"),
        ])
        .unwrap();
        assert_eq!(config.recognition.max_image_bytes, 2 * 1024 * 1024);
        assert_eq!(config.recognition.timeout, Duration::from_secs(15));
        assert_eq!(config.recognition.accepted_encodings, vec![ImageEncoding::Png]);
        assert_eq!(config.tutor_theme, TutorTheme::Senior);
        assert!(config.database_url.is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("ACCEPTED_IMAGE_TYPES", "image/gif")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "ACCEPTED_IMAGE_TYPES"
        ));
        assert!(matches!(
            load(&[("MAX_IMAGE_MB", "ten")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "MAX_IMAGE_MB"
        ));
        assert!(load(&[("BIND_ADDRESS", "nowhere")]).is_err());
    }
}
