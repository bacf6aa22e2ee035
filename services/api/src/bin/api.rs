//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        db::DbAdapter, classify_llm::OpenAiClassifierAdapter, ocr_llm::OpenAiVisionAdapter,
        tutor_llm::OpenAiTutorAdapter,
    },
    config::{Config, ConfigError},
    error::ApiError,
    web::{
        availability_handler, due_reviews_handler, errors_handler, rest::ApiDoc, state::AppState,
        stats_handler, submit_outcome_handler, weak_topics_handler, ws_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use socrates_core::{ErrorBook, MemoryStore, RecordStore, SystemClock};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Choose the Record Store ---
    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set; records are kept in memory and lost on restart.");
            Arc::new(MemoryStore::new())
        }
    };
    let book = Arc::new(
        ErrorBook::new(store, Arc::new(SystemClock))
            .with_classify_timeout(config.recognition.timeout),
    );

    // --- 3. Initialize Service Adapters ---
    let api_key = config
        .openai_api_key
        .as_ref()
        .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
    let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(base_url) = &config.openai_base_url {
        openai_config = openai_config.with_api_base(base_url);
    }
    let openai_client = Client::with_config(openai_config);

    let recognizer = Arc::new(OpenAiVisionAdapter::new(
        openai_client.clone(),
        config.vision_model.clone(),
    ));
    let classifier = Arc::new(OpenAiClassifierAdapter::new(
        openai_client.clone(),
        config.classify_model.clone(),
    ));
    let tutor = Arc::new(OpenAiTutorAdapter::new(
        openai_client,
        config.tutor_model.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        book,
        config: config.clone(),
        recognizer,
        classifier,
        tutor,
    });

    // --- 5. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let api_router = Router::new()
        .route("/capture", get(ws_handler))
        .route("/students/{id}/reviews/due", get(due_reviews_handler))
        .route("/students/{id}/stats", get(stats_handler))
        .route("/students/{id}/weak-topics", get(weak_topics_handler))
        .route("/students/{id}/errors", get(errors_handler))
        .route("/reviews/{id}/outcome", post(submit_outcome_handler))
        .route("/recognition/availability", get(availability_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
