//! services/api/src/adapters/classify_llm.rs
//!
//! This module contains the adapter that tags a finished tutoring session.
//! It implements the `ClassificationService` port from the `core` crate.

const CLASSIFY_INSTRUCTIONS: &str = r#"You review a tutoring conversation about a student's mistake on one problem.

Identify:
- the concept tags the mistake belongs to (1 to 5 short topic names, e.g. "fraction addition", "unit conversion")
- the difficulty of the problem for this student, from 1 (very easy) to 5 (very hard)

Reply with EXACTLY two lines and nothing else:
TAGS: tag one; tag two
DIFFICULTY: n"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use socrates_core::domain::{ChatMessage, Classification, DifficultyRating, Role};
use socrates_core::ports::{ClassificationService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ClassificationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiClassifierAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClassifierAdapter {
    /// Creates a new `OpenAiClassifierAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Renders the transcript as plain text, problem first.
fn render_transcript(transcript: &[ChatMessage]) -> String {
    transcript
        .iter()
        .map(|m| match m.role {
            Role::System => format!("PROBLEM: {}", m.content),
            Role::User => format!("STUDENT: {}", m.content),
            Role::Assistant => format!("TUTOR: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads the `TAGS:` and `DIFFICULTY:` lines out of the model's answer.
pub fn parse_classification(answer: &str) -> PortResult<Classification> {
    let tags_re = Regex::new(r"(?im)^\s*TAGS:\s*(.*)$")
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    let difficulty_re = Regex::new(r"(?im)^\s*DIFFICULTY:\s*(\d+)")
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

    let concept_tags = tags_re
        .captures(answer)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split([';', ','])
                .map(|t| t.trim().trim_matches('"').to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let difficulty = difficulty_re
        .captures(answer)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .ok_or_else(|| {
            PortError::Unexpected(format!("Classifier gave no difficulty: '{}'", answer))
        })?;
    let difficulty =
        DifficultyRating::new(difficulty).map_err(|e| PortError::Unexpected(e.to_string()))?;

    Ok(Classification {
        concept_tags,
        difficulty,
    })
}

//=========================================================================================
// `ClassificationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ClassificationService for OpenAiClassifierAdapter {
    async fn classify(&self, transcript: &[ChatMessage]) -> PortResult<Classification> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(CLASSIFY_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(render_transcript(transcript))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Classifier returned no text content.".to_string())
            })?;

        parse_classification(&answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn parses_tags_and_difficulty() {
        let c = parse_classification("TAGS: Fraction addition; common denominators\nDIFFICULTY: 3")
            .unwrap();
        assert_eq!(c.concept_tags, vec!["fraction addition", "common denominators"]);
        assert_eq!(c.difficulty.value(), 3);
    }

    #[test]
    fn tolerates_chatter_and_commas() {
        let c = parse_classification(
            "Sure!\n  tags: \"moles\", stoichiometry\n difficulty: 5 (hard)\n",
        )
        .unwrap();
        assert_eq!(c.concept_tags, vec!["moles", "stoichiometry"]);
        assert_eq!(c.difficulty.value(), 5);
    }

    #[test]
    fn rejects_missing_or_out_of_range_difficulty() {
        assert!(parse_classification("TAGS: vectors").is_err());
        assert!(parse_classification("TAGS: vectors\nDIFFICULTY: 9").is_err());
    }

    #[test]
    fn transcript_labels_each_speaker() {
        let now = Utc::now();
        let transcript = vec![
            ChatMessage { role: Role::System, content: "2x = 6".into(), sent_at: now },
            ChatMessage { role: Role::User, content: "x = 4".into(), sent_at: now },
            ChatMessage { role: Role::Assistant, content: "What is 2 times 4?".into(), sent_at: now },
        ];
        assert_eq!(
            render_transcript(&transcript),
            "PROBLEM: 2x = 6\nSTUDENT: x = 4\nTUTOR: What is 2 times 4?"
        );
    }
}
