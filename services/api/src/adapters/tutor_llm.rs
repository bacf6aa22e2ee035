//! services/api/src/adapters/tutor_llm.rs
//!
//! This module contains the adapter for the Socratic tutor LLM.
//! It implements the `TutorService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use socrates_core::domain::{ChatMessage, Role, TutorTheme};
use socrates_core::ports::{PortError, PortResult, TutorService};

//=========================================================================================
// Prompt Construction
//=========================================================================================

const SOCRATIC_RULES: &str = r#"You are a Socratic tutor helping a student understand a problem they got wrong.

Rules:
1. Never give the final answer or a full worked solution.
2. Ask exactly one guiding question per reply.
3. Build on what the student just said. If they are right, confirm briefly and go one step further.
4. If they are stuck, break the step into a smaller question or point at the relevant concept.
5. Keep replies short (at most three sentences)."#;

fn theme_voice(theme: TutorTheme) -> &'static str {
    match theme {
        TutorTheme::Junior => {
            "The student is in primary or junior school. Use simple words, a warm and encouraging tone, and everyday examples."
        }
        TutorTheme::Senior => {
            "The student is in senior school. Be concise and precise, use proper terminology, and expect formal reasoning."
        }
    }
}

/// The system prompt for one session: rules, tone and the problem itself.
fn system_prompt(theme: TutorTheme, problem_text: &str) -> String {
    format!(
        "{}\n\n{}\n\nThe problem the student is working on:\n{}",
        SOCRATIC_RULES,
        theme_voice(theme),
        problem_text
    )
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TutorService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTutorAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTutorAdapter {
    /// Creates a new `OpenAiTutorAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn build_messages(
        theme: TutorTheme,
        problem_text: &str,
        conversation: &[ChatMessage],
    ) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(conversation.len() + 1);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt(theme, problem_text))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );

        for message in conversation {
            let mapped: ChatCompletionRequestMessage = match message.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                // Hidden markers stay out of the tutor's context.
                Role::System => continue,
            };
            messages.push(mapped);
        }
        Ok(messages)
    }
}

//=========================================================================================
// `TutorService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TutorService for OpenAiTutorAdapter {
    async fn reply(
        &self,
        theme: TutorTheme,
        problem_text: &str,
        conversation: &[ChatMessage],
    ) -> PortResult<String> {
        let messages = Self::build_messages(theme, problem_text, conversation)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PortError::Unexpected("Tutor returned an empty reply.".to_string()))?;

        Ok(reply)
    }
}
