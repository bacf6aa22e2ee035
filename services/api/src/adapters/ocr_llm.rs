//! services/api/src/adapters/ocr_llm.rs
//!
//! This module contains the adapter for the vision model that reads photographed problems.
//! It implements the `RecognitionService` port from the `core` crate.

const OCR_INSTRUCTIONS: &str = r#"Carefully transcribe all of the text in this image.

Requirements:
1. Recognize every piece of text exactly, including mathematical formulas and symbols.
2. Keep the original layout and line breaks.
3. For math, physics or chemistry problems, keep every symbol, unit and formula.
4. If there is a figure or chart, describe it in one short sentence.
5. Output only the recognized text. Do not add explanations.
6. Spaces are ordinary spaces. Never write $ or other markup to stand for a space.
7. Do not add any formatting symbols.

Output the recognition result directly:"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
        ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use socrates_core::domain::ImagePayload;
use socrates_core::ports::{PortError, PortResult, RecognitionService};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `RecognitionService` using an OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiVisionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiVisionAdapter {
    /// Creates a new `OpenAiVisionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn data_url(image: &ImagePayload) -> String {
        format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.bytes))
    }
}

//=========================================================================================
// `RecognitionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecognitionService for OpenAiVisionAdapter {
    /// Sends the image as a data URL and returns the transcribed text.
    async fn recognize(&self, image: &ImagePayload) -> PortResult<String> {
        let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(Self::data_url(image))
                        .detail(ImageDetail::High)
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?,
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(OCR_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(parts)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(2000u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Vision model returned no text content.".to_string())
            })?;

        debug!(chars = text.len(), "Vision model answered.");
        Ok(text)
    }

    /// A one-token request; any API failure reads as "unreachable".
    async fn probe(&self) -> PortResult<bool> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestUserMessageArgs::default()
                .content("ping")
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into()])
            .max_tokens(1u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        match self.client.chat().create(request).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("Vision probe failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_embeds_mime_and_base64() {
        let image = ImagePayload::new("image/png", vec![0x89, b'P', b'N', b'G']);
        assert_eq!(OpenAiVisionAdapter::data_url(&image), "data:image/png;base64,iVBORw==");
    }
}
