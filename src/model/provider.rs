//! Adapter from edgequake-llm providers to [`GenerativeModel`].
//!
//! edgequake-llm speaks plain chat completions, so two things differ from
//! the Gemini backend:
//!
//! 1. The response schema cannot be enforced server-side; it is appended to
//!    the prompt as an instruction and the resilient decoder does the rest.
//! 2. There is no incremental stream. [`GenerativeModel::generate_stream`]
//!    yields the complete answer as a single fragment, so Phase-1 progress
//!    jumps straight to the end of its band.
//!
//! The PDF itself travels as an `ImageData` attachment with mime type
//! `application/pdf`. Most chat providers accept only `image/*` there and
//! reject the Phase-1 request; upstream errors for such requests carry a
//! hint pointing at the Gemini backend, which reads PDFs natively.

use super::{GenerativeModel, ModelRequest, ModelResponse, TextStream};
use crate::error::BookError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A [`GenerativeModel`] backed by an edgequake-llm provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Instantiate a named provider (`openai`, `anthropic`, `ollama`, …).
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, BookError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            BookError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{provider_name}/{model}")))
    }

    /// Let edgequake-llm pick the first provider with an API key present.
    pub fn from_env() -> Result<Self, BookError> {
        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| BookError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                    Error: {e}"
                ),
            })?;
        Ok(Self::new(provider, "auto"))
    }

    fn build_messages(request: &ModelRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }

        let mut prompt = request.prompt.clone();
        if let Some(ref schema) = request.response_schema {
            prompt.push_str(&schema_instruction(schema));
        }

        let images = request
            .attachment
            .as_ref()
            .map(|att| {
                if !is_image_mime(&att.mime_type) {
                    warn!(
                        "Sending a {} attachment through a chat provider; many accept images only",
                        att.mime_type
                    );
                }
                vec![ImageData::new(att.data_base64.clone(), att.mime_type.as_str())]
            })
            .unwrap_or_default();

        messages.push(ChatMessage::user_with_images(prompt.as_str(), images));
        messages
    }
}

fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

/// Upstream error text, with a hint when a non-image attachment is the
/// likely cause.
fn upstream_message(error: &str, request: &ModelRequest) -> String {
    match request.attachment {
        Some(ref att) if !is_image_mime(&att.mime_type) => format!(
            "{error}\n  Hint: this provider may not accept {} attachments. \
Set GEMINI_API_KEY (or --provider gemini) to send the PDF natively.",
            att.mime_type
        ),
        _ => error.to_string(),
    }
}

/// Prompt suffix describing the expected JSON shape.
fn schema_instruction(schema: &serde_json::Value) -> String {
    format!(
        "\n\nRespond with a single JSON object only, no prose and no code fences. \
It must follow this schema:\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

#[async_trait]
impl GenerativeModel for ProviderModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, BookError> {
        let start = Instant::now();
        let messages = Self::build_messages(request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BookError::UpstreamFailure(upstream_message(&e.to_string(), request)))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(BookError::UpstreamFailure("empty response".to_string()));
        }

        Ok(ModelResponse {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }

    async fn generate_stream(&self, request: &ModelRequest) -> Result<TextStream, BookError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(stream::iter(vec![Ok(response.content)])))
    }

    fn name(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attachment;

    #[test]
    fn schema_instruction_embeds_schema() {
        let schema = serde_json::json!({"type": "OBJECT", "properties": {"processedPages": {}}});
        let text = schema_instruction(&schema);
        assert!(text.contains("processedPages"));
        assert!(text.contains("JSON object only"));
    }

    #[test]
    fn pdf_attachment_errors_point_at_gemini() {
        let mut request = ModelRequest::new("extract");
        request.attachment = Some(Attachment {
            mime_type: "application/pdf".into(),
            data_base64: "JVBERi0=".into(),
        });
        let msg = upstream_message("400 unsupported media type", &request);
        assert!(msg.starts_with("400 unsupported media type"));
        assert!(msg.contains("application/pdf"));
        assert!(msg.contains("GEMINI_API_KEY"));

        request.attachment = None;
        assert_eq!(upstream_message("timeout", &request), "timeout");
    }

    #[test]
    fn image_mime_detection() {
        assert!(is_image_mime("image/png"));
        assert!(is_image_mime(" IMAGE/JPEG"));
        assert!(!is_image_mime("application/pdf"));
    }
}
