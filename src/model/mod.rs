//! The generative-model capability the pipeline is written against.
//!
//! Both phases talk to the model through [`GenerativeModel`] only, so the
//! pipeline can run against a live backend or a deterministic fake:
//!
//! * [`gemini::GeminiModel`] — native Gemini REST backend. Sends the PDF as
//!   inline data, enforces the JSON response schema server-side, and streams
//!   real fragments over SSE.
//! * [`provider::ProviderModel`] — adapter over any edgequake-llm
//!   [`LLMProvider`](edgequake_llm::LLMProvider). The schema is described in
//!   the prompt and streaming yields the whole response as one fragment.

pub mod gemini;
pub mod provider;

use crate::error::BookError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub use gemini::GeminiModel;
pub use provider::ProviderModel;

/// A boxed stream of text fragments from a streaming model call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BookError>> + Send>>;

/// A binary document sent alongside the prompt.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 (standard alphabet) payload.
    pub data_base64: String,
}

/// One request to the model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Optional system instruction.
    pub system: Option<String>,
    /// User instruction and any inline text (chunk content, hints).
    pub prompt: String,
    pub attachment: Option<Attachment>,
    /// JSON schema the response must follow, in Gemini's OpenAPI subset
    /// (`OBJECT`, `ARRAY`, `STRING`, `INTEGER`).
    pub response_schema: Option<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            attachment: None,
            response_schema: None,
            temperature: 0.1,
            max_tokens: 8192,
        }
    }
}

/// A complete, non-streamed model answer.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A text-generation backend.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Send a request and wait for the full answer.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, BookError>;

    /// Send a request and receive the answer as it is produced.
    async fn generate_stream(&self, request: &ModelRequest) -> Result<TextStream, BookError>;

    /// Short identifier for logs, e.g. `gemini/gemini-2.5-flash`.
    fn name(&self) -> String;
}
