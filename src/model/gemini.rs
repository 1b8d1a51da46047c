//! Native Gemini backend over the `generativelanguage` REST API.
//!
//! Gemini is the default backend: it accepts the source PDF as inline data
//! and enforces `responseSchema` server-side, which keeps Phase-1 output
//! close to valid JSON. Streaming uses `streamGenerateContent?alt=sse`;
//! every SSE event carries one candidate fragment.

use super::{GenerativeModel, ModelRequest, ModelResponse, TextStream};
use crate::error::BookError;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Gemini REST client.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Build from `GEMINI_API_KEY` (or `GOOGLE_API_KEY`).
    pub fn from_env(model: Option<&str>) -> Result<Self, BookError> {
        let key = ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.is_empty())
            .ok_or_else(|| BookError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: "Set GEMINI_API_KEY (or GOOGLE_API_KEY).".to_string(),
            })?;
        Ok(Self::new(key, model.unwrap_or(DEFAULT_GEMINI_MODEL)))
    }

    /// Point at a different endpoint (proxies, test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    async fn post(&self, url: &str, request: &ModelRequest) -> Result<reqwest::Response, BookError> {
        let body = build_body(request);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BookError::UpstreamFailure(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(BookError::UpstreamFailure(format!("HTTP {status}: {message}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, BookError> {
        let response = self.post(&self.endpoint("generateContent"), request).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BookError::UpstreamFailure(format!("unreadable response: {e}")))?;

        let content = parsed.text();
        if content.trim().is_empty() {
            return Err(BookError::UpstreamFailure(format!(
                "empty response (finish reason: {})",
                parsed.finish_reason().unwrap_or("unknown")
            )));
        }
        let usage = parsed.usage_metadata.unwrap_or_default();
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model, usage.prompt_token_count, usage.candidates_token_count
        );
        Ok(ModelResponse {
            content,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }

    async fn generate_stream(&self, request: &ModelRequest) -> Result<TextStream, BookError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(&url, request).await?;
        let (tx, rx) = mpsc::channel::<Result<String, BookError>>(32);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(BookError::UpstreamFailure(e.to_string()))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some((end, sep_len)) = find_event_end(&buffer) {
                    let event: Vec<u8> = buffer.drain(..end + sep_len).collect();
                    let event = String::from_utf8_lossy(&event[..end]);
                    for fragment in parse_sse_event(&event) {
                        if tx.send(fragment).await.is_err() {
                            return;
                        }
                    }
                }
            }

            // Trailing event without a blank-line terminator.
            if !buffer.is_empty() {
                let event = String::from_utf8_lossy(&buffer);
                for fragment in parse_sse_event(&event) {
                    if tx.send(fragment).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> String {
        format!("gemini/{}", self.model)
    }
}

/// Position and length of the first SSE event separator (`\n\n` or `\r\n\r\n`).
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Decode the `data:` lines of one SSE event into text fragments.
fn parse_sse_event(event: &str) -> Vec<Result<String, BookError>> {
    let mut out = Vec::new();
    for line in event.lines() {
        let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
            out.push(Err(BookError::UpstreamFailure(envelope.error.message)));
            continue;
        }
        match serde_json::from_str::<GenerateResponse>(data) {
            Ok(resp) => {
                let text = resp.text();
                if !text.is_empty() {
                    out.push(Ok(text));
                }
            }
            Err(e) => warn!("Skipping unparseable SSE payload: {}", e),
        }
    }
    out
}

fn build_body(request: &ModelRequest) -> GenerateRequest {
    let mut parts = Vec::new();
    if let Some(ref att) = request.attachment {
        parts.push(Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: att.mime_type.clone(),
                data: att.data_base64.clone(),
            }),
        });
    }
    parts.push(Part {
        text: Some(request.prompt.clone()),
        inline_data: None,
    });

    GenerateRequest {
        system_instruction: request.system.as_ref().map(|s| Content {
            role: None,
            parts: vec![Part {
                text: Some(s.clone()),
                inline_data: None,
            }],
        }),
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            response_mime_type: request
                .response_schema
                .as_ref()
                .map(|_| "application/json".to_string()),
            response_schema: request.response_schema.clone(),
        },
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates.first().and_then(|c| c.finish_reason.as_deref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
