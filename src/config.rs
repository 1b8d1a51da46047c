//! Configuration types for PDF-to-book conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The builder clamps numeric knobs to
//! sane ranges and `build()` rejects combinations that cannot work.

use crate::error::BookError;
use crate::model::GenerativeModel;
use crate::pipeline::chunk::DEFAULT_CHUNK_CHARS;
use crate::pipeline::inspect::DocumentInspector;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a conversion.
///
/// # Example
/// ```rust
/// use pdf2book::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .provider_name("gemini")
///     .model("gemini-2.5-flash")
///     .chunk_chars(12_000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Model identifier, e.g. "gemini-2.5-flash", "gpt-4.1-mini".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name ("gemini", "openai", "anthropic", "ollama", …).
    /// If None along with `model_client`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed model backend. Takes precedence over `provider_name`.
    pub model_client: Option<Arc<dyn GenerativeModel>>,

    /// Replaces the pdfium collaborators (page count, images).
    pub inspector: Option<Arc<dyn DocumentInspector>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Both phases are transcription, not composition; low temperature keeps
    /// the model faithful to the source text.
    pub temperature: f32,

    /// Phase-1 output token limit. Default: 65 536.
    ///
    /// Phase 1 returns the whole book in one response, so this needs to be
    /// as large as the model allows. Output cut off at the limit is repaired
    /// by the resilient decoder, losing only the trailing partial page.
    pub extract_max_tokens: usize,

    /// Phase-2 output token limit per chunk. Default: 16 384.
    ///
    /// A 15 000-character chunk is about 4 000 tokens of text; reflowed output
    /// plus JSON framing fits comfortably.
    pub refine_max_tokens: usize,

    /// Chunk ceiling for Phase 2, in characters. Default: 15 000.
    pub chunk_chars: usize,

    /// Look for embedded images and pass their locations to Phase 1. Default: true.
    pub extract_images: bool,

    /// Where extracted images are written. None inlines them as `data:` URLs.
    pub asset_dir: Option<PathBuf>,

    /// Replacement Phase-1 instruction.
    pub extract_prompt: Option<String>,

    /// Replacement Phase-2 instruction.
    pub refine_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Progress sink. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            model_client: None,
            inspector: None,
            temperature: 0.1,
            extract_max_tokens: 65_536,
            refine_max_tokens: 16_384,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            extract_images: true,
            asset_dir: None,
            extract_prompt: None,
            refine_prompt: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("model_client", &self.model_client.as_ref().map(|m| m.name()))
            .field("inspector", &self.inspector.as_ref().map(|_| "<dyn DocumentInspector>"))
            .field("temperature", &self.temperature)
            .field("extract_max_tokens", &self.extract_max_tokens)
            .field("refine_max_tokens", &self.refine_max_tokens)
            .field("chunk_chars", &self.chunk_chars)
            .field("extract_images", &self.extract_images)
            .field("asset_dir", &self.asset_dir)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model_client(mut self, client: Arc<dyn GenerativeModel>) -> Self {
        self.config.model_client = Some(client);
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn DocumentInspector>) -> Self {
        self.config.inspector = Some(inspector);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn extract_max_tokens(mut self, n: usize) -> Self {
        self.config.extract_max_tokens = n;
        self
    }

    pub fn refine_max_tokens(mut self, n: usize) -> Self {
        self.config.refine_max_tokens = n;
        self
    }

    pub fn chunk_chars(mut self, n: usize) -> Self {
        self.config.chunk_chars = n;
        self
    }

    pub fn extract_images(mut self, v: bool) -> Self {
        self.config.extract_images = v;
        self
    }

    pub fn asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.asset_dir = Some(dir.into());
        self
    }

    pub fn extract_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extract_prompt = Some(prompt.into());
        self
    }

    pub fn refine_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.refine_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, BookError> {
        let c = &self.config;
        if c.chunk_chars == 0 {
            return Err(BookError::InvalidConfig(
                "Chunk size must be ≥ 1 character".into(),
            ));
        }
        if c.extract_max_tokens == 0 || c.refine_max_tokens == 0 {
            return Err(BookError::InvalidConfig(
                "Token limits must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Export options ───────────────────────────────────────────────────────

/// How to separate pages in exported Markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n".
    None,
    /// Horizontal rule: "\n\n---\n\n" (default)
    #[default]
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before page `page_num` (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
