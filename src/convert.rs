//! Conversion entry points and the pipeline orchestrator.
//!
//! [`convert_source`] is the orchestrator: it sequences the collaborators,
//! owns the single [`ProgressReporter`] for the run, and decides which
//! failures are fatal. Everything else here resolves inputs and backends and
//! then delegates to it.
//!
//! | Step | Failure |
//! |------|---------|
//! | page count | logged, treated as 0 |
//! | image extraction | logged, no image hints |
//! | Phase 1 | returned to the caller unchanged |
//! | Phase 2 chunk | kept verbatim, recorded in stats |

use crate::config::ConversionConfig;
use crate::error::BookError;
use crate::library::{Library, StoredBook};
use crate::model::{GeminiModel, GenerativeModel, ProviderModel};
use crate::output::{ConversionOutput, ConversionStats, SourceInfo};
use crate::pipeline::input::{self, SourceFile};
use crate::pipeline::inspect::{DocumentInspector, PdfiumInspector};
use crate::pipeline::images::ImageAliases;
use crate::pipeline::{extract, refine};
use crate::progress::{
    ProgressReporter, PROGRESS_IMAGES, PROGRESS_PAGE_COUNT, PROGRESS_START, REFINE_BAND_END,
    REFINE_BAND_START,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default model when a non-Gemini provider is named without one.
const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Convert a PDF file or URL into a book.
///
/// # Arguments
/// * `input` — Local file path or HTTP/HTTPS URL to a PDF
/// * `config` — Conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some Phase-2 chunks fell back
/// to unrefined text (check `output.stats.fallback_chunks`).
///
/// # Errors
/// Returns `Err(BookError)` only for fatal errors:
/// - File not found / permission denied / not a PDF
/// - No model backend configured
/// - Phase 1 failed (upstream error or undecodable output)
pub async fn convert(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, BookError> {
    let input = input.as_ref();
    info!("Starting conversion: {}", input);
    let source = input::resolve_input(input, config.download_timeout_secs).await?;
    run(&source, config).await
}

/// Convert PDF bytes held in memory.
///
/// `name` is used for logging and as the fallback title (its stem).
///
/// # Example
/// ```rust,no_run
/// use pdf2book::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("novel.pdf")?;
/// let output = convert_from_bytes(bytes, "novel.pdf", &ConversionConfig::default()).await?;
/// println!("{} pages", output.document.pages.len());
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: Vec<u8>,
    name: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, BookError> {
    let source = input::from_bytes(bytes, name)?;
    run(&source, config).await
}

/// Convert a PDF and store the result in `library`.
pub async fn convert_to_library(
    input: impl AsRef<str>,
    library: &Library,
    config: &ConversionConfig,
) -> Result<(StoredBook, ConversionStats), BookError> {
    let source = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    let output = run(&source, config).await?;
    let book = library.put(output.document, source.name()).await?;
    Ok((book, output.stats))
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, BookError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BookError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Page count and image count of a PDF. Does not need a model or API key.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<SourceInfo, BookError> {
    let source = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    let inspector: Arc<dyn DocumentInspector> = match config.inspector {
        Some(ref i) => Arc::clone(i),
        None => Arc::new(PdfiumInspector::new(None)),
    };

    let page_count = inspector.page_count(&source).await;
    if let Err(ref e) = page_count {
        warn!("Page count unavailable: {}", e);
    }
    let images = inspector.extract_images(&source).await;
    if let Err(ref e) = images {
        warn!("Image extraction unavailable: {}", e);
    }

    Ok(SourceInfo {
        name: source.name().to_string(),
        size_bytes: source.bytes().len(),
        page_count: page_count.ok(),
        image_count: images.ok().map(|v| v.len()),
    })
}

/// Run both phases over a resolved source with explicit collaborators.
///
/// Progress goes to `config.progress_callback` in the fixed sequence
/// 5 → 10 → 15 → (Phase 1) → 60 → (Phase 2) → 100.
pub async fn convert_source(
    source: &SourceFile,
    model: &dyn GenerativeModel,
    inspector: &dyn DocumentInspector,
    config: &ConversionConfig,
) -> Result<ConversionOutput, BookError> {
    let total_start = Instant::now();
    let mut progress = ProgressReporter::new(config.progress_callback.clone());
    let mut stats = ConversionStats::default();

    progress.report(PROGRESS_START);

    // ── Page count ───────────────────────────────────────────────────────
    let page_hint = match inspector.page_count(source).await {
        Ok(n) => n,
        Err(e) => {
            warn!("Could not count pages of {}: {}", source.name(), e);
            0
        }
    };
    stats.source_pages = page_hint;
    progress.report(PROGRESS_PAGE_COUNT);

    // ── Images ───────────────────────────────────────────────────────────
    let images = if config.extract_images {
        match inspector.extract_images(source).await {
            Ok(images) => images,
            Err(e) => {
                warn!("Continuing without image hints: {}", e);
                Vec::new()
            }
        }
    } else {
        debug!("Image extraction disabled");
        Vec::new()
    };
    stats.image_hints = images.len();
    let (images, aliases) = ImageAliases::assign(&images);
    progress.report(PROGRESS_IMAGES);

    // ── Phase 1 ──────────────────────────────────────────────────────────
    let extract_start = Instant::now();
    let raw =
        extract::extract_structure(model, source, page_hint, &images, config, &mut progress)
            .await?;
    stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    stats.raw_pages = raw.pages.len();
    info!(
        "Phase 1 complete: '{}', {} raw pages in {}ms",
        raw.title, stats.raw_pages, stats.extract_duration_ms
    );
    progress.report(REFINE_BAND_START);

    // ── Phase 2 ──────────────────────────────────────────────────────────
    let refine_start = Instant::now();
    let mut refined = refine::refine_document(model, &raw, config, &mut progress).await;
    aliases.restore(&mut refined.document);
    stats.refine_duration_ms = refine_start.elapsed().as_millis() as u64;
    stats.chunks = refined.chunks;
    stats.fallback_chunks = refined.fallbacks;
    stats.total_input_tokens = refined.input_tokens;
    stats.total_output_tokens = refined.output_tokens;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    progress.report(REFINE_BAND_END);
    info!(
        "Conversion complete: {} pages from {} chunks ({} unrefined), {}ms total",
        refined.document.pages.len(),
        stats.chunks,
        stats.fallback_chunks.len(),
        stats.total_duration_ms
    );

    Ok(ConversionOutput {
        document: refined.document,
        stats,
    })
}

async fn run(source: &SourceFile, config: &ConversionConfig) -> Result<ConversionOutput, BookError> {
    let model = resolve_model(config)?;
    let inspector: Arc<dyn DocumentInspector> = match config.inspector {
        Some(ref i) => Arc::clone(i),
        None => Arc::new(PdfiumInspector::new(config.asset_dir.clone())),
    };
    convert_source(source, model.as_ref(), inspector.as_ref(), config).await
}

/// Resolve the model backend, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.model_client`) — used as-is. This is how
///    tests and embedding applications inject their own backend.
/// 2. **Named provider** (`config.provider_name`) — `"gemini"` selects the
///    native Gemini backend; any other name goes through edgequake-llm's
///    [`ProviderFactory`](edgequake_llm::ProviderFactory).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    both set means the execution environment chose provider and model.
/// 4. **Gemini key** (`GEMINI_API_KEY` / `GOOGLE_API_KEY`) — native Gemini,
///    which accepts the PDF directly.
/// 5. **Full auto-detection** — the first provider edgequake-llm finds a key for.
///
/// Steps 2, 3 and 5 can land on a chat provider that accepts image
/// attachments only, in which case Phase 1 fails upstream; Gemini is the
/// backend that reads the PDF itself.
pub fn resolve_model(config: &ConversionConfig) -> Result<Arc<dyn GenerativeModel>, BookError> {
    if let Some(ref model) = config.model_client {
        return Ok(Arc::clone(model));
    }

    if let Some(ref name) = config.provider_name {
        return named_model(name, config.model.as_deref());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return named_model(&prov, Some(&model));
        }
    }

    if let Ok(gemini) = GeminiModel::from_env(config.model.as_deref()) {
        return Ok(Arc::new(gemini));
    }

    Ok(Arc::new(ProviderModel::from_env()?))
}

fn named_model(name: &str, model: Option<&str>) -> Result<Arc<dyn GenerativeModel>, BookError> {
    if name.eq_ignore_ascii_case("gemini") || name.eq_ignore_ascii_case("google") {
        return Ok(Arc::new(GeminiModel::from_env(model)?));
    }
    let model = model.unwrap_or(DEFAULT_PROVIDER_MODEL);
    Ok(Arc::new(ProviderModel::from_name(name, model)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelRequest, ModelResponse, TextStream};
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl GenerativeModel for Fixed {
        async fn generate(&self, _: &ModelRequest) -> Result<ModelResponse, BookError> {
            Ok(ModelResponse::default())
        }
        async fn generate_stream(&self, _: &ModelRequest) -> Result<TextStream, BookError> {
            Err(BookError::UpstreamFailure("unused".into()))
        }
        fn name(&self) -> String {
            "fixed".into()
        }
    }

    #[test]
    fn prebuilt_model_wins() {
        let config = ConversionConfig::builder()
            .model_client(Arc::new(Fixed))
            .provider_name("openai")
            .build()
            .unwrap();
        let model = resolve_model(&config).unwrap();
        assert_eq!(model.name(), "fixed");
    }

    #[tokio::test]
    async fn missing_input_fails_before_any_model_lookup() {
        let err = convert("/no/such/book.pdf", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookError::FileNotFound { .. }));
    }
}
