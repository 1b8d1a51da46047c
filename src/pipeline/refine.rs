//! Phase 2 ("the Twin"): reflow raw text into mobile-sized pages.
//!
//! The Phase-1 text is joined, chunked on headings and blank lines, and each
//! chunk is sent as its own structured request. Pages from every chunk are
//! numbered from one shared counter, so the final numbering is `1..=N`
//! regardless of how many pages each chunk produced.
//!
//! A chunk whose request or decode fails is not retried and does not abort
//! the run: its text is kept verbatim as a single page titled
//! [`FALLBACK_CHAPTER_TITLE`]. No input text is ever dropped.

use crate::config::ConversionConfig;
use crate::error::ChunkError;
use crate::model::{GenerativeModel, ModelRequest, ModelResponse};
use crate::output::{Document, Page, RefinedChunk, RefinedPage};
use crate::pipeline::chunk::chunk_text;
use crate::pipeline::json::decode_model_json;
use crate::progress::{refine_progress, ProgressReporter};
use crate::prompts::{self, DEFAULT_REFINE_PROMPT, REFINE_ARRAY_KEY};
use tracing::{debug, info, warn};

/// Chapter title of a page that holds unrefined fallback text.
pub const FALLBACK_CHAPTER_TITLE: &str = "Unrefined Content";

/// Result of Phase 2.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub document: Document,
    pub chunks: usize,
    pub fallbacks: Vec<ChunkError>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Build the Phase-2 request for one chunk.
pub fn build_refine_request(chunk: &str, config: &ConversionConfig) -> ModelRequest {
    let instruction = config
        .refine_prompt
        .as_deref()
        .unwrap_or(DEFAULT_REFINE_PROMPT);

    ModelRequest {
        system: None,
        prompt: prompts::refine_prompt(instruction, chunk),
        attachment: None,
        response_schema: Some(prompts::refine_schema()),
        temperature: config.temperature,
        max_tokens: config.refine_max_tokens,
    }
}

/// Run Phase 2 over `raw`. Title and author are carried over unchanged.
pub async fn refine_document(
    model: &dyn GenerativeModel,
    raw: &Document,
    config: &ConversionConfig,
    progress: &mut ProgressReporter,
) -> Refinement {
    let text = raw
        .pages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let chunks: Vec<&str> = chunk_text(&text, config.chunk_chars)
        .filter(|c| !c.trim().is_empty())
        .collect();
    let total = chunks.len();
    info!(
        "Phase 2: refining {} chars in {} chunks with {}",
        text.len(),
        total,
        model.name()
    );

    let mut pages: Vec<Page> = Vec::new();
    let mut fallbacks = Vec::new();
    let mut next_page = 1usize;
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;

    for (index, chunk) in chunks.iter().enumerate() {
        progress.report(refine_progress(index, total));

        match refine_chunk(model, index + 1, chunk, config).await {
            Ok((refined, usage)) => {
                input_tokens += usage.input_tokens as u64;
                output_tokens += usage.output_tokens as u64;
                debug!("Chunk {}/{}: {} pages", index + 1, total, refined.len());
                for page in refined {
                    pages.push(Page {
                        page_number: next_page,
                        content: page.content,
                        chapter_title: page
                            .chapter_title
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty()),
                    });
                    next_page += 1;
                }
            }
            Err(err) => {
                warn!("Chunk {}/{} kept verbatim: {}", index + 1, total, err);
                progress.chunk_fallback(index + 1, total, &err.to_string());
                pages.push(Page {
                    page_number: next_page,
                    content: (*chunk).to_string(),
                    chapter_title: Some(FALLBACK_CHAPTER_TITLE.to_string()),
                });
                next_page += 1;
                fallbacks.push(err);
            }
        }
    }

    Refinement {
        document: Document {
            title: raw.title.clone(),
            author: raw.author.clone(),
            pages,
        },
        chunks: total,
        fallbacks,
        input_tokens,
        output_tokens,
    }
}

/// Refine one chunk; `number` is 1-indexed and only used for errors.
async fn refine_chunk(
    model: &dyn GenerativeModel,
    number: usize,
    chunk: &str,
    config: &ConversionConfig,
) -> Result<(Vec<RefinedPage>, ModelResponse), ChunkError> {
    let request = build_refine_request(chunk, config);
    let response = model
        .generate(&request)
        .await
        .map_err(|e| ChunkError::from_book_error(number, e))?;

    let decoded: RefinedChunk = decode_model_json(&response.content, REFINE_ARRAY_KEY)
        .map_err(|e| ChunkError::from_book_error(number, e))?;

    let pages: Vec<RefinedPage> = decoded
        .processed_pages
        .into_iter()
        .filter(|p| !p.content.trim().is_empty())
        .collect();
    if pages.is_empty() {
        return Err(ChunkError::Empty { chunk: number });
    }

    let usage = ModelResponse {
        content: String::new(),
        ..response
    };
    Ok((pages, usage))
}
