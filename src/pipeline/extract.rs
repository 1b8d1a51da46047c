//! Phase 1: structural extraction of the source PDF.
//!
//! The whole PDF goes to the model in one streamed request. The model is
//! asked for title, author and the full text with headings and images kept,
//! but only approximate pagination; Phase 2 does the real page layout.
//!
//! Progress inside the [15, 60] band is estimated from the number of
//! `"pageNumber"` keys seen so far in the partial JSON, relative to the
//! page count reported by the PDF collaborator.

use crate::config::ConversionConfig;
use crate::error::BookError;
use crate::model::{Attachment, GenerativeModel, ModelRequest};
use crate::output::{Document, ImageRef, Page, RawDocument};
use crate::pipeline::clean::clean_page_text;
use crate::pipeline::encode::encode_document;
use crate::pipeline::input::SourceFile;
use crate::pipeline::json::decode_model_json;
use crate::progress::{extract_progress, ProgressReporter};
use crate::prompts::{self, DEFAULT_EXTRACT_PROMPT, EXTRACT_ARRAY_KEY, PAGE_MARKER};
use futures::StreamExt;
use tracing::{debug, info};

/// Build the Phase-1 request for `source`.
pub fn build_extract_request(
    source: &SourceFile,
    page_hint: usize,
    images: &[ImageRef],
    config: &ConversionConfig,
) -> ModelRequest {
    let instruction = config
        .extract_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACT_PROMPT);

    ModelRequest {
        system: None,
        prompt: prompts::extract_prompt(instruction, page_hint, images),
        attachment: Some(Attachment {
            mime_type: "application/pdf".to_string(),
            data_base64: encode_document(source.bytes()),
        }),
        response_schema: Some(prompts::extract_schema()),
        temperature: config.temperature,
        max_tokens: config.extract_max_tokens,
    }
}

/// Run Phase 1 and return the unrefined document.
///
/// # Errors
/// * [`BookError::UpstreamFailure`] — the request or stream failed, or no
///   text arrived.
/// * [`BookError::MalformedOutput`] — the response could not be decoded.
///   There is no fallback to raw text.
pub async fn extract_structure(
    model: &dyn GenerativeModel,
    source: &SourceFile,
    page_hint: usize,
    images: &[ImageRef],
    config: &ConversionConfig,
    progress: &mut ProgressReporter,
) -> Result<Document, BookError> {
    let request = build_extract_request(source, page_hint, images, config);
    info!(
        "Phase 1: extracting '{}' with {} ({} page hint, {} image hints)",
        source.name(),
        model.name(),
        page_hint,
        images.len()
    );

    let mut stream = model.generate_stream(&request).await?;
    let mut text = String::new();
    let mut counter = MarkerCounter::default();

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        text.push_str(&fragment);
        let markers = counter.update(&text);
        if let Some(p) = extract_progress(markers, page_hint) {
            if p > progress.last() {
                debug!("Phase 1: {} page markers received → {}%", markers, p);
                progress.report(p);
            }
        }
    }

    if text.trim().is_empty() {
        return Err(BookError::UpstreamFailure(
            "model stream ended without any text".to_string(),
        ));
    }
    debug!("Phase 1: received {} bytes", text.len());

    let raw: RawDocument = decode_model_json(&text, EXTRACT_ARRAY_KEY)?;
    Ok(into_document(raw, &source.stem()))
}

/// Normalise a decoded Phase-1 response into a [`Document`].
///
/// Title falls back to `fallback_title` when missing or blank; pages keep
/// the model's numbering when it gave one.
pub fn into_document(raw: RawDocument, fallback_title: &str) -> Document {
    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());
    let author = raw
        .author
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    let pages = raw
        .pages
        .into_iter()
        .enumerate()
        .map(|(i, p)| Page {
            page_number: p.page_number.filter(|&n| n > 0).unwrap_or(i + 1),
            content: clean_page_text(&p.content),
            chapter_title: None,
        })
        .collect();

    Document {
        title,
        author,
        pages,
    }
}

/// Counts non-overlapping page markers in a growing buffer without
/// rescanning text already seen.
#[derive(Debug, Default)]
struct MarkerCounter {
    scanned: usize,
    count: usize,
}

impl MarkerCounter {
    fn update(&mut self, text: &str) -> usize {
        let tail = &text[self.scanned..];
        let mut resume = self.scanned;
        for (i, m) in tail.match_indices(PAGE_MARKER) {
            self.count += 1;
            resume = self.scanned + i + m.len();
        }
        // A marker may be split across fragments: keep its possible prefix.
        let mut keep = text.len().saturating_sub(PAGE_MARKER.len() - 1).max(resume);
        while !text.is_char_boundary(keep) {
            keep -= 1;
        }
        self.scanned = keep.max(resume);
        self.count
    }
}
