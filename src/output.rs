//! Document model and conversion results.
//!
//! Field names serialise in camelCase (`pageNumber`, `chapterTitle`) because
//! the same shapes are requested from the model as JSON response schemas and
//! stored as-is in the [`crate::library`].

use crate::error::ChunkError;
use serde::{Deserialize, Deserializer, Serialize};

/// A book: title, optional author, and its ordered pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Document {
    /// Distinct chapter titles in reading order.
    pub fn chapters(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for title in self.pages.iter().filter_map(|p| p.chapter_title.as_deref()) {
            if out.last() != Some(&title) {
                out.push(title);
            }
        }
        out
    }

    /// Total words across every page, for reading-time estimates.
    pub fn word_count(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.content.split_whitespace().count())
            .sum()
    }
}

/// One page of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-indexed, contiguous within a document.
    pub page_number: usize,
    /// Markdown text.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
}

/// Location of an embedded image, used as a hint in the extraction prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// 1-indexed source page.
    pub page: usize,
    pub url: String,
}

// ── Model wire shapes ─────────────────────────────────────────────────────

/// Phase-1 response: the unrefined structure of the source document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub pages: Vec<RawPage>,
}

/// A Phase-1 page. Its number is advisory and discarded in Phase 2.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPage {
    /// `None` for anything that is not a positive integer or a numeric string.
    #[serde(default, deserialize_with = "lenient_page_number")]
    pub page_number: Option<usize>,
    #[serde(default)]
    pub content: String,
}

// Providers without schema enforcement send `"1"`, `1.0` or `-1`; none of
// those may fail the whole document.
fn lenient_page_number<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let n = match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(n.and_then(|n| usize::try_from(n).ok()))
}

/// Phase-2 response for one chunk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedChunk {
    #[serde(default)]
    pub processed_pages: Vec<RefinedPage>,
}

/// A reflowed page before numbering.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedPage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub chapter_title: Option<String>,
}

// ── Results ───────────────────────────────────────────────────────────────

/// Facts about a source PDF, gathered without calling a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    pub size_bytes: usize,
    /// `None` when pdfium could not read the document.
    pub page_count: Option<usize>,
    pub image_count: Option<usize>,
}

/// Statistics for a single conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Page count reported by the PDF collaborator (0 when unknown).
    pub source_pages: usize,
    /// Embedded images offered to the model as hints.
    pub image_hints: usize,
    /// Pages produced by Phase 1.
    pub raw_pages: usize,
    /// Chunks submitted to Phase 2.
    pub chunks: usize,
    /// Chunks kept verbatim because refinement failed.
    pub fallback_chunks: Vec<ChunkError>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extract_duration_ms: u64,
    pub refine_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The complete output of a conversion.
///
/// The document has no identity or timestamp; those are assigned when it
/// is stored in a [`crate::library::Library`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub document: Document,
    pub stats: ConversionStats,
}
