//! Prompts and response schemas for both pipeline phases.
//!
//! Every instruction sent to the model lives here so prompt changes are made
//! in one place and unit tests can inspect them without a live backend.
//! Callers can replace the instructions via
//! [`crate::config::ConversionConfig::extract_prompt`] and
//! [`crate::config::ConversionConfig::refine_prompt`]; the schemas are fixed
//! because the decoder depends on their array keys.

use crate::output::ImageRef;
use serde_json::{json, Value};

/// Array key of the Phase-1 response.
pub const EXTRACT_ARRAY_KEY: &str = "pages";

/// Array key of the Phase-2 response.
pub const REFINE_ARRAY_KEY: &str = "processedPages";

/// Marker counted in the Phase-1 stream to estimate pages received.
pub const PAGE_MARKER: &str = "\"pageNumber\"";

/// Phase-1 instruction: faithful structural extraction.
pub const DEFAULT_EXTRACT_PROMPT: &str = r#"You are an expert document digitiser. Extract the complete content of the attached PDF.

1. METADATA
   - "title": the document title as printed (empty string if none)
   - "author": the author(s) as printed (empty string if none)

2. TEXT
   - Transcribe ALL text in reading order. Do not summarise, shorten or skip anything
   - Preserve the heading hierarchy with Markdown markers (#, ##, ###)
   - Keep lists, tables (GFM pipe format) and emphasis
   - Keep paragraphs separated by a blank line

3. IMAGES
   - Never drop an image. Where an image appears, insert it as a Markdown
     image link at the position it occupies in the text

4. PAGES
   - Return the text as an array of pages with "pageNumber" and "content"
   - Page boundaries only need to be approximate; do not rebalance text
     between pages

Output JSON only."#;

/// Phase-2 instruction: reflow one chunk into mobile pages.
pub const DEFAULT_REFINE_PROMPT: &str = r#"You are a book designer preparing text for reading on a phone.
Reformat the text below into pages.

Rules:
1. Each page holds roughly 300-400 words. Never split a page in the middle of a sentence.
2. Re-join paragraphs that were broken by the original layout (hyphenation, hard line breaks, running headers and page numbers).
3. Detect chapter boundaries. Set "chapterTitle" on every page to the title of the chapter the page belongs to.
4. Keep Markdown headings, lists and tables.
5. Copy every Markdown image link exactly as written, at its original position. Never alter or invent URLs.
6. Do not summarise, translate or omit any text.

Return JSON with a "processedPages" array of {"content", "chapterTitle"} objects."#;

/// Response schema for Phase 1.
pub fn extract_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "author": { "type": "STRING" },
            "pages": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "pageNumber": { "type": "INTEGER" },
                        "content": { "type": "STRING" }
                    },
                    "required": ["pageNumber", "content"]
                }
            }
        },
        "required": ["title", "pages"]
    })
}

/// Response schema for Phase 2.
pub fn refine_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "processedPages": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "content": { "type": "STRING" },
                        "chapterTitle": { "type": "STRING" }
                    },
                    "required": ["content", "chapterTitle"]
                }
            }
        },
        "required": ["processedPages"]
    })
}

/// Hint block listing where embedded images were found.
///
/// Returns an empty string for an empty list so no image text reaches the
/// prompt at all.
pub fn image_hints(images: &[ImageRef]) -> String {
    if images.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "\n\nIMAGE LOCATIONS\nThe document contains the following images. \
Insert each one as ![Image](URL) at the position where it appears on its page, \
using the URL exactly as given:\n",
    );
    for img in images {
        out.push_str(&format!("- Page {}: {}\n", img.page, img.url));
    }
    out
}

/// Full Phase-1 prompt.
pub fn extract_prompt(instruction: &str, page_hint: usize, images: &[ImageRef]) -> String {
    let mut prompt = instruction.to_string();
    if page_hint > 0 {
        prompt.push_str(&format!("\n\nThe document has {page_hint} pages."));
    }
    prompt.push_str(&image_hints(images));
    prompt
}

/// Full Phase-2 prompt for one chunk.
pub fn refine_prompt(instruction: &str, chunk: &str) -> String {
    format!("{instruction}\n\nTEXT:\n\"\"\"\n{chunk}\n\"\"\"")
}
