//! Decode model JSON that may be fenced or cut off mid-generation.
//!
//! Models hitting their output-token limit stop in the middle of an array
//! element. Rather than lose the whole response, the decoder drops the
//! incomplete tail element and closes the array and the top-level object:
//!
//! ```text
//! {"pages":[{"content":"a"},{"content":"b"},{"conte
//!                                          ▲ last complete element
//! {"pages":[{"content":"a"},{"content":"b"}]}
//! ```
//!
//! Stages, each tried only when the previous one fails:
//!
//! 1. strip code fences and parse the first JSON value, ignoring any
//!    trailing prose after it;
//! 2. require the expected array key, else give up;
//! 3. cut after a `}` that is followed by `,` or by the end of input,
//!    trying the latest candidate first and walking back past cuts that
//!    land inside a string;
//! 4. cut after the last `}` of any kind;
//! 5. give up with the original parse error.
//!
//! Nothing is ever invented: repaired output is always a prefix of the
//! input plus `]}`.

use crate::error::BookError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

static RE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());

static RE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?```\s*$").unwrap());

static RE_ELEMENT_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\}\s*(?:,|$)").unwrap());

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(input: &str) -> &str {
    let s = input.trim();
    let s = match RE_FENCE_OPEN.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = match RE_FENCE_CLOSE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim()
}

/// Parse `raw` as `T`, repairing truncation inside the `array_key` array.
///
/// # Errors
/// [`BookError::MalformedOutput`] with the original parse error when no
/// stage produces a value.
pub fn decode_model_json<T: DeserializeOwned>(raw: &str, array_key: &str) -> Result<T, BookError> {
    let text = strip_code_fences(raw);

    // A complete value followed by chatter ("Hope this helps!") is still
    // complete; only the first value is read.
    let original = match serde_json::Deserializer::from_str(text)
        .into_iter::<T>()
        .next()
    {
        Some(Ok(v)) => return Ok(v),
        Some(Err(e)) => e,
        None => match serde_json::from_str::<T>(text) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        },
    };
    debug!("Direct JSON parse failed ({}); attempting repair", original);

    let needle = format!("\"{array_key}\"");
    let Some(key_pos) = text.find(&needle) else {
        return Err(malformed(&original, text));
    };
    let after_key = key_pos + needle.len();

    // Stage 3: last complete element, i.e. `}` then `,` or end of input.
    // Text such as `{x}, then` inside the cut-off element also matches, so
    // earlier candidates are tried until one closes cleanly.
    let candidates: Vec<usize> = RE_ELEMENT_END
        .find_iter(text)
        .map(|m| m.start())
        .filter(|&start| start >= after_key)
        .collect();
    for &close in candidates.iter().rev() {
        if let Ok(v) = close_and_parse::<T>(text, close) {
            warn!("Recovered truncated model output at byte {} of {}", close + 1, text.len());
            return Ok(v);
        }
    }

    // Stage 4: last `}` anywhere after the key.
    if let Some(close) = text.rfind('}').filter(|&i| i >= after_key) {
        if let Ok(v) = close_and_parse::<T>(text, close) {
            warn!("Recovered truncated model output at byte {} of {}", close + 1, text.len());
            return Ok(v);
        }
    }

    Err(malformed(&original, text))
}

fn close_and_parse<T: DeserializeOwned>(text: &str, close: usize) -> serde_json::Result<T> {
    let mut repaired = String::with_capacity(close + 3);
    repaired.push_str(&text[..=close]);
    repaired.push_str("]}");
    serde_json::from_str(&repaired)
}

fn malformed(err: &serde_json::Error, text: &str) -> BookError {
    BookError::MalformedOutput(format!("{err} (response length {} bytes)", text.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Chunk {
        processed_pages: Vec<Item>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        content: String,
    }

    #[test]
    fn well_formed_json_round_trips() {
        let raw = r#"{"processedPages":[{"content":"a"},{"content":"b"}]}"#;
        let v: Value = decode_model_json(raw, "processedPages").unwrap();
        assert_eq!(v, json!({"processedPages": [{"content": "a"}, {"content": "b"}]}));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"processedPages\":[{\"content\":\"a\"}]}\n```";
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        assert_eq!(v.processed_pages.len(), 1);

        let raw = "```\n{\"processedPages\":[]}\n```\n";
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        assert!(v.processed_pages.is_empty());
    }

    #[test]
    fn truncated_mid_element_keeps_complete_ones() {
        let raw = r#"{"processedPages":[{"content":"a"},{"content":"b"},{"content":"c"#;
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        let got: Vec<_> = v.processed_pages.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[test]
    fn truncated_right_after_element_keeps_it() {
        let raw = r#"{"processedPages":[{"content":"a"},{"content":"b"}"#;
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        assert_eq!(v.processed_pages.len(), 2);

        let raw = r#"{"processedPages":[{"content":"a"}, "#;
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        assert_eq!(v.processed_pages.len(), 1);
    }

    #[test]
    fn closed_array_without_object_close() {
        let raw = r#"{"processedPages":[{"content":"a"}]"#;
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        assert_eq!(v.processed_pages.len(), 1);
    }

    #[test]
    fn truncated_before_any_element_is_malformed() {
        let raw = r#"{"processedPages":[{"content":"half a sent"#;
        let err = decode_model_json::<Chunk>(raw, "processedPages").unwrap_err();
        assert!(matches!(err, BookError::MalformedOutput(_)));
    }

    #[test]
    fn missing_key_is_malformed() {
        let raw = r#"{"somethingElse":[{"content":"a"},"#;
        let err = decode_model_json::<Value>(raw, "processedPages").unwrap_err();
        assert!(matches!(err, BookError::MalformedOutput(_)));
    }

    #[test]
    fn prose_is_malformed() {
        let err = decode_model_json::<Value>("Sorry, I cannot help.", "pages").unwrap_err();
        assert!(matches!(err, BookError::MalformedOutput(_)));
    }

    #[test]
    fn metadata_before_the_array_survives_repair() {
        let raw = r#"{"title":"T","author":"A","pages":[{"pageNumber":1,"content":"x"},{"pageNumber":2,"con"#;
        let v: Value = decode_model_json(raw, "pages").unwrap();
        assert_eq!(v["title"], "T");
        assert_eq!(v["pages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn brace_comma_inside_cut_off_element_is_skipped() {
        let raw = r#"{"processedPages":[{"content":"a"},{"content":"set {x}, then y"#;
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        let got: Vec<_> = v.processed_pages.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(got, vec!["a"]);
    }

    #[test]
    fn trailing_prose_after_complete_json_keeps_every_element() {
        let raw = "{\"processedPages\":[{\"content\":\"a\"},{\"content\":\"b\"}]}\nHope this helps!";
        let v: Chunk = decode_model_json(raw, "processedPages").unwrap();
        let got: Vec<_> = v.processed_pages.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[test]
    fn raw_document_with_string_page_numbers_decodes() {
        let raw = r#"{"title":"T","pages":[{"pageNumber":"1","content":"x"},{"pageNumber":-1,"content":"y"}]}"#;
        let doc: crate::output::RawDocument = decode_model_json(raw, "pages").unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].page_number, Some(1));
        assert_eq!(doc.pages[1].page_number, None);
    }

    #[test]
    fn strip_code_fences_leaves_plain_text() {
        assert_eq!(strip_code_fences("  {\"a\":1}\n"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
    }
}
