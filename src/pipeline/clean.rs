//! Deterministic hygiene for Phase-1 text before it is chunked.
//!
//! Phase-1 output is raw transcription. A few cheap rules make chunk
//! boundaries land where they should (blank lines and headings must really
//! be blank lines and headings) without touching the words themselves:
//!
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
//! 3. Trim trailing whitespace per line
//! 4. Collapse 3+ consecutive blank lines down to 2
//!
//! Image links are left untouched; Phase 2 must see them verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all hygiene rules to one page of Phase-1 content.
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ZWNJ and ZWJ are left alone: Persian, Indic scripts and emoji sequences
// depend on them.
fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_joiners_are_kept() {
        let persian = "\u{0645}\u{06CC}\u{200C}\u{062E}\u{0648}\u{0627}\u{0647}\u{0645}";
        let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}";
        assert_eq!(remove_invisible_chars(persian), persian);
        assert_eq!(remove_invisible_chars(family), family);
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn blank_looking_lines_become_blank() {
        let out = clean_page_text("para one   \n \t\n# Next\r\n");
        assert_eq!(out, "para one\n\n# Next");
    }

    #[test]
    fn image_links_survive() {
        let input = "Before\n![Image](assets/book/page-2-1.png)\nAfter";
        assert_eq!(clean_page_text(input), input);
    }
}
