//! Split long text into refinement-sized chunks on natural boundaries.
//!
//! The size ceiling is soft. A chunk is only closed when the next line would
//! overflow it *and* that line is a heading or blank, so chunks start at
//! section or paragraph breaks and a line is never cut. On text with no
//! such boundary a chunk grows past the ceiling.
//!
//! Chunks borrow from the input: joining them with `\n` gives the input back.

use tracing::warn;

/// Default chunk ceiling, in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 15_000;

/// Iterator over the chunks of a text. See [`chunk_text`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    max_chars: usize,
    done: bool,
}

/// Split `text` into chunks of about `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Chunks<'_> {
    Chunks {
        rest: text,
        max_chars: max_chars.max(1),
        done: text.is_empty(),
    }
}

fn is_boundary(line: &str) -> bool {
    line.starts_with('#') || line.trim().is_empty()
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        let text = self.rest;
        let mut offset = 0;
        let mut end = 0;
        let mut chars = 0;
        let mut empty = true;

        loop {
            let (line, next) = match text[offset..].find('\n') {
                Some(i) => (&text[offset..offset + i], Some(offset + i + 1)),
                None => (&text[offset..], None),
            };
            let line_chars = line.chars().count();

            if !empty && chars + 1 + line_chars > self.max_chars && is_boundary(line) {
                self.rest = &text[offset..];
                return Some(&text[..end]);
            }

            chars += if empty { line_chars } else { 1 + line_chars };
            empty = false;
            end = offset + line.len();

            match next {
                Some(n) => offset = n,
                None => {
                    self.done = true;
                    if chars > self.max_chars {
                        warn!(
                            "Final chunk has {} chars (ceiling {}): no heading or blank line to split on",
                            chars, self.max_chars
                        );
                    }
                    return Some(&text[..end]);
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(chunks: &[&str]) -> String {
        chunks.join("\n")
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert_eq!(chunk_text("", 10).count(), 0);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks: Vec<_> = chunk_text("# A\nhello\n\nworld", 1000).collect();
        assert_eq!(chunks, vec!["# A\nhello\n\nworld"]);
    }

    #[test]
    fn splits_at_heading_once_over_ceiling() {
        let text = "# One\naaaaaaaaaa\n# Two\nbbbbbbbbbb";
        let chunks: Vec<_> = chunk_text(text, 16).collect();
        assert_eq!(chunks, vec!["# One\naaaaaaaaaa", "# Two\nbbbbbbbbbb"]);
        assert_eq!(rejoin(&chunks), text);
    }

    #[test]
    fn splits_at_blank_line() {
        let text = "aaaaaaaa\nbbbbbbbb\n\ncccccccc";
        let chunks: Vec<_> = chunk_text(text, 17).collect();
        assert_eq!(chunks, vec!["aaaaaaaa\nbbbbbbbb", "\ncccccccc"]);
        assert_eq!(rejoin(&chunks), text);
    }

    #[test]
    fn never_splits_on_plain_lines() {
        let text = "aaaa\nbbbb\ncccc\ndddd";
        let chunks: Vec<_> = chunk_text(text, 5).collect();
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn reconstructs_input_with_trailing_newline() {
        let text = "# A\nx\n\n# B\ny\n";
        for max in 1..20 {
            let chunks: Vec<_> = chunk_text(text, max).collect();
            assert_eq!(rejoin(&chunks), text, "max = {max}");
        }
    }

    #[test]
    fn boundaries_fall_between_lines() {
        let text = "# H1\nline one\n\n# H2\nline two\n\nline three\n# H3\nend";
        let lines: Vec<&str> = text.split('\n').collect();
        for max in 1..40 {
            for chunk in chunk_text(text, max) {
                for line in chunk.split('\n') {
                    assert!(lines.contains(&line), "'{line}' is not a whole line (max {max})");
                }
            }
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "ééééé\n# Next";
        // 5 chars + 1 + 6 chars = 12 > 11 → split; bytes would already be 10 + …
        let chunks: Vec<_> = chunk_text(text, 11).collect();
        assert_eq!(chunks, vec!["ééééé", "# Next"]);
        let chunks: Vec<_> = chunk_text(text, 12).collect();
        assert_eq!(chunks, vec![text]);
    }
}
