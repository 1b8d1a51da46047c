//! Short aliases for image URLs too long to send through the model.
//!
//! Without an asset directory, extracted images are `data:` URLs of tens or
//! hundreds of kilobytes. Echoing those through Phase 1 would spend the
//! output budget and leave Phase 2 with unsplittable megabyte lines, so the
//! model only ever sees `pdf2book-image:N`. Real URLs go back in after
//! Phase 2.

use crate::output::{Document, ImageRef};

/// URLs longer than this are aliased. Paths and http(s) links fit easily.
pub const MAX_PROMPT_URL_CHARS: usize = 256;

const ALIAS_SCHEME: &str = "pdf2book-image:";

/// Alias table for one conversion.
#[derive(Debug, Clone, Default)]
pub struct ImageAliases {
    /// `(alias, url)` in alias order.
    entries: Vec<(String, String)>,
}

impl ImageAliases {
    /// Replace long or inline URLs with aliases, keeping short ones as-is.
    pub fn assign(images: &[ImageRef]) -> (Vec<ImageRef>, Self) {
        let mut aliases = Self::default();
        let hinted = images
            .iter()
            .map(|img| {
                if img.url.starts_with("data:") || img.url.len() > MAX_PROMPT_URL_CHARS {
                    let alias = format!("{ALIAS_SCHEME}{}", aliases.entries.len() + 1);
                    aliases.entries.push((alias.clone(), img.url.clone()));
                    ImageRef {
                        page: img.page,
                        url: alias,
                    }
                } else {
                    img.clone()
                }
            })
            .collect();
        (hinted, aliases)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Put the real URLs back into every page.
    pub fn restore(&self, document: &mut Document) {
        if self.is_empty() {
            return;
        }
        for page in &mut document.pages {
            page.content = self.restore_text(&page.content);
        }
    }

    fn restore_text(&self, text: &str) -> String {
        if !text.contains(ALIAS_SCHEME) {
            return text.to_string();
        }
        // Highest first, so `…:12` is gone before `…:1` is replaced.
        let mut out = text.to_string();
        for (alias, url) in self.entries.iter().rev() {
            out = out.replace(alias.as_str(), url);
        }
        out
    }
}
