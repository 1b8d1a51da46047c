//! Render a [`Document`] as a single Markdown file.
//!
//! ```text
//! ---
//! title: "…"
//! author: "…"
//! pages: 42
//! ---
//!
//! # Title
//!
//! ## Chapter One        ← emitted when the chapter title changes
//!
//! page 1 …
//!
//! ---                   ← PageSeparator
//!
//! page 2 …
//! ```

use crate::config::PageSeparator;
use crate::error::BookError;
use crate::output::Document;
use std::path::Path;
use tracing::info;

/// Options for [`to_markdown`].
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Placed between consecutive pages.
    pub separator: PageSeparator,
    /// Prepend YAML front matter with title, author and page count.
    pub front_matter: bool,
    /// Insert a `##` heading whenever the chapter changes.
    pub chapter_headings: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            separator: PageSeparator::HorizontalRule,
            front_matter: true,
            chapter_headings: true,
        }
    }
}

/// Assemble the whole book as Markdown.
pub fn to_markdown(doc: &Document, opts: &ExportOptions) -> String {
    let mut parts: Vec<String> = Vec::new();

    if opts.front_matter {
        parts.push(format_yaml_front_matter(doc));
    }
    parts.push(format!("# {}\n\n", doc.title));

    let mut current_chapter: Option<&str> = None;
    for (i, page) in doc.pages.iter().enumerate() {
        if i > 0 {
            parts.push(opts.separator.render(page.page_number));
        }
        if opts.chapter_headings {
            if let Some(chapter) = page.chapter_title.as_deref() {
                if current_chapter != Some(chapter) {
                    parts.push(format!("## {}\n\n", chapter));
                    current_chapter = Some(chapter);
                }
            }
        }
        parts.push(page.content.trim_end().to_string());
    }

    let mut out = parts.join("");
    out.push('\n');
    out
}

/// Pretty-printed JSON of the document, in the stored wire shape.
pub fn to_json(doc: &Document) -> Result<String, BookError> {
    serde_json::to_string_pretty(doc).map_err(|e| BookError::Internal(format!("serialise: {e}")))
}

/// Write `content` to `path` atomically (temp file + rename).
pub async fn write_atomic(path: &Path, content: &str) -> Result<(), BookError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BookError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, content)
        .await
        .map_err(|e| BookError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| BookError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

/// Render `doc` as Markdown and write it to `path`.
pub async fn export_to_file(
    doc: &Document,
    path: impl AsRef<Path>,
    opts: &ExportOptions,
) -> Result<(), BookError> {
    write_atomic(path.as_ref(), &to_markdown(doc, opts)).await
}

fn format_yaml_front_matter(doc: &Document) -> String {
    let mut yaml = String::from("---\n");
    yaml.push_str(&format!("title: \"{}\"\n", yaml_escape(&doc.title)));
    if let Some(ref a) = doc.author {
        yaml.push_str(&format!("author: \"{}\"\n", yaml_escape(a)));
    }
    yaml.push_str(&format!("pages: {}\n", doc.pages.len()));
    let chapters = doc.chapters();
    if !chapters.is_empty() {
        yaml.push_str("chapters:\n");
        for c in chapters {
            yaml.push_str(&format!("  - \"{}\"\n", yaml_escape(c)));
        }
    }
    yaml.push_str("---\n\n");
    yaml
}

fn yaml_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Page;

    fn doc() -> Document {
        Document {
            title: "The \"Best\" Book".into(),
            author: Some("A. Writer".into()),
            pages: vec![
                Page {
                    page_number: 1,
                    content: "First.".into(),
                    chapter_title: Some("One".into()),
                },
                Page {
                    page_number: 2,
                    content: "Second.\n".into(),
                    chapter_title: Some("One".into()),
                },
                Page {
                    page_number: 3,
                    content: "Third.".into(),
                    chapter_title: Some("Two".into()),
                },
            ],
        }
    }

    #[test]
    fn chapter_heading_only_on_change() {
        let md = to_markdown(&doc(), &ExportOptions::default());
        assert_eq!(md.matches("## One").count(), 1);
        assert_eq!(md.matches("## Two").count(), 1);
        assert!(md.find("## Two").unwrap() > md.find("Second.").unwrap());
    }

    #[test]
    fn front_matter_is_escaped() {
        let md = to_markdown(&doc(), &ExportOptions::default());
        assert!(md.starts_with("---\ntitle: \"The \\\"Best\\\" Book\"\n"));
        assert!(md.contains("author: \"A. Writer\"\n"));
        assert!(md.contains("pages: 3\n"));
    }

    #[test]
    fn plain_export_with_comment_separator() {
        let opts = ExportOptions {
            separator: PageSeparator::Comment,
            front_matter: false,
            chapter_headings: false,
        };
        let md = to_markdown(&doc(), &opts);
        assert_eq!(
            md,
            "# The \"Best\" Book\n\nFirst.\n\n<!-- page 2 -->\n\nSecond.\n\n<!-- page 3 -->\n\nThird.\n"
        );
    }

    #[tokio::test]
    async fn export_writes_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("book.md");
        export_to_file(&doc(), &path, &ExportOptions::default())
            .await
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Third."));
        assert!(!path.with_extension("tmp").exists());
    }
}
