//! Local book library: one JSON file per converted book.
//!
//! ```text
//! <dir>/
//!   3f2c…e1.json   {"id": …, "createdAt": …, "sourceName": …, "document": {…}}
//!   9a01…7b.json
//! ```
//!
//! Books are written to `<id>.json.tmp` and renamed into place so a crash
//! never leaves a half-written book behind. Listing ignores files that are
//! not valid books rather than failing the whole library.

use crate::error::BookError;
use crate::output::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A document as stored in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBook {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// File name the book was converted from.
    pub source_name: String,
    pub document: Document,
}

/// Directory-backed book store.
#[derive(Debug, Clone)]
pub struct Library {
    dir: PathBuf,
}

impl Library {
    /// Open (creating if needed) the library at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, BookError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| BookError::StorageFailed {
                path: dir.clone(),
                source,
            })?;
        debug!("Library opened at {}", dir.display());
        Ok(Self { dir })
    }

    /// `$XDG_DATA_HOME/pdf2book/library` or the platform equivalent.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pdf2book")
            .join("library")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Assign an id and timestamp to `document` and store it.
    pub async fn put(&self, document: Document, source_name: &str) -> Result<StoredBook, BookError> {
        let book = StoredBook {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source_name: source_name.to_string(),
            document,
        };
        let path = self.book_path(&book.id);
        let json = serde_json::to_vec_pretty(&book)
            .map_err(|e| BookError::Internal(format!("serialise book: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|source| BookError::StorageFailed {
                path: tmp_path.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| BookError::StorageFailed {
                path: path.clone(),
                source,
            })?;

        info!(
            "Stored '{}' as {} ({} pages)",
            book.document.title,
            book.id,
            book.document.pages.len()
        );
        Ok(book)
    }

    pub async fn get(&self, id: &Uuid) -> Result<StoredBook, BookError> {
        let path = self.book_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BookError::BookNotFound { id: id.to_string() });
            }
            Err(source) => return Err(BookError::StorageFailed { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|e| BookError::CorruptBook {
            path,
            detail: e.to_string(),
        })
    }

    /// Every readable book, oldest first.
    pub async fn list(&self) -> Result<Vec<StoredBook>, BookError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| BookError::StorageFailed {
                path: self.dir.clone(),
                source,
            })?;

        let mut books = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| BookError::StorageFailed {
                path: self.dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|b| serde_json::from_slice::<StoredBook>(&b).map_err(|e| e.to_string()));
            match parsed {
                Ok(book) => books.push(book),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        books.sort_by_key(|b| b.created_at);
        Ok(books)
    }

    pub async fn delete(&self, id: &Uuid) -> Result<(), BookError> {
        let path = self.book_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted book {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BookError::BookNotFound { id: id.to_string() })
            }
            Err(source) => Err(BookError::StorageFailed { path, source }),
        }
    }

    /// Resolve a full id or a unique prefix of one (as printed by `list`).
    pub async fn find(&self, id_or_prefix: &str) -> Result<StoredBook, BookError> {
        if let Ok(id) = Uuid::parse_str(id_or_prefix) {
            return self.get(&id).await;
        }
        let prefix = id_or_prefix.to_ascii_lowercase();
        let mut matches: Vec<StoredBook> = self
            .list()
            .await?
            .into_iter()
            .filter(|b| !prefix.is_empty() && b.id.to_string().starts_with(&prefix))
            .collect();
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(BookError::BookNotFound {
                id: id_or_prefix.to_string(),
            }),
            n => Err(BookError::InvalidInput {
                input: format!("'{id_or_prefix}' matches {n} books"),
            }),
        }
    }

    fn book_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}
