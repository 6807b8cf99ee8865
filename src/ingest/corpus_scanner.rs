//! corpus_scanner.rs
//!
//! Recursively walks the corpus directory and yields every regular file with
//! its last modification time, respecting `.gitignore`, `.ignore`, and hidden
//! file rules.
//!
//! Responsibilities:
//! - Derive a stable document id (path relative to the corpus root, `/` separated)
//! - Use `ignore::WalkBuilder` to honor .gitignore/.ignore
//! - Read file metadata only; contents are left to the extractor

use chrono::{DateTime, Utc};
use ignore::{DirEntry, WalkBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("corpus root {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// One file currently present in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub id: String,
    pub path: PathBuf,
    /// Bytes on disk.
    pub size: u64,
    /// `None` when the platform or filesystem could not report it.
    pub modified_at: Option<DateTime<Utc>>,
}

/// Listing row shown by the status views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

impl From<&CorpusFile> for CorpusEntry {
    fn from(file: &CorpusFile) -> Self {
        Self {
            id: file.id.clone(),
            size: file.size,
            modified_at: file.modified_at,
        }
    }
}

pub struct CorpusScanner;

impl CorpusScanner {
    pub fn new() -> Self {
        Self
    }

    /// Lists the corpus, sorted by id. A missing root is created and scanned
    /// as empty.
    pub fn scan(&self, root: &Path) -> Result<Vec<CorpusFile>, ScanError> {
        if !root.exists() {
            fs::create_dir_all(root)?;
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .follow_links(false)
            .git_ignore(true)
            .git_exclude(true)
            .git_global(false)
            .ignore(true)
            .require_git(false)
            .build();

        let mut out = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(e) => e,
                Err(e) => {
                    debug!("skipping unreadable corpus entry: {e}");
                    continue;
                }
            };
            if !is_regular_file(&entry) {
                continue;
            }

            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let metadata = entry.metadata().ok();
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified_at = metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            out.push(CorpusFile {
                id: document_id(rel),
                path: entry.path().to_path_buf(),
                size,
                modified_at,
            });
        }

        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

impl Default for CorpusScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().map(|t| t.is_file()).unwrap_or(false)
}

/// Platform-independent id for a corpus-relative path.
pub fn document_id(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
