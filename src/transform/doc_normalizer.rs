//! doc_normalizer.rs
//!
//! Cleans extracted document text before embedding and indexing.
//!
//! Responsibilities:
//! - Normalize line endings and page breaks
//! - Strip trailing whitespace, collapse runs of blank lines
//! - Truncate overly large documents (safeguard)
//! - Build the `DocumentRecord` with a stable content hash and timestamp
//!
//! Does not split documents: one record, one vector.

use crate::index::checksum;
use crate::index::snapshot::DocumentRecord;
use chrono::{DateTime, Utc};

pub struct DocNormalizer {
    pub max_chars: usize,
}

impl Default for DocNormalizer {
    fn default() -> Self {
        Self {
            max_chars: crate::config::MAX_DOCUMENT_CHARS,
        }
    }
}

impl DocNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Returns `None` when nothing but whitespace remains.
    pub fn normalize(
        &self,
        id: &str,
        raw: &str,
        modified_at: DateTime<Utc>,
    ) -> Option<DocumentRecord> {
        let content = normalize_text(raw, self.max_chars);
        if content.is_empty() {
            return None;
        }
        let content_hash = checksum::content_hash(&content);
        Some(DocumentRecord {
            id: id.to_string(),
            content,
            modified_at,
            content_hash,
        })
    }
}

// ---- helpers ----
fn normalize_text(src: &str, max_chars: usize) -> String {
    let unified = src.replace("\r\n", "\n").replace(['\r', '\u{c}'], "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    let trimmed = out.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_hashes() {
        let now = Utc::now();
        let rec = DocNormalizer::default()
            .normalize("a.txt", "\r\n  cats are great  \r\n\r\n\r\n\u{c}dogs too\n", now)
            .unwrap();
        assert_eq!(rec.content, "cats are great\n\ndogs too");
        assert_eq!(rec.id, "a.txt");
        assert_eq!(rec.modified_at, now);
        assert_eq!(rec.content_hash.len(), 64);
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(DocNormalizer::default()
            .normalize("blank.txt", " \n\t\n ", Utc::now())
            .is_none());
    }

    #[test]
    fn truncates_on_char_boundary() {
        let rec = DocNormalizer::new(3)
            .normalize("u.txt", "héllo wörld", Utc::now())
            .unwrap();
        assert_eq!(rec.content, "hél");
    }

    #[test]
    fn equal_text_equal_hash() {
        let n = DocNormalizer::default();
        let a = n.normalize("a", "same body", Utc::now()).unwrap();
        let b = n.normalize("b", "same body\n", Utc::now()).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }
}
