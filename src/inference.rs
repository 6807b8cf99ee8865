//! inference.rs
//!
//! Semantic search over the published index.
//!
//! fn query(text) -> Vec<String>
//!   1. Embeds the query text with the same embedder the index was built with
//!   2. Takes one reference to the current `VectorIndexState`
//!   3. Searches it and maps rows back through that same state's snapshot
//!
//! An empty index (nothing built yet, or an empty corpus) yields no results,
//! not an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::client::embedder::Embedder;
use crate::client::embedder_client::EmbedError;
use crate::index::registry::IndexHandle;
use crate::index::vector_index::IndexError;

/// Separator used when retrieved documents are joined into one context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("embedding the query failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("search failed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    /// Squared Euclidean distance to the query vector.
    pub distance: f32,
}

/// Results plus the generation they were read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub generation: u64,
    pub documents: Vec<RetrievedDocument>,
}

pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    handle: Arc<IndexHandle>,
    default_k: usize,
}

impl QueryEngine {
    pub fn new(embedder: Arc<dyn Embedder>, handle: Arc<IndexHandle>, default_k: usize) -> Self {
        Self {
            embedder,
            handle,
            default_k,
        }
    }

    /// Content of the `k` nearest documents (default k when `None`), nearest first.
    pub async fn query(&self, text: &str, k: Option<usize>) -> Result<Vec<String>, QueryError> {
        let results = self.search(text, k).await?;
        Ok(results.documents.into_iter().map(|d| d.content).collect())
    }

    pub async fn search(&self, text: &str, k: Option<usize>) -> Result<SearchResults, QueryError> {
        let k = k.unwrap_or(self.default_k);
        let text = text.trim();

        // one read: rows and records below come from the same state
        let state = self.handle.current();
        if text.is_empty() || k == 0 || state.is_empty() {
            return Ok(SearchResults {
                generation: state.generation(),
                documents: Vec::new(),
            });
        }

        let vector = self.embedder.embed_one(text).await?;
        let hits = state.index().search(&vector, k)?;

        let mut documents = Vec::with_capacity(hits.len());
        for hit in hits {
            let record = state.snapshot().record_at(hit.row).ok_or(IndexError::RowMismatch {
                vectors: state.index().len(),
                records: state.snapshot().len(),
            })?;
            documents.push(RetrievedDocument {
                id: record.id.clone(),
                content: record.content.clone(),
                distance: hit.distance,
            });
        }
        debug!(
            "query matched {} documents in generation {}",
            documents.len(),
            state.generation()
        );

        Ok(SearchResults {
            generation: state.generation(),
            documents,
        })
    }
}

/// Joins retrieved content into a single context block, nearest first.
pub fn join_context<S: AsRef<str>>(documents: &[S]) -> String {
    documents
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
