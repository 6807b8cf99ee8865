//! engine.rs
//!
//! The surface front-ends talk to. Owns the index handle, the rebuild signal,
//! the scheduler and the query engine for one corpus.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::embedder::Embedder;
use crate::config::Settings;
use crate::index::artifact_store::ArtifactStore;
use crate::index::diff::{CorpusDiff, CorpusStatus};
use crate::index::registry::IndexHandle;
use crate::index::vector_index::VectorIndexState;
use crate::indexing::{RebuildError, RebuildReport, RebuildSignal, ReindexScheduler};
use crate::inference::{QueryEngine, QueryError, SearchResults};
use crate::ingest::corpus_scanner::{CorpusEntry, CorpusScanner};
use crate::transform::doc_normalizer::DocNormalizer;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid upload name {0:?}")]
    InvalidName(String),

    #[error("empty upload")]
    Empty,

    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pending changes plus every file currently in the corpus, from one scan.
#[derive(Debug, Clone, Default)]
pub struct CorpusOverview {
    pub status: CorpusStatus,
    pub files: Vec<CorpusEntry>,
}

pub struct RetrievalEngine {
    corpus_dir: PathBuf,
    handle: Arc<IndexHandle>,
    signal: Arc<RebuildSignal>,
    scheduler: Arc<ReindexScheduler>,
    queries: QueryEngine,
}

impl RetrievalEngine {
    /// Loads the persisted index (or starts empty) and wires the components.
    pub fn open(settings: &Settings, embedder: Arc<dyn Embedder>) -> Self {
        let dimension = embedder.dimension();
        let store = ArtifactStore::new(&settings.state_dir, embedder.model_name());
        let initial = store
            .load(dimension)
            .unwrap_or_else(|| VectorIndexState::empty(dimension));

        let handle = Arc::new(IndexHandle::new(initial));
        let signal = Arc::new(RebuildSignal::new());
        let scheduler = Arc::new(ReindexScheduler::new(
            settings.corpus_dir.clone(),
            Arc::clone(&embedder),
            Arc::clone(&handle),
            store,
            Arc::clone(&signal),
            DocNormalizer::new(settings.max_document_chars),
            settings.embed_batch,
            settings.poll_interval,
        ));
        let queries = QueryEngine::new(embedder, Arc::clone(&handle), settings.top_k);

        Self {
            corpus_dir: settings.corpus_dir.clone(),
            handle,
            signal,
            scheduler,
            queries,
        }
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    /// Marks a rebuild as pending; the scheduler picks it up on its next tick.
    pub fn request_reindex(&self) {
        if self.signal.request() {
            info!("reindex requested");
        }
    }

    pub fn reindex_pending(&self) -> bool {
        self.signal.is_pending()
    }

    pub async fn query(&self, text: &str, k: Option<usize>) -> Result<Vec<String>, QueryError> {
        self.queries.query(text, k).await
    }

    pub async fn search(&self, text: &str, k: Option<usize>) -> Result<SearchResults, QueryError> {
        self.queries.search(text, k).await
    }

    /// What the next rebuild would pick up.
    pub async fn corpus_status(&self) -> Result<CorpusStatus, RebuildError> {
        Ok(self.corpus_overview().await?.status)
    }

    /// Pending changes and the corpus listing (id, size, mtime), sorted by id.
    pub async fn corpus_overview(&self) -> Result<CorpusOverview, RebuildError> {
        let root = self.corpus_dir.clone();
        let files = tokio::task::spawn_blocking(move || CorpusScanner::new().scan(&root)).await??;
        let status = CorpusDiff::compute(&files, self.handle.current().snapshot()).status();
        Ok(CorpusOverview {
            status,
            files: files.iter().map(CorpusEntry::from).collect(),
        })
    }

    pub fn last_rebuild(&self) -> Option<DateTime<Utc>> {
        self.handle.current().built_at()
    }

    pub fn document_count(&self) -> usize {
        self.handle.current().len()
    }

    pub fn generation(&self) -> u64 {
        self.handle.generation()
    }

    pub async fn rebuild_now(&self) -> Result<RebuildReport, RebuildError> {
        self.scheduler.rebuild_now().await
    }

    /// Starts the background loop; it exits once `shutdown` resolves.
    pub fn spawn_scheduler<F>(&self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(Arc::clone(&self.scheduler).run(shutdown))
    }

    /// Writes an uploaded file into the corpus directory. Only the last path
    /// component of `name` is used. Indexed at the next rebuild.
    pub async fn store_upload(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, UploadError> {
        let file_name = upload_file_name(name)?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        tokio::fs::create_dir_all(&self.corpus_dir)
            .await
            .map_err(|source| UploadError::Io {
                path: self.corpus_dir.clone(),
                source,
            })?;
        let path = self.corpus_dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| UploadError::Io {
                path: path.clone(),
                source,
            })?;

        info!("stored upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

fn upload_file_name(name: &str) -> Result<&str, UploadError> {
    let invalid = || UploadError::InvalidName(name.to_string());
    // both separators, whatever the host platform
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if last.is_empty() || last.starts_with('.') {
        return Err(invalid());
    }
    match Path::new(last).components().next() {
        Some(Component::Normal(_)) => Ok(last),
        _ => Err(invalid()),
    }
}
