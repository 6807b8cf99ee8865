// src/indexing
//! Background reindexing:
//! - wait for a rebuild request (polled on a fixed interval)
//! - scan corpus, diff against the published snapshot
//! - extract + normalize new/updated documents
//! - embed → vectors (batched)
//! - build a complete new index over the whole snapshot
//! - persist → publish
//!
//! One rebuild runs at a time. Requests that arrive while a rebuild is running
//! collapse into a single follow-up rebuild.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::client::embedder::Embedder;
use crate::client::embedder_client::EmbedError;
use crate::index::artifact_store::{ArtifactStore, PersistenceError};
use crate::index::diff::CorpusDiff;
use crate::index::registry::IndexHandle;
use crate::index::snapshot::{CorpusSnapshot, DocumentRecord};
use crate::index::vector_index::{IndexError, VectorIndex, VectorIndexState};
use crate::ingest::corpus_scanner::{CorpusFile, CorpusScanner, ScanError};
use crate::ingest::extractor::{self, ExtractionFailure};
use crate::transform::doc_normalizer::DocNormalizer;

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("corpus scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("index build failed: {0}")]
    Index(#[from] IndexError),

    #[error("persisting artifacts failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RebuildError {
    /// Whether the next poll tick should try again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RebuildError::Index(_))
    }
}

/// The single "rebuild pending" flag.
#[derive(Debug, Default)]
pub struct RebuildSignal {
    pending: AtomicBool,
}

impl RebuildSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a rebuild as pending. Returns false if one already was.
    pub fn request(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }

    /// Clears the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Outcome of one successful rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildReport {
    pub generation: u64,
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Documents whose extraction failed this cycle.
    pub skipped: Vec<String>,
    /// Documents whose text was (re-)embedded this cycle.
    pub embedded: usize,
    pub documents: usize,
    pub elapsed: Duration,
}

pub struct ReindexScheduler {
    corpus_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    handle: Arc<IndexHandle>,
    store: ArtifactStore,
    signal: Arc<RebuildSignal>,
    normalizer: DocNormalizer,
    embed_batch: usize,
    poll_interval: Duration,
    rebuild_lock: Mutex<()>,
}

impl ReindexScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        corpus_dir: PathBuf,
        embedder: Arc<dyn Embedder>,
        handle: Arc<IndexHandle>,
        store: ArtifactStore,
        signal: Arc<RebuildSignal>,
        normalizer: DocNormalizer,
        embed_batch: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            corpus_dir,
            embedder,
            handle,
            store,
            signal,
            normalizer,
            embed_batch: embed_batch.max(1),
            poll_interval,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Polls the rebuild flag until `shutdown` resolves. A rebuild in progress
    /// is finished before shutdown is observed.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "reindex scheduler polling every {:?} for {}",
            self.poll_interval,
            self.corpus_dir.display()
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("reindex scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll: rebuilds if a request is pending. Returns `None` when idle.
    pub async fn tick(&self) -> Option<Result<RebuildReport, RebuildError>> {
        if !self.signal.is_pending() {
            return None;
        }
        let _guard = self.rebuild_lock.lock().await;
        // taken under the lock: requests from here on trigger one follow-up
        if !self.signal.take() {
            return None;
        }
        let result = self.rebuild_locked().await;
        Some(self.finish(result))
    }

    /// Runs a rebuild right away, regardless of the flag.
    pub async fn rebuild_now(&self) -> Result<RebuildReport, RebuildError> {
        let _guard = self.rebuild_lock.lock().await;
        self.signal.take();
        let result = self.rebuild_locked().await;
        self.finish(result)
    }

    fn finish(
        &self,
        result: Result<RebuildReport, RebuildError>,
    ) -> Result<RebuildReport, RebuildError> {
        match &result {
            Ok(report) => info!(
                "rebuild #{} done in {:?}: {} documents ({} new, {} updated, {} deleted, {} embedded, {} skipped)",
                report.generation,
                report.elapsed,
                report.documents,
                report.new,
                report.updated,
                report.deleted,
                report.embedded,
                report.skipped.len()
            ),
            Err(e) if e.is_retryable() => {
                self.signal.request();
                error!("rebuild failed, retrying on next tick: {e}");
            }
            Err(e) => error!("rebuild failed: {e}"),
        }
        result
    }

    async fn rebuild_locked(&self) -> Result<RebuildReport, RebuildError> {
        let started = Instant::now();
        let previous = self.handle.current();

        // 1) scan + diff
        let root = self.corpus_dir.clone();
        let files = tokio::task::spawn_blocking(move || CorpusScanner::new().scan(&root)).await??;
        let diff = CorpusDiff::compute(&files, previous.snapshot());
        info!(
            "rebuild started: {} new, {} updated, {} deleted, {} unchanged",
            diff.new.len(),
            diff.updated.len(),
            diff.deleted.len(),
            diff.unchanged.len()
        );
        if !diff.has_changes() {
            debug!("corpus unchanged since generation {}", previous.generation());
        }

        // 2) extract + normalize
        let by_id: HashMap<&str, &CorpusFile> = files.iter().map(|f| (f.id.as_str(), f)).collect();
        let mut fresh: HashMap<String, DocumentRecord> = HashMap::new();
        let mut skipped = Vec::new();
        for id in diff.pending() {
            let Some(file) = by_id.get(id.as_str()) else {
                continue;
            };
            match self.extract_record(file).await {
                Ok(record) => {
                    fresh.insert(id.clone(), record);
                }
                Err(e) => {
                    warn!("skipping {id}: {e}");
                    skipped.push(id.clone());
                }
            }
        }

        // 3) embed only what has no reusable vector
        let to_embed: Vec<&DocumentRecord> = diff
            .pending()
            .filter_map(|id| fresh.get(id))
            .filter(|r| reusable_vector(&previous, r).is_none())
            .collect();
        let fresh_vectors = self.embed_in_batches(&to_embed).await?;
        let embedded = to_embed.len();

        // 4) assemble the complete snapshot + rows, existing ordinals first
        let mut snapshot = CorpusSnapshot::new();
        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(previous.len() + diff.new.len());
        let mut push = |record: DocumentRecord, vector: Vec<f32>| {
            snapshot.upsert(record);
            rows.push(vector);
        };

        for old in previous.snapshot().iter() {
            if diff.deleted.contains(&old.id) {
                continue;
            }
            let replacement = fresh.remove(&old.id);
            let (record, vector) = match replacement {
                Some(record) => {
                    let vector = fresh_vectors
                        .get(&record.id)
                        .cloned()
                        .or_else(|| reusable_vector(&previous, &record).map(<[f32]>::to_vec));
                    match vector {
                        Some(v) => (record, v),
                        None => (old.clone(), stored_vector(&previous, &old.id)?),
                    }
                }
                // unchanged, or updated but failed extraction this cycle
                None => (old.clone(), stored_vector(&previous, &old.id)?),
            };
            push(record, vector);
        }
        for id in &diff.new {
            if let Some(record) = fresh.remove(id) {
                if let Some(vector) = fresh_vectors.get(id) {
                    push(record, vector.clone());
                }
            }
        }

        // 5) build → persist → publish
        let dimension = self.embedder.dimension();
        let index = VectorIndex::build(dimension, &rows)?;
        let rebuilt_at: DateTime<Utc> = Utc::now();
        let state =
            VectorIndexState::new(previous.generation() + 1, Some(rebuilt_at), index, snapshot)?;

        let store = self.store.clone();
        let state = Arc::new(state);
        let to_persist = Arc::clone(&state);
        tokio::task::spawn_blocking(move || store.persist(&to_persist, rebuilt_at)).await??;

        self.handle.publish(Arc::clone(&state));

        Ok(RebuildReport {
            generation: state.generation(),
            new: diff.new.len(),
            updated: diff.updated.len(),
            deleted: diff.deleted.len(),
            skipped,
            embedded,
            documents: state.len(),
            elapsed: started.elapsed(),
        })
    }

    async fn extract_record(&self, file: &CorpusFile) -> Result<DocumentRecord, ExtractionFailure> {
        let path = file.path.clone();
        let raw = tokio::task::spawn_blocking(move || extractor::extract_path(&path))
            .await
            .map_err(|e| ExtractionFailure::Panicked(e.to_string()))??;

        let modified_at = file.modified_at.unwrap_or_else(Utc::now);
        self.normalizer
            .normalize(&file.id, &raw, modified_at)
            .ok_or(ExtractionFailure::Empty)
    }

    async fn embed_in_batches(
        &self,
        docs: &[&DocumentRecord],
    ) -> Result<HashMap<String, Vec<f32>>, RebuildError> {
        let mut out = HashMap::with_capacity(docs.len());
        for (n, batch) in docs.chunks(self.embed_batch).enumerate() {
            let inputs: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = self.embedder.embed(&inputs).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    sent: batch.len(),
                    got: vectors.len(),
                }
                .into());
            }
            debug!("embedded batch {} ({} documents)", n + 1, batch.len());
            for (doc, vector) in batch.iter().zip(vectors) {
                out.insert(doc.id.clone(), vector);
            }
        }
        Ok(out)
    }
}

/// The published vector for `record`, if its content did not change.
fn reusable_vector<'a>(
    previous: &'a VectorIndexState,
    record: &DocumentRecord,
) -> Option<&'a [f32]> {
    let old = previous.snapshot().get(&record.id)?;
    if old.content_hash == record.content_hash {
        previous.vector_for(&record.id)
    } else {
        None
    }
}

fn stored_vector(previous: &VectorIndexState, id: &str) -> Result<Vec<f32>, IndexError> {
    previous
        .vector_for(id)
        .map(<[f32]>::to_vec)
        .ok_or(IndexError::RowMismatch {
            vectors: previous.index().len(),
            records: previous.snapshot().len(),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;

    use async_trait::async_trait;

    use crate::client::embedder::l2_normalize;

    const DIM: usize = 4;

    /// Maps a handful of concepts onto fixed axes so nearest neighbours are
    /// predictable: cats, dogs, fish, everything else.
    pub(crate) struct KeywordEmbedder {
        fail: AtomicBool,
        embedded: AtomicUsize,
        /// Held by a test to stall `embed` mid-rebuild.
        pub(crate) hold: Mutex<()>,
    }

    impl KeywordEmbedder {
        pub(crate) fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                embedded: AtomicUsize::new(0),
                hold: Mutex::new(()),
            }
        }

        pub(crate) fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn embedded(&self) -> usize {
            self.embedded.load(Ordering::SeqCst)
        }

        pub(crate) fn vector(text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; DIM];
            for word in text
                .split(|c: char| !c.is_alphanumeric())
                .map(str::to_lowercase)
            {
                let axis = match word.as_str() {
                    "" => continue,
                    "cat" | "cats" | "feline" | "felines" | "kitten" => 0,
                    "dog" | "dogs" | "canine" | "puppy" => 1,
                    "fish" | "goldfish" | "aquarium" => 2,
                    _ => 3,
                };
                v[axis] += if axis == 3 { 0.1 } else { 1.0 };
            }
            l2_normalize(&mut v);
            v
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-stub"
        }

        fn dimension(&self) -> usize {
            DIM
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let _held = self.hold.lock().await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(EmbedError::Status {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "stub is down".into(),
                });
            }
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }
    }

    pub(crate) struct Fixture {
        pub(crate) corpus: tempfile::TempDir,
        pub(crate) state: tempfile::TempDir,
        pub(crate) embedder: Arc<KeywordEmbedder>,
        pub(crate) handle: Arc<IndexHandle>,
        pub(crate) signal: Arc<RebuildSignal>,
        pub(crate) scheduler: Arc<ReindexScheduler>,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let corpus = tempfile::tempdir().unwrap();
            let state = tempfile::tempdir().unwrap();
            Self::with_dirs(corpus, state)
        }

        fn with_dirs(corpus: tempfile::TempDir, state: tempfile::TempDir) -> Self {
            let embedder = Arc::new(KeywordEmbedder::new());
            let store = ArtifactStore::new(state.path(), embedder.model_name());
            let initial = store
                .load(DIM)
                .unwrap_or_else(|| VectorIndexState::empty(DIM));
            let handle = Arc::new(IndexHandle::new(initial));
            let signal = Arc::new(RebuildSignal::new());
            let scheduler = Arc::new(ReindexScheduler::new(
                corpus.path().to_path_buf(),
                embedder.clone(),
                Arc::clone(&handle),
                store,
                Arc::clone(&signal),
                DocNormalizer::default(),
                2,
                Duration::from_millis(10),
            ));
            Self {
                corpus,
                state,
                embedder,
                handle,
                signal,
                scheduler,
            }
        }

        pub(crate) fn write(&self, name: &str, body: &str) {
            let path = self.corpus.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, body).unwrap();
        }

        /// Rewrites a file and pushes its mtime into the future so the change
        /// is visible regardless of filesystem timestamp resolution.
        fn touch_newer(&self, name: &str, body: &str) {
            let path = self.corpus.path().join(name);
            fs::write(&path, body).unwrap();
            let later = SystemTime::now() + Duration::from_secs(60);
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(later)
                .unwrap();
        }
    }

    fn assert_aligned(state: &VectorIndexState) {
        assert_eq!(state.index().len(), state.snapshot().len());
        for (row, record) in state.snapshot().iter().enumerate() {
            let stored = state.index().row(row).unwrap();
            let expected = KeywordEmbedder::vector(&record.content);
            for (a, b) in stored.iter().zip(&expected) {
                assert!((a - b).abs() < 1e-6, "row {row} ({}) is misaligned", record.id);
            }
        }
    }

    fn ids(state: &VectorIndexState) -> Vec<&str> {
        state.snapshot().ids().collect()
    }

    #[test]
    fn signal_collapses_requests() {
        let signal = RebuildSignal::new();
        assert!(signal.request());
        assert!(!signal.request());
        assert!(signal.is_pending());
        assert!(signal.take());
        assert!(!signal.take());
        assert!(!signal.is_pending());
    }

    #[tokio::test]
    async fn first_rebuild_indexes_whole_corpus_aligned() {
        let fx = Fixture::new();
        fx.write("b.txt", "Dogs are loyal companions");
        fx.write("a.txt", "Cats purr when content");
        fx.write("notes/c.md", "Goldfish live in an aquarium");

        let report = fx.scheduler.rebuild_now().await.unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!((report.new, report.updated, report.deleted), (3, 0, 0));
        assert_eq!(report.documents, 3);

        let state = fx.handle.current();
        assert_eq!(ids(&state), vec!["a.txt", "b.txt", "notes/c.md"]);
        assert_aligned(&state);
        assert!(state.built_at().is_some());
    }

    #[tokio::test]
    async fn unchanged_corpus_reuses_every_vector() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        fx.write("b.txt", "dogs");
        fx.scheduler.rebuild_now().await.unwrap();
        let before = fx.embedder.embedded();

        let report = fx.scheduler.rebuild_now().await.unwrap();
        assert_eq!((report.new, report.updated, report.deleted), (0, 0, 0));
        assert_eq!(report.embedded, 0);
        assert_eq!(fx.embedder.embedded(), before);
        assert_eq!(report.generation, 2);
        assert_eq!(ids(&fx.handle.current()), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn deletion_removes_row_and_keeps_alignment() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        fx.write("b.txt", "dogs");
        fx.write("c.txt", "fish");
        fx.scheduler.rebuild_now().await.unwrap();

        fs::remove_file(fx.corpus.path().join("b.txt")).unwrap();
        let report = fx.scheduler.rebuild_now().await.unwrap();
        assert_eq!(report.deleted, 1);

        let state = fx.handle.current();
        assert_eq!(ids(&state), vec!["a.txt", "c.txt"]);
        assert!(state.vector_for("b.txt").is_none());
        assert_aligned(&state);
    }

    #[tokio::test]
    async fn updated_document_is_reembedded_in_place() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        fx.write("b.txt", "dogs");
        fx.scheduler.rebuild_now().await.unwrap();

        fx.touch_newer("a.txt", "goldfish in an aquarium");
        fx.write("0-new.txt", "a puppy");
        let report = fx.scheduler.rebuild_now().await.unwrap();
        assert_eq!((report.new, report.updated), (1, 1));
        assert_eq!(report.embedded, 2);

        let state = fx.handle.current();
        // existing rows keep their ordinal, new ones are appended
        assert_eq!(ids(&state), vec!["a.txt", "b.txt", "0-new.txt"]);
        assert_eq!(state.snapshot().get("a.txt").unwrap().content, "goldfish in an aquarium");
        assert_aligned(&state);
    }

    #[tokio::test]
    async fn touched_but_identical_document_keeps_its_vector() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        fx.scheduler.rebuild_now().await.unwrap();
        let before = fx.embedder.embedded();

        fx.touch_newer("a.txt", "cats");
        let report = fx.scheduler.rebuild_now().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.embedded, 0);
        assert_eq!(fx.embedder.embedded(), before);
    }

    #[tokio::test]
    async fn bad_documents_are_skipped_without_blocking_the_rest() {
        let fx = Fixture::new();
        fx.write("good.txt", "cats and kittens");
        fx.write("broken.pdf", "%PDF-1.7 this is not really a pdf");
        fx.write("broken.docx", "not a zip archive");
        fx.write("image.png", "\u{89}PNG");
        fx.write("blank.txt", "   \n\n  ");

        let report = fx.scheduler.rebuild_now().await.unwrap();
        assert_eq!(report.documents, 1);
        let mut skipped = report.skipped.clone();
        skipped.sort();
        assert_eq!(skipped, vec!["blank.txt", "broken.docx", "broken.pdf", "image.png"]);
        assert_eq!(ids(&fx.handle.current()), vec!["good.txt"]);
    }

    #[tokio::test]
    async fn updated_document_that_fails_extraction_keeps_its_old_row() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        fx.write("b.txt", "dogs");
        fx.scheduler.rebuild_now().await.unwrap();
        let before = fx.handle.current();
        let old_vector = before.index().row(0).unwrap().to_vec();

        fx.touch_newer("a.txt", "   ");
        let report = fx.scheduler.rebuild_now().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, vec!["a.txt".to_string()]);
        assert_eq!(report.embedded, 0);

        let state = fx.handle.current();
        assert_eq!(state.generation(), 2);
        assert_eq!(ids(&state), vec!["a.txt", "b.txt"]);
        assert_eq!(state.snapshot().get("a.txt").unwrap().content, "cats");
        assert_eq!(state.index().row(0).unwrap(), old_vector.as_slice());
        assert_aligned(&state);

        // still pending, so the next cycle tries again
        let files = CorpusScanner::new().scan(fx.corpus.path()).unwrap();
        let status = CorpusDiff::compute(&files, state.snapshot()).status();
        assert_eq!(status.updated, vec!["a.txt".to_string()]);
        assert!(status.new.is_empty() && status.deleted.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_keeps_published_state_and_retries() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        fx.scheduler.rebuild_now().await.unwrap();

        fx.write("b.txt", "dogs");
        fx.embedder.set_failing(true);
        fx.signal.request();
        let err = fx.scheduler.tick().await.unwrap().unwrap_err();
        assert!(matches!(err, RebuildError::Embedding(_)));
        assert!(err.is_retryable());
        assert!(fx.signal.is_pending(), "failure re-arms the request");

        let state = fx.handle.current();
        assert_eq!(state.generation(), 1);
        assert_eq!(ids(&state), vec!["a.txt"]);

        fx.embedder.set_failing(false);
        let report = fx.scheduler.tick().await.unwrap().unwrap();
        assert_eq!(report.generation, 2);
        assert_eq!(ids(&fx.handle.current()), vec!["a.txt", "b.txt"]);
        assert!(fx.scheduler.tick().await.is_none());
    }

    #[tokio::test]
    async fn persistence_failure_does_not_publish() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        fx.scheduler.rebuild_now().await.unwrap();

        fx.write("b.txt", "dogs");
        // a directory squatting on the staging path makes the write fail
        let blocker = fx.state.path().join("doc_snapshot.json.tmp");
        fs::create_dir(&blocker).unwrap();
        fx.signal.request();
        let err = fx.scheduler.tick().await.unwrap().unwrap_err();
        assert!(matches!(err, RebuildError::Persistence(_)));
        assert!(fx.signal.is_pending());
        assert_eq!(ids(&fx.handle.current()), vec!["a.txt"]);

        fs::remove_dir(&blocker).unwrap();
        fx.scheduler.tick().await.unwrap().unwrap();
        assert_eq!(ids(&fx.handle.current()), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn tick_is_idle_without_a_request() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        assert!(fx.scheduler.tick().await.is_none());
        assert_eq!(fx.handle.generation(), 0);

        fx.signal.request();
        fx.signal.request();
        assert!(fx.scheduler.tick().await.is_some());
        assert!(fx.scheduler.tick().await.is_none(), "requests collapse into one rebuild");
    }

    #[tokio::test]
    async fn requests_during_a_rebuild_collapse_into_one_follow_up() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        let stall = fx.embedder.hold.lock().await;

        fx.signal.request();
        let scheduler = Arc::clone(&fx.scheduler);
        let running = tokio::spawn(async move { scheduler.tick().await.map(|r| r.is_ok()) });
        while fx.signal.is_pending() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // the rebuild is in flight and stalled inside the embedder
        assert!(fx.signal.request());
        assert!(!fx.signal.request());
        assert!(!fx.signal.request());
        drop(stall);

        assert_eq!(running.await.unwrap(), Some(true));
        assert_eq!(fx.handle.generation(), 1);
        assert!(fx.scheduler.tick().await.is_some());
        assert!(fx.scheduler.tick().await.is_none());
        assert_eq!(fx.handle.generation(), 2);
    }

    #[tokio::test]
    async fn published_state_survives_restart() {
        let corpus = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let corpus_path = corpus.path().to_path_buf();
        let state_path = state.path().to_path_buf();

        let fx = Fixture::with_dirs(corpus, state);
        fx.write("a.txt", "cats");
        fx.write("b.txt", "dogs");
        fx.scheduler.rebuild_now().await.unwrap();
        let Fixture { corpus, state, .. } = fx;

        let restarted = Fixture::with_dirs(corpus, state);
        let loaded = restarted.handle.current();
        assert_eq!(loaded.generation(), 1);
        assert_eq!(ids(&loaded), vec!["a.txt", "b.txt"]);
        assert_aligned(&loaded);
        assert!(corpus_path.exists() && state_path.exists());

        let report = restarted.scheduler.rebuild_now().await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.generation, 2);
    }

    #[tokio::test]
    async fn run_loop_rebuilds_on_request_and_stops_on_shutdown() {
        let fx = Fixture::new();
        fx.write("a.txt", "cats");
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(Arc::clone(&fx.scheduler).run(async move {
            let _ = stopped.await;
        }));

        fx.signal.request();
        for _ in 0..500 {
            if fx.handle.generation() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fx.handle.generation(), 1);

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn only_layout_errors_are_final() {
        let layout = RebuildError::Index(IndexError::RowMismatch { vectors: 1, records: 2 });
        assert!(!layout.is_retryable());
        let scan = RebuildError::Scan(ScanError::NotADirectory(Path::new("x").to_path_buf()));
        assert!(scan.is_retryable());
    }
}
