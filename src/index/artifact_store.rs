//! artifact_store.rs
//!
//! Durable storage for the published index:
//! - `vector_index.bin`  bincode `VectorIndex`
//! - `doc_snapshot.json` ordered document records + index checksum
//! - `last_rebuild.txt`  RFC 3339 timestamp of the last successful rebuild
//!
//! The three artifacts are written together after every successful rebuild
//! and read together at startup. An incomplete or inconsistent set loads as
//! "no index".

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::index::checksum::artifact_checksum;
use crate::index::snapshot::CorpusSnapshot;
use crate::index::vector_index::{IndexError, VectorIndex, VectorIndexState};

pub const INDEX_FILE: &str = "vector_index.bin";
pub const SNAPSHOT_FILE: &str = "doc_snapshot.json";
pub const TIMESTAMP_FILE: &str = "last_rebuild.txt";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("index checksum mismatch: snapshot expects {expected}, index file is {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("artifacts were built for dimension {stored}, engine runs with {configured}")]
    DimensionChanged { stored: usize, configured: usize },

    #[error("inconsistent artifacts: {0}")]
    Layout(#[from] IndexError),
}

/// On-disk form of the snapshot artifact.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotArtifact {
    generation: u64,
    dimension: usize,
    model: String,
    index_checksum: String,
    documents: CorpusSnapshot,
}

#[derive(Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    model: String,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, model: S) -> Self {
        Self {
            dir: dir.into(),
            model: model.into(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Writes all three artifacts. Each is staged in a `.tmp` sibling and
    /// renamed into place only after every write succeeded, so a failure
    /// leaves the previous set untouched.
    pub fn persist(
        &self,
        state: &VectorIndexState,
        rebuilt_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;

        let index_bytes = bincode::serialize(state.index())?;
        let snapshot = SnapshotArtifact {
            generation: state.generation(),
            dimension: state.dimension(),
            model: self.model.clone(),
            index_checksum: artifact_checksum(&index_bytes),
            documents: state.snapshot().clone(),
        };
        let snapshot_bytes = serde_json::to_vec_pretty(&snapshot)?;
        let stamp = rebuilt_at.to_rfc3339();

        let staged = [
            (INDEX_FILE, index_bytes.as_slice()),
            (SNAPSHOT_FILE, snapshot_bytes.as_slice()),
            (TIMESTAMP_FILE, stamp.as_bytes()),
        ];

        for (name, bytes) in &staged {
            let tmp = self.path(&format!("{name}.tmp"));
            if let Err(e) = fs::write(&tmp, bytes) {
                self.discard_staged();
                return Err(io_err(&tmp, e));
            }
        }
        for (name, _) in &staged {
            let tmp = self.path(&format!("{name}.tmp"));
            let dst = self.path(name);
            fs::rename(&tmp, &dst).map_err(|e| io_err(&dst, e))?;
        }

        info!(
            "persisted generation {} ({} documents) to {}",
            state.generation(),
            state.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn discard_staged(&self) {
        for name in [INDEX_FILE, SNAPSHOT_FILE, TIMESTAMP_FILE] {
            let _ = fs::remove_file(self.path(&format!("{name}.tmp")));
        }
    }

    /// Loads the persisted state, or `None` when there is no usable set.
    pub fn load(&self, dimension: usize) -> Option<VectorIndexState> {
        match self.try_load(dimension) {
            Ok(Some(state)) => {
                info!(
                    "loaded generation {} with {} documents from {}",
                    state.generation(),
                    state.len(),
                    self.dir.display()
                );
                Some(state)
            }
            Ok(None) => {
                info!("no persisted index in {}; starting empty", self.dir.display());
                None
            }
            Err(e) => {
                warn!("ignoring persisted index in {}: {e}", self.dir.display());
                None
            }
        }
    }

    pub fn try_load(&self, dimension: usize) -> Result<Option<VectorIndexState>, PersistenceError> {
        let paths = [INDEX_FILE, SNAPSHOT_FILE, TIMESTAMP_FILE].map(|n| self.path(n));
        let present = paths.iter().filter(|p| p.is_file()).count();
        if present == 0 {
            return Ok(None);
        }
        if present < paths.len() {
            warn!(
                "partial artifact set in {} ({present} of {}); treating as no index",
                self.dir.display(),
                paths.len()
            );
            return Ok(None);
        }
        let [index_path, snapshot_path, _] = &paths;

        let index_bytes = fs::read(index_path).map_err(|e| io_err(index_path, e))?;
        let snapshot_bytes = fs::read(snapshot_path).map_err(|e| io_err(snapshot_path, e))?;
        let snapshot: SnapshotArtifact = serde_json::from_slice(&snapshot_bytes)?;

        let actual = artifact_checksum(&index_bytes);
        if actual != snapshot.index_checksum {
            return Err(PersistenceError::ChecksumMismatch {
                expected: snapshot.index_checksum,
                actual,
            });
        }
        if snapshot.dimension != dimension {
            return Err(PersistenceError::DimensionChanged {
                stored: snapshot.dimension,
                configured: dimension,
            });
        }
        if snapshot.model != self.model {
            warn!(
                "artifacts were built with model {:?}, engine uses {:?}",
                snapshot.model, self.model
            );
        }

        let index: VectorIndex = bincode::deserialize(&index_bytes)?;
        if index.dimension() != dimension {
            return Err(PersistenceError::DimensionChanged {
                stored: index.dimension(),
                configured: dimension,
            });
        }
        let built_at = self.last_rebuild()?;
        let state =
            VectorIndexState::new(snapshot.generation, built_at, index, snapshot.documents)?;
        Ok(Some(state))
    }

    /// Timestamp of the last successful rebuild, if one was recorded.
    pub fn last_rebuild(&self) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let path = self.path(TIMESTAMP_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let parsed = DateTime::parse_from_rfc3339(raw.trim())?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}
