//! diff.rs
//!
//! Classifies the current corpus against the last published snapshot.
//! Pure: reads the file list and the snapshot, mutates neither.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::index::snapshot::CorpusSnapshot;
use crate::ingest::corpus_scanner::CorpusFile;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusDiff {
    pub new: BTreeSet<String>,
    pub updated: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

/// Operator view of pending corpus changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStatus {
    pub new: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl CorpusDiff {
    pub fn compute(files: &[CorpusFile], snapshot: &CorpusSnapshot) -> Self {
        let mut diff = Self::default();
        let mut present: HashSet<&str> = HashSet::with_capacity(files.len());

        for file in files {
            present.insert(file.id.as_str());
            match snapshot.get(&file.id) {
                None => {
                    diff.new.insert(file.id.clone());
                }
                Some(known) => {
                    // unknown mtime: re-extract rather than trust the snapshot
                    let changed = file
                        .modified_at
                        .is_none_or(|seen| seen > known.modified_at);
                    if changed {
                        diff.updated.insert(file.id.clone());
                    } else {
                        diff.unchanged.insert(file.id.clone());
                    }
                }
            }
        }

        diff.deleted = snapshot
            .ids()
            .filter(|id| !present.contains(id))
            .map(str::to_string)
            .collect();

        diff
    }

    /// Documents that need extraction and embedding.
    pub fn pending(&self) -> impl Iterator<Item = &String> {
        self.new.iter().chain(self.updated.iter())
    }

    pub fn has_changes(&self) -> bool {
        !(self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty())
    }

    pub fn status(&self) -> CorpusStatus {
        CorpusStatus {
            new: self.new.iter().cloned().collect(),
            updated: self.updated.iter().cloned().collect(),
            deleted: self.deleted.iter().cloned().collect(),
        }
    }
}
