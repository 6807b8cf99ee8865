//! vector_index.rs
//!
//! Exact k-nearest-neighbour index over L2-normalized embeddings, plus the
//! immutable (index, snapshot) pair that queries read from.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::snapshot::CorpusSnapshot;

#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("row count mismatch: {vectors} vectors for {records} documents")]
    RowMismatch { vectors: usize, records: usize },
}

/// One search result: the row and its squared Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub distance: f32,
}

/// Flat row-major vector storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

/// Heap entry ordered by (distance, row); the max-heap keeps the worst on top.
#[derive(PartialEq)]
struct Candidate(f32, usize);

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

impl VectorIndex {
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Builds the index from rows in order; every row must be `dimension` long.
    pub fn build(dimension: usize, rows: &[Vec<f32>]) -> Result<Self, IndexError> {
        let mut data = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Top `min(k, N)` rows by ascending squared Euclidean distance; ties go
    /// to the lower row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (row, vector) in self.data.chunks_exact(self.dimension).enumerate() {
            let candidate = Candidate(squared_l2(query, vector), row);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|Candidate(distance, row)| SearchHit { row, distance })
            .collect())
    }
}

#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// A published index together with the snapshot that produced it.
/// Never mutated once constructed.
#[derive(Debug)]
pub struct VectorIndexState {
    generation: u64,
    built_at: Option<DateTime<Utc>>,
    index: VectorIndex,
    snapshot: CorpusSnapshot,
}

impl VectorIndexState {
    pub fn empty(dimension: usize) -> Self {
        Self {
            generation: 0,
            built_at: None,
            index: VectorIndex::empty(dimension),
            snapshot: CorpusSnapshot::new(),
        }
    }

    /// Pairs an index with its snapshot; they must have the same row count.
    pub fn new(
        generation: u64,
        built_at: Option<DateTime<Utc>>,
        index: VectorIndex,
        snapshot: CorpusSnapshot,
    ) -> Result<Self, IndexError> {
        if index.len() != snapshot.len() {
            return Err(IndexError::RowMismatch {
                vectors: index.len(),
                records: snapshot.len(),
            });
        }
        Ok(Self {
            generation,
            built_at,
            index,
            snapshot,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn snapshot(&self) -> &CorpusSnapshot {
        &self.snapshot
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// The stored vector for a document id.
    pub fn vector_for(&self, id: &str) -> Option<&[f32]> {
        self.snapshot
            .position(id)
            .and_then(|row| self.index.row(row))
    }
}
