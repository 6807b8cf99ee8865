//! snapshot.rs
//!
//! The recorded state of every indexed document, in row order.
//!
//! Row order is the only link between a vector and its document: record `i`
//! was embedded into row `i` of the index built alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub content: String,
    pub modified_at: DateTime<Utc>,
    pub content_hash: String,
}

/// Ordered id → record map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<DocumentRecord>", into = "Vec<DocumentRecord>")]
pub struct CorpusSnapshot {
    records: Vec<DocumentRecord>,
    positions: HashMap<String, usize>,
}

impl CorpusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, or replaces an existing record with the same id in
    /// place (its ordinal is kept). Returns the record's ordinal.
    pub fn upsert(&mut self, record: DocumentRecord) -> usize {
        if let Some(&pos) = self.positions.get(&record.id) {
            self.records[pos] = record;
            return pos;
        }
        let pos = self.records.len();
        self.positions.insert(record.id.clone(), pos);
        self.records.push(record);
        pos
    }

    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn record_at(&self, row: usize) -> Option<&DocumentRecord> {
        self.records.get(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    /// Contents in row order.
    pub fn ordered_content(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.content.as_str()).collect()
    }
}

impl From<Vec<DocumentRecord>> for CorpusSnapshot {
    fn from(records: Vec<DocumentRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.upsert(record);
        }
        snapshot
    }
}

impl From<CorpusSnapshot> for Vec<DocumentRecord> {
    fn from(snapshot: CorpusSnapshot) -> Self {
        snapshot.records
    }
}
