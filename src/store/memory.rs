//! In-memory [`VectorStore`] implementation.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock` for thread
//! safety. Search is brute-force cosine similarity over all stored
//! vectors. Serves as the embedded non-durable backend and as the test
//! double for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{DocumentSource, Metadata, RetrievalResult, StoredRecord};

use super::VectorStore;

struct MemoryRecord {
    id: String,
    filepath: String,
    chunk_index: i64,
    text: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

/// Non-durable store backed by process memory.
pub struct MemoryVectorStore {
    docs: RwLock<HashMap<String, DocumentSource>>,
    records: RwLock<Vec<MemoryRecord>>,
    closed: AtomicBool,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of records currently held.
    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreConnection("store is closed".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, source: &DocumentSource, records: &[StoredRecord]) -> Result<()> {
        self.ensure_open()?;

        let mut docs = self.docs.write().unwrap();
        let mut stored = self.records.write().unwrap();

        docs.insert(source.filepath.clone(), source.clone());

        for record in records {
            let existing = stored
                .iter_mut()
                .find(|r| r.filepath == source.filepath && r.chunk_index == record.chunk.index);

            match existing {
                // Replace content in place; the original record id survives.
                Some(row) => {
                    row.text = record.chunk.text.clone();
                    row.metadata = record.chunk.metadata.clone();
                    row.vector = record.vector.clone();
                }
                None => stored.push(MemoryRecord {
                    id: record.id.clone(),
                    filepath: source.filepath.clone(),
                    chunk_index: record.chunk.index,
                    text: record.chunk.text.clone(),
                    metadata: record.chunk.metadata.clone(),
                    vector: record.vector.clone(),
                }),
            }
        }

        Ok(())
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        self.ensure_open()?;

        let stored = self.records.read().unwrap();
        let mut scored: Vec<(&MemoryRecord, f64)> = stored
            .iter()
            .map(|r| (r, cosine_similarity(query_vec, &r.vector) as f64))
            .collect();

        // Descending score, record id ascending as the stable tie-break.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.id.cmp(&b.0.id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(r, score)| RetrievalResult {
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
