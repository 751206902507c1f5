//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait defines the persistence operations the
//! pipeline needs, enabling pluggable backends: SQLite for durable
//! storage, in-memory for tests and embedded use.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DocumentSource, RetrievalResult, StoredRecord};

/// Abstract vector storage backend.
///
/// # Contract
///
/// - `upsert` is idempotent by `(document, chunk index)` and atomic per
///   batch: either the whole batch becomes visible or none of it does.
///   Individual rows that violate a constraint are logged and skipped
///   without aborting the rest of the batch.
/// - `search` returns at most `k` results sorted by descending
///   similarity, with a deterministic tie-break. An empty store yields
///   an empty list, never an error.
/// - `close` is idempotent; operations after close fail with
///   [`Error::StoreConnection`](crate::error::Error::StoreConnection).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a batch of records belonging to one source document.
    async fn upsert(&self, source: &DocumentSource, records: &[StoredRecord]) -> Result<()>;

    /// Return the `k` records nearest to `query_vec`, most similar first.
    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievalResult>>;

    /// Release the backing connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}
