//! Core data models used throughout the pipeline.
//!
//! These types represent the chunks, stored records, and retrieval
//! results that flow from the chunker through the embedding client into
//! the vector store and back out of a query.

use serde_json::{Map, Value};

/// Scalar metadata attached to a chunk, keyed by name.
pub type Metadata = Map<String, Value>;

/// A bounded-size contiguous slice of a document's text.
///
/// `start_char` / `end_char` are character offsets maintained by the
/// chunker; `index` values are contiguous from 0 within one document.
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub metadata: Metadata,
}

impl Chunk {
    /// The source file path recorded in this chunk's metadata, if any.
    pub fn source_path(&self) -> Option<&str> {
        self.metadata.get("filepath").and_then(|v| v.as_str())
    }
}

/// The source document a batch of records belongs to.
///
/// `filepath` is the upsert identity: re-adding the same path replaces
/// its chunk rows instead of duplicating them. `content_hash` is a
/// SHA-256 over the chunk texts, refreshed on every upsert.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub filepath: String,
    pub filename: String,
    pub content_hash: String,
}

/// The persisted unit: one chunk plus its embedding vector.
///
/// `id` is a generated UUID; the durable uniqueness key is
/// `(document, chunk index)`, so a re-added chunk keeps its original
/// row id in the store.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One ranked hit returned from a similarity search.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity against the query vector; higher is more relevant.
    pub score: f64,
}
