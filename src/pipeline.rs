//! Pipeline orchestration: chunk batches in, ranked results out.
//!
//! [`RagPipeline`] owns an [`EmbeddingClient`] and a [`VectorStore`] and
//! wires them together: `add_documents` embeds a batch of chunks and
//! upserts them grouped by source document; `retrieve` embeds a query
//! and runs a similarity search. Both sides are trait objects, so any
//! embedder/store pairing works.

use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::models::{Chunk, DocumentSource, RetrievalResult, StoredRecord};
use crate::store::VectorStore;

pub struct RagPipeline {
    embedder: Box<dyn EmbeddingClient>,
    store: Box<dyn VectorStore>,
}

impl RagPipeline {
    pub fn new(embedder: Box<dyn EmbeddingClient>, store: Box<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed a batch of chunks and store them.
    ///
    /// Chunks are grouped by the `filepath` recorded in their metadata
    /// and each group is upserted as one document batch, so a failure in
    /// one document's batch does not affect documents already stored.
    /// An empty batch is a no-op and makes no provider calls.
    ///
    /// Returns the number of records handed to the store.
    pub async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_many(&texts).await?;

        let records: Vec<StoredRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredRecord {
                id: Uuid::new_v4().to_string(),
                chunk,
                vector,
            })
            .collect();

        // Group by source path, preserving first-seen document order.
        let mut groups: Vec<(String, Vec<StoredRecord>)> = Vec::new();
        for record in records {
            let filepath = record
                .chunk
                .source_path()
                .ok_or_else(|| {
                    Error::InvalidArgument("chunk metadata is missing filepath".to_string())
                })?
                .to_string();

            match groups.iter_mut().find(|(path, _)| *path == filepath) {
                Some((_, group)) => group.push(record),
                None => groups.push((filepath, vec![record])),
            }
        }

        let mut stored = 0;
        for (filepath, group) in groups {
            let source = document_source(&filepath, &group);
            self.store.upsert(&source, &group).await?;
            stored += group.len();
            info!(filepath = %source.filepath, chunks = group.len(), "stored document");
        }

        Ok(stored)
    }

    /// Embed `query` and return the `k` most similar stored chunks.
    ///
    /// Rejects a blank query or `k == 0` before making any provider
    /// call. An empty store yields an empty list.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("query text is empty".to_string()));
        }
        if k == 0 {
            return Err(Error::InvalidArgument(
                "result count must be at least 1".to_string(),
            ));
        }

        let query_vec = self.embedder.embed_one(query).await?;
        self.store.search(&query_vec, k).await
    }

    /// Release the underlying store. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

fn document_source(filepath: &str, records: &[StoredRecord]) -> DocumentSource {
    let filename = records
        .first()
        .and_then(|r| r.chunk.metadata.get("filename"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            filepath
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(filepath)
                .to_string()
        });

    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.chunk.text.as_bytes());
    }
    let content_hash = format!("{:x}", hasher.finalize());

    DocumentSource {
        filepath: filepath.to_string(),
        filename,
        content_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::store::memory::MemoryVectorStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Deterministic embedder: a small character histogram, so identical
    /// texts embed identically and unrelated texts diverge.
    struct HistogramEmbedder {
        calls: Arc<AtomicUsize>,
    }

    impl HistogramEmbedder {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }

        fn embed(text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; 26];
            for c in text.chars() {
                if c.is_ascii_alphabetic() {
                    v[(c.to_ascii_lowercase() as usize) - ('a' as usize)] += 1.0;
                }
            }
            v
        }
    }

    #[async_trait]
    impl EmbeddingClient for HistogramEmbedder {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| Self::embed(t)).collect())
        }

        async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::embed(text))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::RemoteService("provider down".into()))
        }

        async fn embed_one(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::RemoteService("provider down".into()))
        }
    }

    fn chunk(filepath: &str, index: i64, text: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("filepath".to_string(), json!(filepath));
        metadata.insert("filename".to_string(), json!("doc.txt"));
        metadata.insert("chunk_index".to_string(), json!(index));
        Chunk {
            text: text.to_string(),
            index,
            start_char: 0,
            end_char: text.chars().count() as i64,
            metadata,
        }
    }

    fn pipeline_with_memory_store(
        embedder: Box<dyn EmbeddingClient>,
    ) -> (RagPipeline, Arc<MemoryVectorStore>) {
        // Keep a second handle to the store so tests can inspect it.
        struct SharedStore(Arc<MemoryVectorStore>);

        #[async_trait]
        impl crate::store::VectorStore for SharedStore {
            async fn upsert(
                &self,
                source: &DocumentSource,
                records: &[StoredRecord],
            ) -> Result<()> {
                self.0.upsert(source, records).await
            }

            async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
                self.0.search(query_vec, k).await
            }

            async fn close(&self) -> Result<()> {
                self.0.close().await
            }
        }

        let store = Arc::new(MemoryVectorStore::new());
        let pipeline = RagPipeline::new(embedder, Box::new(SharedStore(Arc::clone(&store))));
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (embedder, calls) = HistogramEmbedder::new();
        let (pipeline, store) = pipeline_with_memory_store(Box::new(embedder));

        let stored = pipeline.add_documents(Vec::new()).await.unwrap();
        assert_eq!(stored, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_add_and_retrieve_roundtrip() {
        let (embedder, _) = HistogramEmbedder::new();
        let (pipeline, _) = pipeline_with_memory_store(Box::new(embedder));

        let stored = pipeline
            .add_documents(vec![
                chunk("/docs/a.txt", 0, "zebra zebra zebra"),
                chunk("/docs/a.txt", 1, "quick brown fox"),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 2);

        let results = pipeline.retrieve("zebra", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "zebra zebra zebra");
        assert!(results[0].score > results[1].score);
        assert_eq!(results[0].metadata["filepath"], json!("/docs/a.txt"));
    }

    #[tokio::test]
    async fn test_groups_by_source_document() {
        let (embedder, _) = HistogramEmbedder::new();
        let (pipeline, store) = pipeline_with_memory_store(Box::new(embedder));

        pipeline
            .add_documents(vec![
                chunk("/docs/a.txt", 0, "alpha"),
                chunk("/docs/b.txt", 0, "beta"),
                chunk("/docs/a.txt", 1, "gamma"),
            ])
            .await
            .unwrap();

        // Same index under different documents must not collide.
        assert_eq!(store.record_count(), 3);
    }

    #[tokio::test]
    async fn test_embed_failure_leaves_store_empty() {
        let (pipeline, store) = pipeline_with_memory_store(Box::new(FailingEmbedder));

        let err = pipeline
            .add_documents(vec![chunk("/docs/a.txt", 0, "alpha")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteService(_)));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_filepath_is_rejected() {
        let (embedder, _) = HistogramEmbedder::new();
        let (pipeline, store) = pipeline_with_memory_store(Box::new(embedder));

        let mut bad = chunk("/docs/a.txt", 0, "alpha");
        bad.metadata.remove("filepath");

        let err = pipeline.add_documents(vec![bad]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_rejects_blank_query_without_embedding() {
        let (embedder, calls) = HistogramEmbedder::new();
        let (pipeline, _) = pipeline_with_memory_store(Box::new(embedder));

        let err = pipeline.retrieve("   ", 5).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = pipeline.retrieve("hello", 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retrieve_empty_store() {
        let (embedder, _) = HistogramEmbedder::new();
        let (pipeline, _) = pipeline_with_memory_store(Box::new(embedder));

        let results = pipeline.retrieve("anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_caps_at_available_records() {
        let (embedder, _) = HistogramEmbedder::new();
        let (pipeline, _) = pipeline_with_memory_store(Box::new(embedder));

        pipeline
            .add_documents(vec![
                chunk("/docs/a.txt", 0, "alpha"),
                chunk("/docs/a.txt", 1, "beta"),
            ])
            .await
            .unwrap();

        let results = pipeline.retrieve("alpha", 5).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (embedder, _) = HistogramEmbedder::new();
        let (pipeline, _) = pipeline_with_memory_store(Box::new(embedder));

        pipeline.close().await.unwrap();
        pipeline.close().await.unwrap();
    }
}
