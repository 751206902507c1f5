//! Embedding client abstraction and implementations.
//!
//! Defines the [`EmbeddingClient`] trait and two concrete variants:
//! - **[`RemoteEmbedder`]** — one provider call per text, in input order.
//! - **[`BoundedEmbedder`]** — wraps another client and fans out
//!   `embed_one` calls under a concurrency cap (default 10), reassembling
//!   results by input index so output order always matches input order.
//!
//! Also provides vector utilities for the SQLite backend:
//! - [`cosine_similarity`] — compute similarity between two vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! The remote call uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Timeouts and network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! If retries are exhausted the last classified error is returned, so a
//! provider that never stops throttling surfaces as
//! [`Error::RateLimited`](crate::error::Error::RateLimited) and a timed
//! out call as [`Error::Timeout`](crate::error::Error::Timeout).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Default cap on simultaneous in-flight embedding calls.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// A client that turns text into fixed-length embedding vectors.
///
/// `embed_many` is one-to-one and order-preserving with its input
/// regardless of how the implementation schedules the underlying calls.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Remote (sequential) variant ============

/// Embedding client that calls the provider once per text, sequentially.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl RemoteEmbedder {
    /// Build a client with the configured per-call timeout.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::RemoteService(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for RemoteEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(embed_request(&self.client, &self.config, text).await?);
        }
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        embed_request(&self.client, &self.config, text).await
    }
}

// ============ Concurrency-bounded variant ============

/// Wraps another [`EmbeddingClient`] and bounds the number of
/// simultaneous `embed_one` calls during `embed_many`.
///
/// Results are written back by input index, so completion order never
/// affects output order. The first failed call aborts the batch.
pub struct BoundedEmbedder {
    inner: Arc<dyn EmbeddingClient>,
    limit: usize,
}

impl BoundedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingClient>, limit: usize) -> Self {
        Self {
            inner,
            limit: limit.max(1),
        }
    }

    pub fn with_default_limit(inner: Arc<dyn EmbeddingClient>) -> Self {
        Self::new(inner, DEFAULT_CONCURRENCY)
    }
}

#[async_trait]
impl EmbeddingClient for BoundedEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut slots: Vec<Option<Vec<f32>>> = Vec::new();
        slots.resize_with(texts.len(), || None);

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut join_set = JoinSet::new();

        for (idx, text) in texts.iter().enumerate() {
            let inner = Arc::clone(&self.inner);
            let text = text.clone();
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::RemoteService(e.to_string()))?;

            join_set.spawn(async move {
                let result = inner.embed_one(&text).await;
                drop(permit);
                (idx, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (idx, result) =
                joined.map_err(|e| Error::RemoteService(format!("embed task failed: {}", e)))?;
            slots[idx] = Some(result?);
        }

        slots
            .into_iter()
            .map(|s| s.ok_or_else(|| Error::RemoteService("missing embedding result".to_string())))
            .collect()
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_one(text).await
    }
}

// ============ Remote call ============

/// Call the provider's embeddings endpoint with retry/backoff.
async fn embed_request(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let url = format!("{}/embeddings", config.api_base.trim_end_matches('/'));
    let body = serde_json::json!({
        "model": config.model,
        "input": text,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| Error::RemoteService(e.to_string()))?;
                    return parse_embedding_response(&json);
                }

                if status.as_u16() == 429 {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(Error::RateLimited(format!("{}: {}", status, body_text)));
                    continue;
                }

                if status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(Error::RemoteService(format!("{}: {}", status, body_text)));
                    continue;
                }

                // Client error (not 429): retrying will not help.
                let body_text = response.text().await.unwrap_or_default();
                return Err(Error::RemoteService(format!("{}: {}", status, body_text)));
            }
            Err(e) => {
                last_err = Some(classify_transport_error(e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::RemoteService("embedding failed after retries".into())))
}

fn classify_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::RemoteService(e.to_string())
    }
}

/// Extract `data[0].embedding` from a provider response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::RemoteService("invalid embedding response: missing data[0].embedding".into())
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes for SQLite storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_parse_embedding_response() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.25, -0.5, 1.0]}],
            "model": "text-embedding-3-small"
        });
        let vec = parse_embedding_response(&json).unwrap();
        assert_eq!(vec, vec![0.25f32, -0.5, 1.0]);
    }

    #[test]
    fn test_parse_embedding_response_missing_data() {
        let json = serde_json::json!({"error": {"message": "bad request"}});
        let err = parse_embedding_response(&json).unwrap_err();
        assert!(matches!(err, Error::RemoteService(_)));
    }

    /// Embeds `"n"` as `[n]` after a delay inversely proportional to n,
    /// so later inputs complete first under concurrency.
    struct ReversingEmbedder;

    #[async_trait]
    impl EmbeddingClient for ReversingEmbedder {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for t in texts {
                out.push(self.embed_one(t).await?);
            }
            Ok(out)
        }

        async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            let n: u64 = text.parse().unwrap();
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(n * 5))).await;
            Ok(vec![n as f32])
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

    #[tokio::test]
    async fn test_bounded_preserves_input_order() {
        let bounded = BoundedEmbedder::new(Arc::new(ReversingEmbedder), 4);
        let texts: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        let vectors = bounded.embed_many(&texts).await.unwrap();
        assert_eq!(vectors.len(), 8);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v, &vec![i as f32], "result out of order at index {}", i);
        }
    }

    #[tokio::test]
    async fn test_bounded_empty_batch() {
        let bounded = BoundedEmbedder::new(Arc::new(ReversingEmbedder), 4);
        let vectors = bounded.embed_many(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_propagates_failure() {
        let bounded = BoundedEmbedder::new(Arc::new(FailingEmbedder), 2);
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = bounded.embed_many(&texts).await.unwrap_err();
        assert!(matches!(err, Error::RemoteService(_)));
    }

    #[tokio::test]
    async fn test_bounded_limit_floor_is_one() {
        let bounded = BoundedEmbedder::new(Arc::new(ReversingEmbedder), 0);
        let texts = vec!["3".to_string()];
        let vectors = bounded.embed_many(&texts).await.unwrap();
        assert_eq!(vectors, vec![vec![3.0f32]]);
    }
}
