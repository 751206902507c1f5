//! SQLite [`VectorStore`] implementation.
//!
//! Durable backend with three tables: `documents` (one row per source
//! file, unique by filepath), `chunks` (unique by `(document_id,
//! chunk_index)`), and `embeddings` (one vector BLOB per chunk).
//!
//! Batch upserts run inside a single transaction so a failed commit
//! leaves no partial state. Similarity search fetches all stored
//! vectors and ranks them by cosine similarity in Rust.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::config::DbConfig;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{DocumentSource, Metadata, RetrievalResult, StoredRecord};

use super::VectorStore;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    closed: AtomicBool,
}

impl SqliteVectorStore {
    /// Open (creating if missing) the database at the configured path
    /// and ensure the schema exists.
    pub async fn open(config: &DbConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreConnection("store is closed".to_string()));
        }
        Ok(())
    }

    async fn upsert_document(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        source: &DocumentSource,
    ) -> Result<String> {
        let existing_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE filepath = ?")
                .bind(&source.filepath)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| Error::StoreQuery(e.to_string()))?;

        let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents (id, filepath, filename, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(filepath) DO UPDATE SET
                filename = excluded.filename,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc_id)
        .bind(&source.filepath)
        .bind(&source.filename)
        .bind(&source.content_hash)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::StoreWrite(e.to_string()))?;

        Ok(doc_id)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, source: &DocumentSource, records: &[StoredRecord]) -> Result<()> {
        self.ensure_open()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::StoreConnection(e.to_string()))?;

        let doc_id = self.upsert_document(&mut tx, source).await?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.chunk.metadata)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_text, chunk_index, start_char, end_char, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                    chunk_text = excluded.chunk_text,
                    start_char = excluded.start_char,
                    end_char = excluded.end_char,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&record.id)
            .bind(&doc_id)
            .bind(&record.chunk.text)
            .bind(record.chunk.index)
            .bind(record.chunk.start_char)
            .bind(record.chunk.end_char)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await;

            // A single bad row is skipped; the rest of the batch proceeds.
            if let Err(e) = inserted {
                warn!(
                    chunk_index = record.chunk.index,
                    filepath = %source.filepath,
                    "skipping chunk insert: {}", e
                );
                continue;
            }

            // The conflict clause keeps the original row id, so look it
            // up rather than trusting record.id.
            let chunk_id: String = sqlx::query_scalar(
                "SELECT id FROM chunks WHERE document_id = ? AND chunk_index = ?",
            )
            .bind(&doc_id)
            .bind(record.chunk.index)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::StoreQuery(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO embeddings (chunk_id, document_id, vector)
                VALUES (?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    vector = excluded.vector
                "#,
            )
            .bind(&chunk_id)
            .bind(&doc_id)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::StoreWrite(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::StoreWrite(e.to_string()))?;

        Ok(())
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        self.ensure_open()?;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.chunk_text, c.metadata_json, e.vector
            FROM embeddings e
            JOIN chunks c ON c.id = e.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::StoreQuery(e.to_string()))?;

        struct Scored {
            id: String,
            text: String,
            metadata: Metadata,
            score: f64,
        }

        let mut scored: Vec<Scored> = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("vector");
            let vector = blob_to_vec(&blob);
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json)?;

            scored.push(Scored {
                id: row.get("id"),
                text: row.get("chunk_text"),
                metadata,
                score: cosine_similarity(query_vec, &vector) as f64,
            });
        }

        // Descending score, chunk id ascending as the stable tie-break.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|s| RetrievalResult {
                text: s.text,
                metadata: s.metadata,
                score: s.score,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.close().await;
        }
        Ok(())
    }
}
