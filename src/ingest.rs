//! `add` command: read files, chunk them, and push them through the
//! pipeline.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::chunk;
use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::models::{Chunk, Metadata};
use crate::pipeline::RagPipeline;

/// Chunk and ingest the given files.
///
/// All paths are validated up front, so a single bad path fails the
/// whole invocation before any file is embedded. `extra_meta` pairs are
/// copied into every chunk's metadata alongside the generated keys.
pub async fn run_add(
    pipeline: &RagPipeline,
    files: &[PathBuf],
    chunking: &ChunkingConfig,
    extra_meta: &[(String, String)],
) -> Result<()> {
    for file in files {
        if !file.is_file() {
            return Err(Error::FileNotFound(file.display().to_string()));
        }
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    for file in files {
        let file_chunks = chunk_file(file, chunking, extra_meta)?;
        info!(file = %file.display(), chunks = file_chunks.len(), "chunked file");
        chunks.extend(file_chunks);
    }

    let stored = pipeline.add_documents(chunks).await?;
    println!(
        "Added {} file(s), {} chunk(s) stored.",
        files.len(),
        stored
    );
    Ok(())
}

fn chunk_file(
    file: &Path,
    chunking: &ChunkingConfig,
    extra_meta: &[(String, String)],
) -> Result<Vec<Chunk>> {
    let text = std::fs::read_to_string(file)?;

    // Canonical path so re-adding the same file through a different
    // relative path replaces rather than duplicates.
    let filepath = std::fs::canonicalize(file)?.display().to_string();
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filepath.clone());

    let mut metadata = Metadata::new();
    metadata.insert("filename".to_string(), json!(filename));
    metadata.insert("filepath".to_string(), json!(filepath));
    metadata.insert("chunk_size".to_string(), json!(chunking.chunk_size));
    metadata.insert("chunk_overlap".to_string(), json!(chunking.chunk_overlap));
    metadata.insert("added_at".to_string(), json!(Utc::now().to_rfc3339()));
    for (key, value) in extra_meta {
        metadata.insert(key.clone(), json!(value));
    }

    chunk::chunk(&text, chunking.chunk_size, chunking.chunk_overlap, &metadata)
}
