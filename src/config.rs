//! Environment-sourced configuration.
//!
//! All settings are read once at process start into an explicit
//! [`Config`] that is passed by reference into each component; nothing
//! reads the environment after startup. Required variables are
//! validated eagerly so a misconfigured process fails before any remote
//! call or database write.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Top-level configuration, grouped by concern.
#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path of the SQLite database file. Parent directories are created
    /// on connect.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding API, e.g. `https://api.openai.com/v1`.
    pub api_base: String,
    pub api_key: String,
    /// Model identifier, e.g. `text-embedding-3-small`.
    pub model: String,
    /// Maximum simultaneous in-flight embedding calls.
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Config {
    /// Load and validate configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a
    /// numeric variable fails to parse or is out of range.
    pub fn from_env() -> Result<Self> {
        let config = Config {
            db: DbConfig {
                path: PathBuf::from(env_or("RAG_DB_PATH", "rag_data/rag.sqlite")),
            },
            chunking: ChunkingConfig {
                chunk_size: parse_env("OPENAI_CHUNK_SIZE", 300)?,
                chunk_overlap: parse_env("RAG_CHUNK_OVERLAP", 0)?,
            },
            embedding: EmbeddingConfig {
                api_base: require_env("OPENAI_API_BASE")?,
                api_key: require_env("OPENAI_API_KEY")?,
                model: env_or("OPENAI_MODEL", "text-embedding-3-small"),
                concurrency: parse_env("RAG_EMBED_CONCURRENCY", 10)?,
                timeout_secs: parse_env("RAG_EMBED_TIMEOUT_SECS", 30)?,
                max_retries: parse_env("RAG_EMBED_MAX_RETRIES", 5)?,
            },
        };

        if config.chunking.chunk_size == 0 {
            return Err(Error::Config("OPENAI_CHUNK_SIZE must be > 0".to_string()));
        }
        if config.chunking.chunk_overlap >= config.chunking.chunk_size {
            return Err(Error::Config(
                "RAG_CHUNK_OVERLAP must be smaller than OPENAI_CHUNK_SIZE".to_string(),
            ));
        }
        if config.embedding.concurrency == 0 {
            return Err(Error::Config(
                "RAG_EMBED_CONCURRENCY must be > 0".to_string(),
            ));
        }

        Ok(config)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("missing environment variable: {}", name)))
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("invalid value for {}: {}", name, raw))),
        _ => Ok(default),
    }
}
