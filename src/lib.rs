//! Minimal retrieval-augmented generation pipeline.
//!
//! Text files are split into fixed-size chunks, embedded through a
//! remote provider, and stored with their vectors in SQLite. Queries
//! are embedded the same way and answered by cosine similarity over the
//! stored vectors.
//!
//! The seams are traits: [`embedding::EmbeddingClient`] for the
//! provider and [`store::VectorStore`] for persistence, composed by
//! [`pipeline::RagPipeline`].

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod store;
