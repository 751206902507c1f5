use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragpipe::config::Config;
use ragpipe::embedding::{BoundedEmbedder, RemoteEmbedder};
use ragpipe::pipeline::RagPipeline;
use ragpipe::store::sqlite::SqliteVectorStore;
use ragpipe::store::VectorStore;
use ragpipe::{ingest, query};

#[derive(Parser)]
#[command(name = "rag", about = "Chunk, embed, and search local documents", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema without ingesting anything
    Init,
    /// Chunk, embed, and store one or more text files
    Add {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Maximum chunk length in characters
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Character overlap carried into offset bookkeeping
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Extra metadata attached to every chunk, as key=value
        #[arg(long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },
    /// Search stored chunks by similarity to a query
    Query {
        /// Query text
        query: String,
        /// Number of results to return
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Init => {
            let store = SqliteVectorStore::open(&config.db).await?;
            store.close().await?;
            println!("Initialized database at {}", config.db.path.display());
            Ok(())
        }
        Commands::Add {
            files,
            chunk_size,
            chunk_overlap,
            meta,
        } => {
            if let Some(size) = chunk_size {
                config.chunking.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                config.chunking.chunk_overlap = overlap;
            }

            let pipeline = build_pipeline(&config).await?;
            let result = ingest::run_add(&pipeline, &files, &config.chunking, &meta).await;
            close_pipeline(&pipeline).await;
            Ok(result?)
        }
        Commands::Query { query, top_k } => {
            let pipeline = build_pipeline(&config).await?;
            let result = query::run_query(&pipeline, &query, top_k).await;
            close_pipeline(&pipeline).await;
            Ok(result?)
        }
    }
}

/// Close without clobbering the command's own result.
async fn close_pipeline(pipeline: &RagPipeline) {
    if let Err(e) = pipeline.close().await {
        tracing::warn!("failed to close store: {}", e);
    }
}

async fn build_pipeline(config: &Config) -> anyhow::Result<RagPipeline> {
    let store = SqliteVectorStore::open(&config.db).await?;
    let remote = RemoteEmbedder::new(&config.embedding)?;
    let embedder = BoundedEmbedder::new(Arc::new(remote), config.embedding.concurrency);
    Ok(RagPipeline::new(Box::new(embedder), Box::new(store)))
}
