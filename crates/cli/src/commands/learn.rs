//! Learn command handler.
//!
//! Ingests local documents into the vector index.

use clap::Args;
use selfrag_core::{config::AppConfig, AppResult};
use selfrag_providers::{learn, LearnOptions, TrigramEmbedder};
use std::path::PathBuf;

/// Ingest documents into the vector index
#[derive(Args, Debug)]
pub struct LearnCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Include only paths containing these patterns
    #[arg(long)]
    pub include: Vec<String>,

    /// Exclude paths containing these patterns
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Reset the index before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Chunk size in characters
    #[arg(long, default_value = "1000")]
    pub chunk_size: usize,

    /// Overlap between chunks in characters
    #[arg(long, default_value = "200")]
    pub chunk_overlap: usize,
}

impl LearnCommand {
    /// Execute the learn command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing learn command");

        let embedder = TrigramEmbedder::default();

        let options = LearnOptions {
            paths: self.paths.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            reset: self.reset,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        };

        let stats = learn(&config.index_path(), &embedder, options).await?;

        println!(
            "Learned {} sources ({} chunks, {} bytes) in {:.2}s",
            stats.sources_count, stats.chunks_count, stats.bytes_processed, stats.duration_secs
        );

        Ok(())
    }
}
