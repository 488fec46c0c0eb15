//! Stats command handler.

use clap::Args;
use selfrag_core::{config::AppConfig, AppError, AppResult};
use selfrag_providers::stats;

/// Show index and store statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    /// Execute the stats command.
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let index_stats = stats(&config.index_path())?;
        let structured_present = config.structured_db_path().exists();

        if self.json {
            let output = serde_json::json!({
                "index": {
                    "sources": index_stats.sources_count,
                    "chunks": index_stats.chunks_count,
                    "dbSizeBytes": index_stats.db_size_bytes,
                },
                "structuredStore": {
                    "present": structured_present,
                    "enabled": config.structured.enabled,
                },
            });

            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        println!("Vector index:");
        println!("  sources: {}", index_stats.sources_count);
        println!("  chunks:  {}", index_stats.chunks_count);
        println!("  size:    {} bytes", index_stats.db_size_bytes);
        println!();
        println!(
            "Structured store: {}",
            if structured_present {
                "present"
            } else {
                "not initialized"
            }
        );

        Ok(())
    }
}
