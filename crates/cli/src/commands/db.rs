//! Db command handler.
//!
//! Bootstraps and inspects the structured store.

use clap::{Args, Subcommand};
use rusqlite::Connection;
use selfrag_core::{config::AppConfig, AppError, AppResult};
use std::path::PathBuf;

/// Manage the structured store
#[derive(Args, Debug)]
pub struct DbCommand {
    #[command(subcommand)]
    pub command: DbSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum DbSubcommand {
    /// Initialize the structured store from a SQL file
    Init {
        /// SQL file with schema and data statements
        schema: PathBuf,
    },

    /// Show structured-store availability and contents
    Status,
}

impl DbCommand {
    /// Execute the db command.
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.command {
            DbSubcommand::Init { schema } => init(config, schema),
            DbSubcommand::Status => status(config),
        }
    }
}

fn init(config: &AppConfig, schema: &PathBuf) -> AppResult<()> {
    let sql = std::fs::read_to_string(schema)
        .map_err(|e| AppError::Structured(format!("Failed to read {:?}: {}", schema, e)))?;

    let db_path = config.structured_db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Structured(format!("Failed to create store directory: {}", e)))?;
    }

    let conn = Connection::open(&db_path)
        .map_err(|e| AppError::Structured(format!("Failed to open store: {}", e)))?;

    conn.execute_batch(&sql)
        .map_err(|e| AppError::Structured(format!("Failed to apply {:?}: {}", schema, e)))?;

    let tables = table_names(&conn)?;

    println!(
        "Initialized structured store at {:?} ({} tables: {})",
        db_path,
        tables.len(),
        tables.join(", ")
    );

    Ok(())
}

fn status(config: &AppConfig) -> AppResult<()> {
    let db_path = config.structured_db_path();

    if !db_path.exists() {
        println!("Structured store not initialized (expected at {:?})", db_path);
        return Ok(());
    }

    let conn = Connection::open(&db_path)
        .map_err(|e| AppError::Structured(format!("Failed to open store: {}", e)))?;

    let tables = table_names(&conn)?;

    println!("Structured store: {:?}", db_path);
    if tables.is_empty() {
        println!("  (no tables)");
    }
    for table in &tables {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
                row.get(0)
            })
            .unwrap_or(0);
        println!("  {} ({} rows)", table, count);
    }

    if config.structured.schema_description.is_empty() {
        println!();
        println!(
            "Warning: structured.schemaDescription is empty; query generation will have no schema context."
        );
    }

    Ok(())
}

fn table_names(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .map_err(|e| AppError::Structured(e.to_string()))?;

    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| AppError::Structured(e.to_string()))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(names)
}
