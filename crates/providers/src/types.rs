//! Provider-side type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Represents a source document in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSource {
    /// Unique source identifier
    pub id: String,

    /// Source path on disk
    pub path: Option<PathBuf>,

    /// Content type string ("markdown", "text", ...)
    pub content_type: String,

    /// When this source was indexed
    pub indexed_at: DateTime<Utc>,

    /// Source size in bytes
    pub size_bytes: u64,
}

/// A text chunk with embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Unique chunk identifier
    pub id: String,

    /// Source document ID
    pub source_id: String,

    /// Position within source
    pub position: u32,

    /// Text content
    pub text: String,

    /// Embedding vector (normalized)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Metadata (e.g., source file name, byte offsets)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Internal chunk candidate before embedding.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub source_id: String,
    pub position: u32,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// Options for the learn (ingestion) operation.
#[derive(Debug, Clone)]
pub struct LearnOptions {
    /// Local paths to learn from
    pub paths: Vec<PathBuf>,

    /// Include patterns (substring match)
    pub include: Vec<String>,

    /// Exclude patterns (substring match)
    pub exclude: Vec<String>,

    /// Reset the index before learning
    pub reset: bool,

    /// Chunk size in characters
    pub chunk_size: usize,

    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for LearnOptions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            reset: false,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Statistics from a learn operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnStats {
    /// Number of sources processed
    pub sources_count: u32,

    /// Number of chunks created
    pub chunks_count: u32,

    /// Total bytes processed
    pub bytes_processed: u64,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Statistics for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of sources
    pub sources_count: u32,

    /// Number of chunks
    pub chunks_count: u32,

    /// Database size in bytes
    pub db_size_bytes: u64,
}
