//! Document ingestion: parse, chunk, embed, and store.

use crate::chunker;
use crate::embeddings::EmbeddingProvider;
use crate::index;
use crate::parser;
use crate::types::{IndexStats, IndexedChunk, IndexedSource, LearnOptions, LearnStats};
use chrono::Utc;
use selfrag_core::AppResult;
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

/// Learn from local paths and populate the vector index.
pub async fn learn(
    index_path: &Path,
    embedder: &dyn EmbeddingProvider,
    options: LearnOptions,
) -> AppResult<LearnStats> {
    let start = Instant::now();

    tracing::info!("Starting learn operation");

    let conn = index::init_index(index_path)?;

    if options.reset {
        tracing::info!("Resetting vector index");
        index::reset_index(&conn)?;
    }

    let mut sources_count = 0u32;
    let mut chunks_count = 0u32;
    let mut bytes_processed = 0u64;

    for path in &options.paths {
        if path.is_file() {
            if let Ok((chunks, bytes)) = process_file(&conn, embedder, path, &options).await {
                sources_count += 1;
                chunks_count += chunks;
                bytes_processed += bytes;
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if entry_path.is_file() && should_include(entry_path, &options) {
                    if let Ok((chunks, bytes)) =
                        process_file(&conn, embedder, entry_path, &options).await
                    {
                        sources_count += 1;
                        chunks_count += chunks;
                        bytes_processed += bytes;
                    }
                }
            }
        }
    }

    let duration = start.elapsed();

    tracing::info!(
        "Learn operation completed: {} sources, {} chunks, {} bytes in {:.2}s",
        sources_count,
        chunks_count,
        bytes_processed,
        duration.as_secs_f64()
    );

    Ok(LearnStats {
        sources_count,
        chunks_count,
        bytes_processed,
        duration_secs: duration.as_secs_f64(),
    })
}

/// Process a single file.
async fn process_file(
    conn: &rusqlite::Connection,
    embedder: &dyn EmbeddingProvider,
    path: &Path,
    options: &LearnOptions,
) -> AppResult<(u32, u64)> {
    tracing::debug!("Processing file: {:?}", path);

    let text = parser::parse_file(path)?;
    let size_bytes = text.len() as u64;

    let source_id = uuid::Uuid::new_v4().to_string();
    let source = IndexedSource {
        id: source_id.clone(),
        path: Some(path.to_path_buf()),
        content_type: parser::ContentType::from_path(path).as_str().to_string(),
        indexed_at: Utc::now(),
        size_bytes,
    };

    index::insert_source(conn, &source)?;

    let source_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source_id.clone());

    let candidates = chunker::chunk_text(
        &source_id,
        &text,
        options.chunk_size,
        options.chunk_overlap,
    );

    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;

    let mut chunks_count = 0u32;

    for (candidate, embedding) in candidates.into_iter().zip(embeddings) {
        let mut metadata = candidate.metadata;
        if let Some(object) = metadata.as_object_mut() {
            object.insert(
                "source".to_string(),
                serde_json::Value::String(source_name.clone()),
            );
        }

        let chunk = IndexedChunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: candidate.source_id,
            position: candidate.position,
            text: candidate.text,
            embedding: Some(embedding),
            metadata,
        };

        index::insert_chunk(conn, &chunk)?;
        chunks_count += 1;
    }

    tracing::debug!(
        "Processed {:?}: {} chunks, {} bytes",
        path,
        chunks_count,
        size_bytes
    );

    Ok((chunks_count, size_bytes))
}

/// Check if a file should be included based on patterns.
fn should_include(path: &Path, options: &LearnOptions) -> bool {
    let path_str = path.to_string_lossy();

    // Check excludes first
    for pattern in &options.exclude {
        if path_str.contains(pattern) {
            return false;
        }
    }

    // If includes are specified, must match at least one
    if !options.include.is_empty() {
        for pattern in &options.include {
            if path_str.contains(pattern) {
                return true;
            }
        }
        return false;
    }

    true
}

/// Get statistics for the vector index.
pub fn stats(index_path: &Path) -> AppResult<IndexStats> {
    let conn = index::init_index(index_path)?;
    index::get_stats(&conn, index_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TrigramEmbedder;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_learn_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let docs_dir = temp_dir.path().join("docs");
        fs::create_dir_all(&docs_dir).unwrap();
        fs::write(
            docs_dir.join("notes.txt"),
            "Rust is a systems programming language. ".repeat(40),
        )
        .unwrap();

        let index_path = temp_dir.path().join("index.db");
        let embedder = TrigramEmbedder::new(64);

        let learn_stats = learn(
            &index_path,
            &embedder,
            LearnOptions {
                paths: vec![docs_dir],
                chunk_size: 200,
                chunk_overlap: 50,
                ..LearnOptions::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(learn_stats.sources_count, 1);
        assert!(learn_stats.chunks_count > 1);

        let index_stats = stats(&index_path).unwrap();
        assert_eq!(index_stats.sources_count, 1);
        assert_eq!(index_stats.chunks_count, learn_stats.chunks_count);
        assert!(index_stats.db_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_learn_reset() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "some text content here ".repeat(30)).unwrap();

        let index_path = temp_dir.path().join("index.db");
        let embedder = TrigramEmbedder::new(64);

        let options = LearnOptions {
            paths: vec![file.clone()],
            chunk_size: 100,
            chunk_overlap: 20,
            ..LearnOptions::default()
        };

        learn(&index_path, &embedder, options.clone()).await.unwrap();
        learn(
            &index_path,
            &embedder,
            LearnOptions {
                reset: true,
                ..options
            },
        )
        .await
        .unwrap();

        let index_stats = stats(&index_path).unwrap();
        assert_eq!(index_stats.sources_count, 1);
    }

    #[test]
    fn test_should_include_patterns() {
        let options = LearnOptions {
            include: vec![".md".to_string()],
            exclude: vec!["target".to_string()],
            ..LearnOptions::default()
        };

        assert!(should_include(Path::new("docs/readme.md"), &options));
        assert!(!should_include(Path::new("src/main.rs"), &options));
        assert!(!should_include(Path::new("target/readme.md"), &options));
    }
}
