//! Similarity retriever over the SQLite vector index.

use crate::embeddings::EmbeddingProvider;
use crate::index;
use async_trait::async_trait;
use rusqlite::Connection;
use selfrag_core::AppResult;
use selfrag_pipeline::{Passage, ProviderError, Retriever};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Minimum cosine similarity score for a chunk to be considered a match.
/// Scores below this threshold are filtered out before grading.
/// Note: 0.20 is suitable for trigram embeddings; learned embedding
/// models usually want 0.3-0.5.
const MIN_RELEVANCE_SCORE: f32 = 0.20;

/// Retriever backed by the local vector index.
pub struct VectorRetriever {
    conn: Mutex<Connection>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorRetriever {
    /// Open (or create) the index at the given path.
    pub fn open(db_path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        let conn = index::init_index(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    /// Build a retriever from an existing connection (used by tests).
    pub fn from_connection(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            conn: Mutex::new(conn),
            embedder,
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Passage>, ProviderError> {
        let query_embedding = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| ProviderError::new(format!("query embedding failed: {}", e)))?;

        let results = {
            let conn = self
                .conn
                .lock()
                .map_err(|_| ProviderError::new("vector index lock poisoned"))?;
            index::query_chunks(&conn, &query_embedding, k)
                .map_err(|e| ProviderError::new(e.to_string()))?
        };

        let passages: Vec<Passage> = results
            .into_iter()
            .filter(|(_chunk, score)| *score >= MIN_RELEVANCE_SCORE)
            .map(|(chunk, score)| {
                let mut passage = Passage::new(chunk.text)
                    .with_attribute("position", chunk.position.to_string())
                    .with_attribute("score", format!("{:.3}", score));

                if let Some(source) = chunk
                    .metadata
                    .get("source")
                    .and_then(|v| v.as_str())
                {
                    passage = passage.with_attribute("source", source);
                } else {
                    passage = passage.with_attribute("source", &chunk.source_id);
                }

                passage
            })
            .collect();

        tracing::info!(
            count = passages.len(),
            "Vector retrieval complete (threshold {:.2})",
            MIN_RELEVANCE_SCORE
        );

        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TrigramEmbedder;
    use crate::index::{insert_chunk, insert_source};
    use crate::types::{IndexedChunk, IndexedSource};
    use chrono::Utc;

    async fn seeded_retriever() -> VectorRetriever {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE sources (
                id TEXT PRIMARY KEY, path TEXT, content_type TEXT NOT NULL,
                indexed_at TEXT NOT NULL, size_bytes INTEGER NOT NULL
            );
            CREATE TABLE chunks (
                id TEXT PRIMARY KEY, source_id TEXT NOT NULL, position INTEGER NOT NULL,
                text TEXT NOT NULL, embedding BLOB NOT NULL, metadata TEXT
            );
            "#,
        )
        .unwrap();

        let embedder = Arc::new(TrigramEmbedder::new(384));

        insert_source(
            &conn,
            &IndexedSource {
                id: "s1".to_string(),
                path: None,
                content_type: "text".to_string(),
                indexed_at: Utc::now(),
                size_bytes: 64,
            },
        )
        .unwrap();

        let texts = [
            "rust is a systems programming language focused on safety",
            "the recipe calls for two cups of flour and one egg",
        ];
        for (i, text) in texts.iter().enumerate() {
            let embedding = embedder.embed(text).await.unwrap();
            insert_chunk(
                &conn,
                &IndexedChunk {
                    id: format!("c{}", i),
                    source_id: "s1".to_string(),
                    position: i as u32,
                    text: text.to_string(),
                    embedding: Some(embedding),
                    metadata: serde_json::json!({"source": "notes.txt"}),
                },
            )
            .unwrap();
        }

        VectorRetriever::from_connection(conn, embedder)
    }

    #[tokio::test]
    async fn test_retrieve_ranks_similar_first() {
        let retriever = seeded_retriever().await;

        let passages = retriever
            .retrieve("what is the rust programming language", 2)
            .await
            .unwrap();

        assert!(!passages.is_empty());
        assert!(passages[0].content.contains("systems programming"));
        assert_eq!(passages[0].attributes.get("source").unwrap(), "notes.txt");
    }

    #[tokio::test]
    async fn test_retrieve_empty_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE sources (
                id TEXT PRIMARY KEY, path TEXT, content_type TEXT NOT NULL,
                indexed_at TEXT NOT NULL, size_bytes INTEGER NOT NULL
            );
            CREATE TABLE chunks (
                id TEXT PRIMARY KEY, source_id TEXT NOT NULL, position INTEGER NOT NULL,
                text TEXT NOT NULL, embedding BLOB NOT NULL, metadata TEXT
            );
            "#,
        )
        .unwrap();

        let retriever =
            VectorRetriever::from_connection(conn, Arc::new(TrigramEmbedder::new(384)));

        let passages = retriever.retrieve("anything", 4).await.unwrap();
        assert!(passages.is_empty());
    }
}
