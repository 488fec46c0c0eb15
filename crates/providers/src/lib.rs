//! Concrete evidence providers and LLM-backed pipeline roles.
//!
//! Everything in this crate is an adapter behind one of the pipeline's
//! collaborator traits: the SQLite structured store, the local vector
//! index with its retriever and embedder, the Tavily web searcher, and
//! the LLM-backed graders, generator, and rewriter. Ingestion (parse →
//! chunk → embed → store) lives here too.

pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod parser;
pub mod retriever;
pub mod roles;
pub mod structured;
pub mod types;
pub mod websearch;

pub use embeddings::{EmbeddingProvider, TrigramEmbedder};
pub use ingest::{learn, stats};
pub use retriever::VectorRetriever;
pub use roles::{LlmGenerator, LlmGrader, LlmRewriter};
pub use structured::{OfflineStructuredStore, SqliteStructuredStore};
pub use types::{IndexStats, LearnOptions, LearnStats};
pub use websearch::{OfflineWebSearcher, TavilySearcher};
