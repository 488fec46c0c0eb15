//! Self-correcting RAG orchestration.
//!
//! This crate implements the question-answering state machine: a fixed
//! set of nodes (structured query, similarity retrieval, relevance
//! grading, web-search fallback, generation, query rewrite) sequenced by
//! pure routing decisions, with a self-reflection gate that verifies the
//! generated answer is grounded in the retrieved evidence and actually
//! addresses the question, looping back through a query rewrite when it
//! is not. All looping is bounded by a step ceiling.
//!
//! Every external capability (stores, retrievers, graders, generator,
//! rewriter, web search) is a dependency-injected trait object, so the
//! orchestrator can be driven end-to-end with test doubles.

pub mod error;
pub mod orchestrator;
pub mod routing;
pub mod state;
pub mod traits;

pub use error::{ExecutionError, ProviderError, Verdict};
pub use orchestrator::{Node, Orchestrator, PipelineConfig, ProgressEvent};
pub use routing::{decide_route, Route};
pub use state::{EvidenceItem, Provenance, RunOutcome, RunState, TerminalReason};
pub use traits::{
    Attributes, Generator, Grader, Passage, QueryRewriter, Retriever, StructuredRows,
    StructuredStore, WebSearcher,
};
