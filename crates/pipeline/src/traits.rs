//! Collaborator traits consumed by the orchestrator.
//!
//! Every external capability is injected at construction time as a trait
//! object, so each one can be replaced by a test double. Failures are
//! typed (`ProviderError` / `ExecutionError`) and are handled inside the
//! orchestrator; they never abort a run.

use crate::error::{ExecutionError, ProviderError, Verdict};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Provenance-specific metadata attached to retrieved material.
pub type Attributes = BTreeMap<String, String>;

/// A retrieved passage or synthesized search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    /// Text payload
    pub content: String,

    /// Metadata such as source name, position, score, or URL
    pub attributes: Attributes,
}

impl Passage {
    /// Create a passage with no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attributes: Attributes::new(),
        }
    }

    /// Attach one metadata attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Ordered rows returned by a structured query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredRows {
    /// Column names in select order
    pub columns: Vec<String>,

    /// Row values rendered as strings, in result order
    pub rows: Vec<Vec<String>>,
}

impl StructuredRows {
    /// Number of result rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Render the result as a compact text table for use as evidence.
    pub fn render(&self) -> String {
        let mut out = self.columns.join(" | ");
        for row in &self.rows {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&row.join(" | "));
        }
        out
    }
}

/// The structured (relational/tabular) fact source.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Classify whether the question is answerable against the store.
    async fn classify_question(&self, question: &str) -> Result<bool, ProviderError>;

    /// Generate a query in the store's query language, or `None` when
    /// the question turns out not to map onto the schema.
    async fn generate_query(&self, question: &str) -> Result<Option<String>, ProviderError>;

    /// Execute a generated query against the store.
    async fn execute_query(&self, query: &str) -> Result<StructuredRows, ExecutionError>;
}

/// The similarity index over the document corpus.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return the top-k passages most similar to the question,
    /// most similar first. An empty result is valid.
    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Passage>, ProviderError>;
}

/// The live web-search fallback.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Search the web for the question and synthesize one result.
    async fn search(&self, question: &str) -> Result<Passage, ProviderError>;
}

/// The three binary graders of the self-reflection loop.
#[async_trait]
pub trait Grader: Send + Sync {
    /// Is this passage relevant to the question?
    async fn grade_relevance(&self, question: &str, content: &str)
        -> Result<Verdict, ProviderError>;

    /// Is the answer supported by the given evidence?
    async fn grade_grounding(&self, evidence: &str, answer: &str)
        -> Result<Verdict, ProviderError>;

    /// Does the answer actually address the question?
    async fn grade_adequacy(&self, question: &str, answer: &str)
        -> Result<Verdict, ProviderError>;
}

/// The answer generator.
///
/// Contract: with empty context the generator must return a clear
/// cannot-answer response rather than hallucinate.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer for the question from the concatenated context.
    async fn generate(&self, question: &str, context: &str) -> Result<String, ProviderError>;
}

/// The query rewriter of the self-reflection loop.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// Rewrite a question into a better-retrievable equivalent form.
    async fn rewrite(&self, question: &str) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_rows() {
        let rows = StructuredRows {
            columns: vec!["player".to_string(), "runs".to_string()],
            rows: vec![
                vec!["V Kohli".to_string(), "6283".to_string()],
                vec!["R Sharma".to_string(), "5879".to_string()],
            ],
        };

        assert_eq!(rows.row_count(), 2);
        assert_eq!(
            rows.render(),
            "player | runs\nV Kohli | 6283\nR Sharma | 5879"
        );
    }

    #[test]
    fn test_render_empty_rows() {
        let rows = StructuredRows {
            columns: vec!["count".to_string()],
            rows: vec![],
        };
        assert_eq!(rows.row_count(), 0);
        assert_eq!(rows.render(), "count");
    }

    #[test]
    fn test_passage_builder() {
        let passage = Passage::new("text").with_attribute("source", "notes.md");
        assert_eq!(passage.content, "text");
        assert_eq!(passage.attributes.get("source").unwrap(), "notes.md");
    }
}
