//! Run state and evidence model.
//!
//! A `RunState` is created per question, owned exclusively by the
//! orchestrator, threaded through every node, and discarded at a
//! terminal state. Evidence accumulates in insertion order; that order
//! is the display/citation order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Deterministic result of a generated query against the structured store
    StructuredStore,
    /// Passage returned by the similarity index
    SimilarityIndex,
    /// Synthesized web-search result
    WebSearch,
    /// Diagnostic record of a failed structured-store call
    StructuredStoreError,
    /// Diagnostic record of a failed web search
    WebSearchError,
}

impl Provenance {
    /// Stable string form used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredStore => "structured_store",
            Self::SimilarityIndex => "similarity_index",
            Self::WebSearch => "web_search",
            Self::StructuredStoreError => "structured_store_error",
            Self::WebSearchError => "web_search_error",
        }
    }

    /// Error-tagged items exist only for diagnostic propagation: they are
    /// never graded, never used as generation context, and never cited.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::StructuredStoreError | Self::WebSearchError)
    }
}

/// One unit of retrieved material with a provenance tag.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Text payload: passage, synthesized web summary, or rendered rows
    pub content: String,

    /// Provenance tag
    pub provenance: Provenance,

    /// Provenance-specific metadata (executed query, row count, source, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EvidenceItem {
    /// Create an evidence item with no attributes.
    pub fn new(provenance: Provenance, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            provenance,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach one metadata attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach a batch of metadata attributes.
    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }
}

/// Mutable state of one question-answering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Current working question; replaced by the query rewriter
    pub question: String,

    /// Immutable copy of the initial question, used for adequacy grading
    pub original_question: String,

    /// Accumulated evidence in insertion order
    pub evidence: Vec<EvidenceItem>,

    /// Generated answer; absent until generation succeeds
    pub answer: Option<String>,

    /// True iff the structured store contributed a non-error item this run
    pub is_structured_hit: bool,

    /// True iff the structured store is reachable; once false, stays false
    pub structured_source_available: bool,

    /// True once the web-search fallback has been invoked this run
    pub attempted_web_search: bool,

    /// Number of query rewrites performed
    pub iteration_count: u32,

    /// Total node executions; bounded by the configured ceiling
    pub steps: u32,
}

impl RunState {
    /// Create the state for a fresh run.
    pub fn new(question: impl Into<String>, structured_source_available: bool) -> Self {
        let question = question.into();
        Self {
            original_question: question.clone(),
            question,
            evidence: Vec::new(),
            answer: None,
            is_structured_hit: false,
            structured_source_available,
            attempted_web_search: false,
            iteration_count: 0,
            steps: 0,
        }
    }

    /// Append an evidence item, suppressing duplicate-identity items
    /// (same provenance and content). Returns whether it was appended.
    pub fn push_evidence(&mut self, item: EvidenceItem) -> bool {
        let duplicate = self
            .evidence
            .iter()
            .any(|existing| existing.provenance == item.provenance && existing.content == item.content);

        if duplicate {
            tracing::debug!(
                provenance = item.provenance.as_str(),
                "Suppressing duplicate evidence item"
            );
            return false;
        }

        self.evidence.push(item);
        true
    }

    /// Mark the structured store down for the remainder of the run.
    ///
    /// The flag never transitions back to true within a run.
    pub fn mark_structured_unavailable(&mut self) {
        self.structured_source_available = false;
    }

    /// Whether any structured-store (non-error) item is held.
    pub fn has_structured_evidence(&self) -> bool {
        self.evidence
            .iter()
            .any(|item| item.provenance == Provenance::StructuredStore)
    }

    /// Evidence usable as generation context and grounding facts
    /// (error-tagged diagnostics excluded).
    pub fn supporting_evidence(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.evidence.iter().filter(|item| !item.provenance.is_error())
    }

    /// Number of supporting (non-error) evidence items.
    pub fn supporting_evidence_count(&self) -> usize {
        self.supporting_evidence().count()
    }

    /// Concatenated supporting-evidence content, in citation order.
    pub fn evidence_text(&self) -> String {
        self.supporting_evidence()
            .map(|item| item.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Why a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Answer passed both the grounding and adequacy grades
    Useful,
    /// Step ceiling reached after at least one generation; the returned
    /// answer is best-effort and ungraded
    CeilingTruncated,
    /// Step ceiling reached before any answer could be generated
    ProviderExhausted,
}

impl TerminalReason {
    /// Stable string form used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Useful => "useful",
            Self::CeilingTruncated => "ceiling_truncated",
            Self::ProviderExhausted => "provider_exhausted",
        }
    }
}

/// Terminal result of a run: answer (if any), evidence trail, and reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Final answer; `None` when no generation ever succeeded
    pub answer: Option<String>,

    /// Full evidence trail in citation order, diagnostics included
    pub evidence: Vec<EvidenceItem>,

    /// Why the run ended
    pub terminal_reason: TerminalReason,

    /// Query rewrites performed
    pub iterations: u32,

    /// Node executions performed
    pub steps: u32,
}
