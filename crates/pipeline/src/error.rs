//! Node-failure taxonomy for the pipeline.
//!
//! These errors never escape the orchestrator: node-local failures are
//! converted into run-state flags or error-tagged evidence and drive the
//! routing decisions instead.

use thiserror::Error;

/// An external call failed: network, auth, quota, or deadline expiry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("provider call failed: {0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    /// Create a provider error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The structured store accepted the call but rejected the query, or
/// returned a database-level error while executing it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("query execution failed: {0}")]
pub struct ExecutionError(pub String);

impl ExecutionError {
    /// Create an execution error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Binary grader verdict.
///
/// Graders are instructed to answer "yes" or "no"; anything else is
/// `Ambiguous` and treated as negative (fail-closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Yes,
    No,
    Ambiguous,
}

impl Verdict {
    /// Parse a raw grader response.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw
            .trim()
            .trim_matches(|c: char| c.is_ascii_punctuation() || c == '"' || c == '\'')
            .to_lowercase();

        match normalized.as_str() {
            "yes" => Verdict::Yes,
            "no" => Verdict::No,
            _ => Verdict::Ambiguous,
        }
    }

    /// Whether this verdict counts as a positive grade.
    ///
    /// Ambiguous verdicts are negative.
    pub fn is_positive(&self) -> bool {
        matches!(self, Verdict::Yes)
    }
}
