//! Post-grading routing decision.

use crate::state::RunState;

/// Next step selected after relevance grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Enough evidence is held; generate an answer
    Generate,
    /// No evidence and the web fallback has not been tried yet
    WebSearch,
    /// No evidence and the web fallback is spent; rewrite the question
    TransformQuery,
}

/// Decide where to go after grading. Pure function of the run state.
///
/// Precedence:
/// 1. A structured-store hit always generates.
/// 2. Any surviving (non-error) evidence generates.
/// 3. An untried web fallback is attempted before rewriting.
/// 4. Otherwise the question is rewritten.
pub fn decide_route(state: &RunState) -> Route {
    if state.is_structured_hit && state.has_structured_evidence() {
        tracing::debug!("Routing: structured hit, generate");
        return Route::Generate;
    }

    if state.supporting_evidence_count() > 0 {
        tracing::debug!(
            evidence = state.supporting_evidence_count(),
            "Routing: evidence held, generate"
        );
        return Route::Generate;
    }

    if !state.attempted_web_search {
        tracing::debug!("Routing: no evidence, falling back to web search");
        return Route::WebSearch;
    }

    tracing::debug!("Routing: no evidence and web search spent, transform query");
    Route::TransformQuery
}
