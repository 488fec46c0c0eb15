//! The orchestration state machine.
//!
//! Nodes are sequenced by an explicit dispatch loop rather than a
//! generic graph interpreter: the node set is fixed and the transitions
//! are pure functions of the run state. One node executes at a time;
//! each collaborator call is a single suspension point bounded by a
//! per-node deadline. Node-local failures never abort a run; they are
//! folded into the state and drive routing instead. The only way a run
//! ends without a verified answer is the step ceiling.

use crate::error::ProviderError;
use crate::routing::{decide_route, Route};
use crate::state::{EvidenceItem, Provenance, RunOutcome, RunState, TerminalReason};
use crate::traits::{Generator, Grader, QueryRewriter, Retriever, StructuredStore, WebSearcher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ceiling on total node executions per run
    pub max_steps: u32,

    /// Passages requested per similarity lookup
    pub top_k: usize,

    /// Deadline for each collaborator call; expiry takes the node's
    /// failure path instead of blocking the run
    pub node_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            top_k: 4,
            node_timeout: Duration::from_secs(30),
        }
    }
}

/// Pipeline nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    StructuredQuery,
    Retrieve,
    GradeEvidence,
    WebSearch,
    Generate,
    TransformQuery,
}

impl Node {
    /// Stable node name used in logs and progress events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StructuredQuery => "structured_query",
            Self::Retrieve => "retrieve",
            Self::GradeEvidence => "grade_evidence",
            Self::WebSearch => "web_search",
            Self::Generate => "generate",
            Self::TransformQuery => "transform_query",
        }
    }
}

/// Per-node progress notification for UI observers.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Node about to execute
    pub node: &'static str,

    /// Evidence items held so far
    pub evidence_count: usize,
}

/// Outcome of the self-reflection gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reflection {
    /// Grounded and adequate
    Useful,
    /// Not grounded in the evidence
    NotSupported,
    /// Grounded but does not address the question
    NotUseful,
}

/// The question-answering orchestrator.
///
/// Holds one shared handle per collaborator; every handle must be safe
/// for concurrent use, since independent runs may share them.
pub struct Orchestrator {
    structured: Arc<dyn StructuredStore>,
    retriever: Arc<dyn Retriever>,
    web: Arc<dyn WebSearcher>,
    grader: Arc<dyn Grader>,
    generator: Arc<dyn Generator>,
    rewriter: Arc<dyn QueryRewriter>,
    config: PipelineConfig,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Orchestrator {
    /// Construct an orchestrator from its collaborators.
    pub fn new(
        structured: Arc<dyn StructuredStore>,
        retriever: Arc<dyn Retriever>,
        web: Arc<dyn WebSearcher>,
        grader: Arc<dyn Grader>,
        generator: Arc<dyn Generator>,
        rewriter: Arc<dyn QueryRewriter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            structured,
            retriever,
            web,
            grader,
            generator,
            rewriter,
            config,
            progress: None,
        }
    }

    /// Subscribe an observer to per-node progress events.
    ///
    /// Optional side channel; correctness does not depend on it.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Answer one question.
    ///
    /// Runs the state machine to a terminal state and returns the answer
    /// (if any), the full evidence trail, and the terminal reason. Never
    /// fails: every node-local error is absorbed into the run state.
    pub async fn run(&self, question: &str, structured_source_available: bool) -> RunOutcome {
        let mut state = RunState::new(question, structured_source_available);
        let mut node = Node::StructuredQuery;

        tracing::info!(question, "Starting run");

        loop {
            if state.steps >= self.config.max_steps {
                tracing::warn!(
                    steps = state.steps,
                    ceiling = self.config.max_steps,
                    "Step ceiling reached, terminating run"
                );
                return self.finish_truncated(state);
            }

            state.steps += 1;
            self.emit_progress(node, &state);
            tracing::info!(node = node.name(), step = state.steps, "Executing node");

            node = match node {
                Node::StructuredQuery => {
                    self.run_structured(&mut state).await;
                    if state.is_structured_hit && state.has_structured_evidence() {
                        // Deterministic rows answer the question directly;
                        // skip similarity retrieval entirely.
                        Node::Generate
                    } else {
                        Node::Retrieve
                    }
                }

                Node::Retrieve => {
                    self.run_retrieve(&mut state).await;
                    Node::GradeEvidence
                }

                Node::GradeEvidence => {
                    self.run_grade(&mut state).await;
                    match decide_route(&state) {
                        Route::Generate => Node::Generate,
                        Route::WebSearch => Node::WebSearch,
                        Route::TransformQuery => match self.gate_transform(&state) {
                            Some(next) => next,
                            None => return self.finish_truncated(state),
                        },
                    }
                }

                Node::WebSearch => {
                    self.run_web_search(&mut state).await;
                    // Fallback results were explicitly requested; accepted
                    // without a further grading pass.
                    Node::Generate
                }

                Node::Generate => {
                    let generated = self.run_generate(&mut state).await;
                    let reflection = if generated {
                        self.reflect(&state).await
                    } else {
                        // Generation failed outright; retry via rewrite.
                        Reflection::NotSupported
                    };

                    match reflection {
                        Reflection::Useful => {
                            tracing::info!(steps = state.steps, "Answer accepted");
                            return RunOutcome {
                                answer: state.answer.clone(),
                                evidence: state.evidence,
                                terminal_reason: TerminalReason::Useful,
                                iterations: state.iteration_count,
                                steps: state.steps,
                            };
                        }
                        Reflection::NotSupported | Reflection::NotUseful => {
                            match self.gate_transform(&state) {
                                Some(next) => next,
                                None => return self.finish_truncated(state),
                            }
                        }
                    }
                }

                Node::TransformQuery => {
                    self.run_transform(&mut state).await;
                    Node::Retrieve
                }
            };
        }
    }

    /// Structured query node.
    ///
    /// Short-circuits when the store is marked unavailable. Execution
    /// errors (including deadline expiry) mark the store down for the
    /// rest of the run; classification and query-generation failures do
    /// not, since the store itself was never reached.
    async fn run_structured(&self, state: &mut RunState) {
        state.is_structured_hit = false;

        if !state.structured_source_available {
            tracing::debug!("Structured store unavailable, skipping");
            return;
        }

        let answerable = match self
            .with_deadline(self.structured.classify_question(&state.question), "structured classification")
            .await
        {
            Ok(answerable) => answerable,
            Err(e) => {
                tracing::warn!("Structured classification failed: {}", e);
                return;
            }
        };

        if !answerable {
            tracing::debug!("Question is not answerable against the structured store");
            return;
        }

        let query = match self
            .with_deadline(self.structured.generate_query(&state.question), "structured query generation")
            .await
        {
            Ok(Some(query)) => query,
            Ok(None) => {
                tracing::debug!("No structured query generated");
                return;
            }
            Err(e) => {
                tracing::warn!("Structured query generation failed: {}", e);
                return;
            }
        };

        tracing::info!(query = %query, "Executing structured query");

        let execution = tokio::time::timeout(
            self.config.node_timeout,
            self.structured.execute_query(&query),
        )
        .await
        .unwrap_or_else(|_| {
            Err(crate::error::ExecutionError::new(format!(
                "structured query timed out after {:?}",
                self.config.node_timeout
            )))
        });

        match execution {
            Ok(rows) => {
                let row_count = rows.row_count();
                state.push_evidence(
                    EvidenceItem::new(Provenance::StructuredStore, rows.render())
                        .with_attribute("query", &query)
                        .with_attribute("row_count", row_count.to_string()),
                );
                state.is_structured_hit = true;
                tracing::info!(row_count, "Structured query returned rows");
            }
            Err(e) => {
                // Treat the store as down to avoid repeated failing calls.
                tracing::warn!("Structured query execution failed: {}", e);
                state.mark_structured_unavailable();
            }
        }
    }

    /// Similarity retrieval node. Never errors the run; an empty result
    /// drives the no-evidence branch downstream.
    async fn run_retrieve(&self, state: &mut RunState) {
        let passages = match self
            .with_deadline(
                self.retriever.retrieve(&state.question, self.config.top_k),
                "similarity retrieval",
            )
            .await
        {
            Ok(passages) => passages,
            Err(e) => {
                tracing::warn!("Similarity retrieval failed, continuing without passages: {}", e);
                Vec::new()
            }
        };

        tracing::info!(count = passages.len(), "Retrieved passages");

        for passage in passages {
            state.push_evidence(
                EvidenceItem::new(Provenance::SimilarityIndex, passage.content)
                    .with_attributes(passage.attributes),
            );
        }
    }

    /// Relevance grading node.
    ///
    /// Grades every held item except structured-store rows (trusted
    /// unconditionally as deterministic query results) and error-tagged
    /// diagnostics (retained but never graded). Grader failures and
    /// ambiguous verdicts drop the item (fail-closed). Order is
    /// preserved.
    async fn run_grade(&self, state: &mut RunState) {
        let items = std::mem::take(&mut state.evidence);
        let mut kept = Vec::with_capacity(items.len());

        for item in items {
            if item.provenance == Provenance::StructuredStore || item.provenance.is_error() {
                kept.push(item);
                continue;
            }

            let relevant = match self
                .with_deadline(
                    self.grader.grade_relevance(&state.question, &item.content),
                    "relevance grading",
                )
                .await
            {
                Ok(verdict) => verdict.is_positive(),
                Err(e) => {
                    tracing::warn!("Relevance grading failed, dropping item: {}", e);
                    false
                }
            };

            if relevant {
                kept.push(item);
            } else {
                tracing::debug!(provenance = item.provenance.as_str(), "Dropped irrelevant item");
            }
        }

        tracing::info!(kept = kept.len(), "Relevance grading complete");
        state.evidence = kept;
    }

    /// Web-search fallback node. The attempt flag is set regardless of
    /// the result, so a broken provider is never retried within a run.
    async fn run_web_search(&self, state: &mut RunState) {
        state.attempted_web_search = true;

        match self
            .with_deadline(self.web.search(&state.question), "web search")
            .await
        {
            Ok(passage) => {
                tracing::info!("Web search returned a result");
                state.push_evidence(
                    EvidenceItem::new(Provenance::WebSearch, passage.content)
                        .with_attributes(passage.attributes)
                        .with_attribute("query", &state.question),
                );
            }
            Err(e) => {
                tracing::warn!("Web search failed: {}", e);
                state.push_evidence(
                    EvidenceItem::new(
                        Provenance::WebSearchError,
                        format!("Web search attempted but failed: {}", e),
                    )
                    .with_attribute("query", &state.question),
                );
            }
        }
    }

    /// Generation node. Returns whether a fresh answer was produced.
    async fn run_generate(&self, state: &mut RunState) -> bool {
        let context = state.evidence_text();

        if context.is_empty() {
            // The generator contract covers this: it must answer with a
            // clear cannot-answer response rather than hallucinate.
            tracing::warn!("Generating with empty context");
        }

        match self
            .with_deadline(self.generator.generate(&state.question, &context), "generation")
            .await
        {
            Ok(answer) => {
                tracing::info!(length = answer.len(), "Generated answer");
                state.answer = Some(answer);
                true
            }
            Err(e) => {
                tracing::warn!("Generation failed: {}", e);
                false
            }
        }
    }

    /// Self-reflection gate: grounding first, then adequacy against the
    /// original question. Grader failures count as negative.
    async fn reflect(&self, state: &RunState) -> Reflection {
        let answer = match state.answer.as_deref() {
            Some(answer) => answer,
            None => return Reflection::NotSupported,
        };

        let facts = state.evidence_text();

        let grounded = match self
            .with_deadline(self.grader.grade_grounding(&facts, answer), "grounding grading")
            .await
        {
            Ok(verdict) => verdict.is_positive(),
            Err(e) => {
                tracing::warn!("Grounding grading failed: {}", e);
                false
            }
        };

        if !grounded {
            tracing::info!("Answer is not grounded in the evidence");
            return Reflection::NotSupported;
        }

        let adequate = match self
            .with_deadline(
                self.grader.grade_adequacy(&state.original_question, answer),
                "adequacy grading",
            )
            .await
        {
            Ok(verdict) => verdict.is_positive(),
            Err(e) => {
                tracing::warn!("Adequacy grading failed: {}", e);
                false
            }
        };

        if adequate {
            Reflection::Useful
        } else {
            tracing::info!("Answer does not address the question");
            Reflection::NotUseful
        }
    }

    /// Query rewrite node. A failed rewrite keeps the question unchanged;
    /// the iteration still counts so the loop stays bounded. The web and
    /// structured attempt flags are deliberately not reset.
    async fn run_transform(&self, state: &mut RunState) {
        match self
            .with_deadline(self.rewriter.rewrite(&state.question), "query rewrite")
            .await
        {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                tracing::info!(from = %state.question, to = %rewritten, "Rewrote question");
                state.question = rewritten;
            }
            Ok(_) => {
                tracing::warn!("Query rewriter returned an empty question, keeping current");
            }
            Err(e) => {
                tracing::warn!("Query rewrite failed, keeping current question: {}", e);
            }
        }

        state.iteration_count += 1;
    }

    /// Ceiling check before any transition into the rewrite loop.
    fn gate_transform(&self, state: &RunState) -> Option<Node> {
        if state.steps >= self.config.max_steps {
            None
        } else {
            Some(Node::TransformQuery)
        }
    }

    /// Terminal outcome when the ceiling cut the run short.
    fn finish_truncated(&self, state: RunState) -> RunOutcome {
        let terminal_reason = if state.answer.is_some() {
            TerminalReason::CeilingTruncated
        } else {
            TerminalReason::ProviderExhausted
        };

        RunOutcome {
            answer: state.answer,
            evidence: state.evidence,
            terminal_reason,
            iterations: state.iteration_count,
            steps: state.steps,
        }
    }

    /// Bound a collaborator call by the per-node deadline.
    async fn with_deadline<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
        what: &str,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.config.node_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::new(format!(
                "{} timed out after {:?}",
                what, self.config.node_timeout
            ))),
        }
    }

    /// Emit a progress event if an observer is subscribed.
    fn emit_progress(&self, node: Node, state: &RunState) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(ProgressEvent {
                node: node.name(),
                evidence_count: state.evidence.len(),
            });
        }
    }
}
