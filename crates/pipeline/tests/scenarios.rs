//! End-to-end runs of the orchestrator against stub collaborators.

use async_trait::async_trait;
use selfrag_pipeline::{
    ExecutionError, Generator, Grader, Orchestrator, Passage, PipelineConfig, Provenance,
    ProviderError, QueryRewriter, Retriever, RunOutcome, StructuredRows, StructuredStore,
    TerminalReason, Verdict, WebSearcher,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted verdict sequence: pops from the front, falls back to a default.
struct Script {
    queue: Mutex<VecDeque<Verdict>>,
    default: Verdict,
}

impl Script {
    fn always(default: Verdict) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default,
        }
    }

    fn sequence(verdicts: Vec<Verdict>, default: Verdict) -> Self {
        Self {
            queue: Mutex::new(verdicts.into()),
            default,
        }
    }

    fn next(&self) -> Verdict {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default)
    }
}

struct StubStructured {
    answerable: bool,
    query: Option<String>,
    execution: Result<StructuredRows, ExecutionError>,
    classify_calls: AtomicUsize,
    execute_calls: AtomicUsize,
}

impl StubStructured {
    fn unanswerable() -> Self {
        Self {
            answerable: false,
            query: None,
            execution: Ok(StructuredRows::default()),
            classify_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
        }
    }

    fn with_rows(query: &str, rows: StructuredRows) -> Self {
        Self {
            answerable: true,
            query: Some(query.to_string()),
            execution: Ok(rows),
            classify_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
        }
    }

    fn failing(query: &str, message: &str) -> Self {
        Self {
            answerable: true,
            query: Some(query.to_string()),
            execution: Err(ExecutionError::new(message)),
            classify_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StructuredStore for StubStructured {
    async fn classify_question(&self, _question: &str) -> Result<bool, ProviderError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answerable)
    }

    async fn generate_query(&self, _question: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.query.clone())
    }

    async fn execute_query(&self, _query: &str) -> Result<StructuredRows, ExecutionError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.execution.clone()
    }
}

struct StubRetriever {
    batches: Mutex<VecDeque<Vec<Passage>>>,
    questions: Mutex<Vec<String>>,
}

impl StubRetriever {
    fn with_batches(batches: Vec<Vec<Passage>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            questions: Mutex::new(Vec::new()),
        }
    }

    fn empty() -> Self {
        Self::with_batches(Vec::new())
    }

    fn calls(&self) -> usize {
        self.questions.lock().unwrap().len()
    }

    fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(&self, question: &str, _k: usize) -> Result<Vec<Passage>, ProviderError> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self
            .batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

struct StubWeb {
    result: Result<Passage, ProviderError>,
    calls: AtomicUsize,
}

impl StubWeb {
    fn with_result(content: &str) -> Self {
        Self {
            result: Ok(Passage::new(content)),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            result: Err(ProviderError::new(message)),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WebSearcher for StubWeb {
    async fn search(&self, _question: &str) -> Result<Passage, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Web searcher that never responds within any reasonable deadline.
struct HangingWeb;

#[async_trait]
impl WebSearcher for HangingWeb {
    async fn search(&self, _question: &str) -> Result<Passage, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Passage::new("too late"))
    }
}

struct StubGrader {
    relevance: Script,
    grounding: Script,
    adequacy: Script,
}

impl StubGrader {
    fn approving() -> Self {
        Self {
            relevance: Script::always(Verdict::Yes),
            grounding: Script::always(Verdict::Yes),
            adequacy: Script::always(Verdict::Yes),
        }
    }
}

#[async_trait]
impl Grader for StubGrader {
    async fn grade_relevance(
        &self,
        _question: &str,
        _content: &str,
    ) -> Result<Verdict, ProviderError> {
        Ok(self.relevance.next())
    }

    async fn grade_grounding(
        &self,
        _evidence: &str,
        _answer: &str,
    ) -> Result<Verdict, ProviderError> {
        Ok(self.grounding.next())
    }

    async fn grade_adequacy(
        &self,
        _question: &str,
        _answer: &str,
    ) -> Result<Verdict, ProviderError> {
        Ok(self.adequacy.next())
    }
}

struct StubGenerator {
    answer: String,
    contexts: Mutex<Vec<String>>,
}

impl StubGenerator {
    fn with_answer(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            contexts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, _question: &str, context: &str) -> Result<String, ProviderError> {
        self.contexts.lock().unwrap().push(context.to_string());
        Ok(self.answer.clone())
    }
}

struct StubRewriter {
    calls: AtomicUsize,
}

impl StubRewriter {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryRewriter for StubRewriter {
    async fn rewrite(&self, question: &str) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{} (rewrite {})", question, n))
    }
}

struct Fixture {
    structured: Arc<StubStructured>,
    retriever: Arc<StubRetriever>,
    web: Arc<StubWeb>,
    grader: Arc<StubGrader>,
    generator: Arc<StubGenerator>,
    rewriter: Arc<StubRewriter>,
    config: PipelineConfig,
}

impl Fixture {
    fn new() -> Self {
        Self {
            structured: Arc::new(StubStructured::unanswerable()),
            retriever: Arc::new(StubRetriever::empty()),
            web: Arc::new(StubWeb::with_result("web summary")),
            grader: Arc::new(StubGrader::approving()),
            generator: Arc::new(StubGenerator::with_answer("the answer")),
            rewriter: Arc::new(StubRewriter::new()),
            config: PipelineConfig::default(),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.structured.clone(),
            self.retriever.clone(),
            self.web.clone(),
            self.grader.clone(),
            self.generator.clone(),
            self.rewriter.clone(),
            self.config.clone(),
        )
    }

    async fn run(&self, question: &str, structured_available: bool) -> RunOutcome {
        self.orchestrator().run(question, structured_available).await
    }
}

fn sample_rows() -> StructuredRows {
    StructuredRows {
        columns: vec!["player".to_string(), "runs".to_string()],
        rows: vec![
            vec!["V Kohli".to_string(), "6283".to_string()],
            vec!["R Sharma".to_string(), "5879".to_string()],
            vec!["S Dhawan".to_string(), "5784".to_string()],
        ],
    }
}

// Scenario A: a structured hit generates directly; no similarity retrieval.
#[tokio::test]
async fn structured_hit_skips_retrieval() {
    let mut fixture = Fixture::new();
    fixture.structured = Arc::new(StubStructured::with_rows(
        "SELECT player, runs FROM stats",
        sample_rows(),
    ));

    let outcome = fixture.run("who scored the most runs?", true).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::Useful);
    assert!(outcome.answer.is_some());
    assert_eq!(outcome.evidence.len(), 1);
    assert_eq!(outcome.evidence[0].provenance, Provenance::StructuredStore);
    assert_eq!(outcome.evidence[0].attributes.get("row_count").unwrap(), "3");
    assert_eq!(
        outcome.evidence[0].attributes.get("query").unwrap(),
        "SELECT player, runs FROM stats"
    );
    assert_eq!(fixture.retriever.calls(), 0);
    assert_eq!(fixture.web.calls.load(Ordering::SeqCst), 0);
}

// Scenario B: two relevant passages generate without any fallback.
#[tokio::test]
async fn relevant_passages_generate() {
    let mut fixture = Fixture::new();
    fixture.retriever = Arc::new(StubRetriever::with_batches(vec![vec![
        Passage::new("rust is a systems language"),
        Passage::new("rust has no garbage collector"),
    ]]));

    let outcome = fixture.run("what is rust?", false).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::Useful);
    assert_eq!(outcome.evidence.len(), 2);
    assert!(outcome
        .evidence
        .iter()
        .all(|item| item.provenance == Provenance::SimilarityIndex));
    assert_eq!(fixture.web.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.rewriter.calls(), 0);
}

// Scenario C: an irrelevant passage falls back to web search, which feeds
// generation directly.
#[tokio::test]
async fn irrelevant_passage_falls_back_to_web() {
    let mut fixture = Fixture::new();
    fixture.retriever = Arc::new(StubRetriever::with_batches(vec![vec![Passage::new(
        "cooking with cast iron",
    )]]));
    fixture.grader = Arc::new(StubGrader {
        relevance: Script::always(Verdict::No),
        grounding: Script::always(Verdict::Yes),
        adequacy: Script::always(Verdict::Yes),
    });

    let outcome = fixture.run("what is rust?", false).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::Useful);
    assert_eq!(fixture.web.calls.load(Ordering::SeqCst), 1);

    let web_items: Vec<_> = outcome
        .evidence
        .iter()
        .filter(|item| item.provenance == Provenance::WebSearch)
        .collect();
    assert_eq!(web_items.len(), 1);
    assert_eq!(web_items[0].attributes.get("query").unwrap(), "what is rust?");

    // The dropped passage must not reach the generator.
    let contexts = fixture.generator.contexts();
    assert_eq!(contexts.len(), 1);
    assert!(contexts[0].contains("web summary"));
    assert!(!contexts[0].contains("cast iron"));
}

// Scenario D: an ungrounded generation triggers exactly one rewrite, and
// the next retrieval uses the rewritten question.
#[tokio::test]
async fn ungrounded_answer_rewrites_and_retries() {
    let mut fixture = Fixture::new();
    fixture.retriever = Arc::new(StubRetriever::with_batches(vec![
        vec![Passage::new("first attempt passage")],
        vec![Passage::new("second attempt passage")],
    ]));
    fixture.grader = Arc::new(StubGrader {
        relevance: Script::always(Verdict::Yes),
        grounding: Script::sequence(vec![Verdict::No], Verdict::Yes),
        adequacy: Script::always(Verdict::Yes),
    });

    let outcome = fixture.run("what is rust?", false).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::Useful);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(fixture.rewriter.calls(), 1);

    let questions = fixture.retriever.questions();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0], "what is rust?");
    assert_eq!(questions[1], "what is rust? (rewrite 1)");
}

// Scenario E: persistently ungrounded generations hit the ceiling and
// return the last unverified answer rather than failing.
#[tokio::test]
async fn persistent_hallucination_hits_ceiling() {
    let mut fixture = Fixture::new();
    fixture.retriever = Arc::new(StubRetriever::with_batches(
        (0..10)
            .map(|i| vec![Passage::new(format!("passage {}", i))])
            .collect(),
    ));
    fixture.grader = Arc::new(StubGrader {
        relevance: Script::always(Verdict::Yes),
        grounding: Script::always(Verdict::No),
        adequacy: Script::always(Verdict::Yes),
    });

    let outcome = fixture.run("what is rust?", false).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::CeilingTruncated);
    assert_eq!(outcome.answer.as_deref(), Some("the answer"));
    assert_eq!(outcome.steps, fixture.config.max_steps);
    assert!(outcome.iterations >= 1);
}

// The step ceiling holds for any configured value.
#[tokio::test]
async fn ceiling_is_never_exceeded() {
    for max_steps in [1, 2, 5, 8, 13] {
        let mut fixture = Fixture::new();
        fixture.config.max_steps = max_steps;
        fixture.retriever = Arc::new(StubRetriever::with_batches(
            (0..20)
                .map(|i| vec![Passage::new(format!("passage {}", i))])
                .collect(),
        ));
        fixture.grader = Arc::new(StubGrader {
            relevance: Script::always(Verdict::Yes),
            grounding: Script::always(Verdict::No),
            adequacy: Script::always(Verdict::Yes),
        });

        let outcome = fixture.run("q", false).await;
        assert!(outcome.steps <= max_steps);
        assert!(outcome.iterations <= outcome.steps);
    }
}

// A ceiling hit before any generation reports provider exhaustion, the
// explicit could-not-answer outcome.
#[tokio::test]
async fn ceiling_before_generation_is_provider_exhausted() {
    let mut fixture = Fixture::new();
    fixture.config.max_steps = 1;

    let outcome = fixture.run("q", false).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::ProviderExhausted);
    assert!(outcome.answer.is_none());
    assert_eq!(fixture.generator.calls(), 0);
}

// A store marked unavailable at entry is never touched.
#[tokio::test]
async fn unavailable_store_is_never_queried() {
    let mut fixture = Fixture::new();
    fixture.structured = Arc::new(StubStructured::with_rows("SELECT 1", sample_rows()));
    fixture.retriever = Arc::new(StubRetriever::with_batches(vec![vec![Passage::new(
        "a passage",
    )]]));

    let outcome = fixture.run("q", false).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::Useful);
    assert_eq!(fixture.structured.classify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.structured.execute_calls.load(Ordering::SeqCst), 0);
    assert!(!outcome
        .evidence
        .iter()
        .any(|item| item.provenance == Provenance::StructuredStore));
}

// A failed execution degrades to similarity retrieval instead of aborting.
#[tokio::test]
async fn execution_error_degrades_to_retrieval() {
    let mut fixture = Fixture::new();
    fixture.structured = Arc::new(StubStructured::failing(
        "SELECT nope FROM nowhere",
        "no such table: nowhere",
    ));
    fixture.retriever = Arc::new(StubRetriever::with_batches(vec![vec![Passage::new(
        "a passage",
    )]]));

    let outcome = fixture.run("q", true).await;

    assert_eq!(outcome.terminal_reason, TerminalReason::Useful);
    assert_eq!(fixture.structured.execute_calls.load(Ordering::SeqCst), 1);
    assert!(!outcome
        .evidence
        .iter()
        .any(|item| item.provenance == Provenance::StructuredStore));
    assert_eq!(fixture.retriever.calls(), 1);
}

// A failed web search leaves a diagnostic item, still counts as attempted,
// and is not retried on later loop entries.
#[tokio::test]
async fn failed_web_search_is_not_retried() {
    let mut fixture = Fixture::new();
    fixture.web = Arc::new(StubWeb::failing("quota exceeded"));
    fixture.grader = Arc::new(StubGrader {
        relevance: Script::always(Verdict::No),
        grounding: Script::always(Verdict::No),
        adequacy: Script::always(Verdict::Yes),
    });
    fixture.retriever = Arc::new(StubRetriever::with_batches(
        (0..10)
            .map(|i| vec![Passage::new(format!("passage {}", i))])
            .collect(),
    ));

    let outcome = fixture.run("q", false).await;

    assert_eq!(fixture.web.calls.load(Ordering::SeqCst), 1);
    assert!(outcome
        .evidence
        .iter()
        .any(|item| item.provenance == Provenance::WebSearchError));
    // Diagnostics never become generation context.
    for context in fixture.generator.contexts() {
        assert!(!context.contains("quota exceeded"));
    }
}

// An expired web-search deadline takes the failure path instead of
// blocking the run.
#[tokio::test(start_paused = true)]
async fn web_search_timeout_takes_failure_path() {
    let mut fixture = Fixture::new();
    fixture.config.node_timeout = Duration::from_millis(50);
    fixture.config.max_steps = 5;

    let orchestrator = Orchestrator::new(
        fixture.structured.clone(),
        fixture.retriever.clone(),
        Arc::new(HangingWeb),
        fixture.grader.clone(),
        fixture.generator.clone(),
        fixture.rewriter.clone(),
        fixture.config.clone(),
    );

    let outcome = orchestrator.run("q", false).await;

    let errors: Vec<_> = outcome
        .evidence
        .iter()
        .filter(|item| item.provenance == Provenance::WebSearchError)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].content.contains("timed out"));
}

// Stub graders are deterministic: grading the same content twice yields
// the same verdict.
#[tokio::test]
async fn relevance_grading_is_idempotent() {
    let grader = StubGrader::approving();

    let first = grader.grade_relevance("q", "content").await.unwrap();
    let second = grader.grade_relevance("q", "content").await.unwrap();
    assert_eq!(first, second);
}

// Progress events fire per node, starting at the entry node.
#[tokio::test]
async fn progress_events_are_emitted() {
    let fixture = Fixture::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let orchestrator = fixture.orchestrator().with_progress(tx);
    let outcome = orchestrator.run("q", false).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events.len() as u32, outcome.steps);
    assert_eq!(events[0].node, "structured_query");
}
