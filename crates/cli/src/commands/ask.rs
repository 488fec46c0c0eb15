//! Ask command handler.
//!
//! Wires the concrete providers into the orchestrator, runs one
//! question, and prints the answer with its evidence trail.

use clap::Args;
use selfrag_core::{config::AppConfig, AppError, AppResult};
use selfrag_llm::create_client;
use selfrag_pipeline::{
    Orchestrator, PipelineConfig, Provenance, RunOutcome, StructuredStore, TerminalReason,
    WebSearcher,
};
use selfrag_providers::{
    LlmGenerator, LlmGrader, LlmRewriter, OfflineStructuredStore, OfflineWebSearcher,
    SqliteStructuredStore, TavilySearcher, TrigramEmbedder, VectorRetriever,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Ask a question through the pipeline
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Cap on node executions for this run
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Passages per similarity lookup
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Skip the structured store for this run
    #[arg(long)]
    pub no_db: bool,

    /// Disable the web-search fallback for this run
    #[arg(long)]
    pub no_web: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        // LLM client shared by every LLM-backed role
        let llm = create_client(
            &config.provider,
            config.endpoint.as_deref(),
            config.api_key.as_deref(),
        )
        .map_err(AppError::Config)?;

        // Similarity retriever over the local index
        let embedder = Arc::new(TrigramEmbedder::default());
        let retriever = Arc::new(VectorRetriever::open(&config.index_path(), embedder)?);

        // Structured store, when present and enabled
        let db_path = config.structured_db_path();
        let structured_available = config.structured.enabled && !self.no_db && db_path.exists();
        let structured: Arc<dyn StructuredStore> = if structured_available {
            Arc::new(SqliteStructuredStore::open(
                &db_path,
                &config.workspace,
                llm.clone(),
                &config.model,
                &config.structured.schema_description,
            )?)
        } else {
            tracing::debug!("Structured store disabled or absent");
            Arc::new(OfflineStructuredStore)
        };

        // Web-search fallback, when configured
        let web: Arc<dyn WebSearcher> = if self.no_web || !config.websearch.enabled {
            Arc::new(OfflineWebSearcher)
        } else {
            match config.resolve_search_api_key() {
                Some(key) => Arc::new(TavilySearcher::new(&config.websearch.endpoint, key)),
                None => {
                    tracing::warn!(
                        "No web-search API key in {}; fallback disabled",
                        config.websearch.api_key_env
                    );
                    Arc::new(OfflineWebSearcher)
                }
            }
        };

        let grader = Arc::new(LlmGrader::new(&config.workspace, llm.clone(), &config.model)?);
        let generator = Arc::new(LlmGenerator::new(
            &config.workspace,
            llm.clone(),
            &config.model,
        )?);
        let rewriter = Arc::new(LlmRewriter::new(&config.workspace, llm, &config.model)?);

        let pipeline_config = PipelineConfig {
            max_steps: self.max_steps.unwrap_or(config.pipeline.max_steps),
            top_k: self.top_k.unwrap_or(config.pipeline.top_k),
            node_timeout: Duration::from_secs(config.pipeline.node_timeout_secs),
        };

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        let orchestrator = Orchestrator::new(
            structured,
            retriever,
            web,
            grader,
            generator,
            rewriter,
            pipeline_config,
        )
        .with_progress(progress_tx);

        // Progress lines go to stderr; stdout is reserved for the answer
        let show_progress = !self.json;
        let progress_task = tokio::spawn(async move {
            let mut iteration = 1u32;
            while let Some(event) = progress_rx.recv().await {
                if event.node == "transform_query" {
                    iteration += 1;
                }
                if show_progress {
                    eprintln!(
                        "[iteration {}] {} ({} evidence items)",
                        iteration, event.node, event.evidence_count
                    );
                }
            }
        });

        let outcome = orchestrator.run(&self.question, structured_available).await;

        // Dropping the orchestrator closes the progress channel
        drop(orchestrator);
        let _ = progress_task.await;

        self.print_outcome(&outcome)
    }

    /// Print the terminal outcome.
    fn print_outcome(&self, outcome: &RunOutcome) -> AppResult<()> {
        if self.json {
            let output = serde_json::json!({
                "answer": outcome.answer,
                "terminalReason": outcome.terminal_reason.as_str(),
                "iterations": outcome.iterations,
                "steps": outcome.steps,
                "evidence": outcome.evidence,
            });

            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        match (&outcome.answer, outcome.terminal_reason) {
            (Some(answer), TerminalReason::Useful) => {
                println!("{}", answer);
            }
            (Some(answer), TerminalReason::CeilingTruncated) => {
                println!("{}", answer);
                eprintln!();
                eprintln!("Note: the step ceiling was reached; this answer was not verified.");
            }
            _ => {
                println!("Could not produce an answer for this question.");
                return Ok(());
            }
        }

        let citable: Vec<_> = outcome
            .evidence
            .iter()
            .filter(|item| !item.provenance.is_error())
            .collect();

        if citable.is_empty() {
            return Ok(());
        }

        println!();
        println!("Sources:");
        for (i, item) in citable.iter().enumerate() {
            match item.provenance {
                Provenance::StructuredStore => {
                    println!(
                        "  {}. structured store ({} rows) -- {}",
                        i + 1,
                        item.attributes.get("row_count").map(String::as_str).unwrap_or("?"),
                        item.attributes.get("query").map(String::as_str).unwrap_or("")
                    );
                }
                Provenance::SimilarityIndex => {
                    println!(
                        "  {}. document: {}",
                        i + 1,
                        item.attributes.get("source").map(String::as_str).unwrap_or("unknown")
                    );
                }
                Provenance::WebSearch => match item.attributes.get("url") {
                    Some(url) => println!("  {}. web search: {}", i + 1, url),
                    None => println!("  {}. web search", i + 1),
                },
                _ => {}
            }
        }

        Ok(())
    }
}
