//! SQLite structured store with LLM query synthesis.
//!
//! The store answers questions in three phases, mirroring the pipeline's
//! structured-query node: classify whether the question maps onto the
//! schema, generate a SELECT for it, then execute the SELECT.

use async_trait::async_trait;
use rusqlite::Connection;
use selfrag_core::{AppError, AppResult};
use selfrag_llm::{LlmClient, LlmRequest};
use selfrag_pipeline::{
    ExecutionError, ProviderError, StructuredRows, StructuredStore, Verdict,
};
use selfrag_prompt::registry::{STRUCTURED_CLASSIFY, STRUCTURED_QUERY};
use selfrag_prompt::{load_prompt, render_prompt, PromptDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Structured fact source backed by a SQLite database.
pub struct SqliteStructuredStore {
    conn: Mutex<Connection>,
    llm: Arc<dyn LlmClient>,
    model: String,
    schema: String,
    classify_prompt: PromptDefinition,
    query_prompt: PromptDefinition,
}

impl SqliteStructuredStore {
    /// Open an existing database.
    ///
    /// Fails when the file does not exist; availability is decided by
    /// the caller before the pipeline starts.
    pub fn open(
        db_path: &Path,
        workspace: &Path,
        llm: Arc<dyn LlmClient>,
        model: &str,
        schema_description: &str,
    ) -> AppResult<Self> {
        if !db_path.exists() {
            return Err(AppError::Structured(format!(
                "Structured store not found at {:?}. Run 'selfrag db init' first.",
                db_path
            )));
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Structured(format!("Failed to open store: {}", e)))?;

        Self::from_connection(conn, workspace, llm, model, schema_description)
    }

    /// Build a store from an existing connection (used by tests).
    pub fn from_connection(
        conn: Connection,
        workspace: &Path,
        llm: Arc<dyn LlmClient>,
        model: &str,
        schema_description: &str,
    ) -> AppResult<Self> {
        let classify_prompt = load_prompt(workspace, STRUCTURED_CLASSIFY)?;
        let query_prompt = load_prompt(workspace, STRUCTURED_QUERY)?;

        Ok(Self {
            conn: Mutex::new(conn),
            llm,
            model: model.to_string(),
            schema: schema_description.to_string(),
            classify_prompt,
            query_prompt,
        })
    }

    /// Render a prompt and run it through the LLM at temperature 0.
    async fn complete(
        &self,
        definition: &PromptDefinition,
        question: &str,
    ) -> Result<String, ProviderError> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("schema".to_string(), self.schema.clone());

        let built = render_prompt(definition, variables)
            .map_err(|e| ProviderError::new(e.to_string()))?;

        let mut request = LlmRequest::new(built.user, &self.model).with_temperature(0.0);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| ProviderError::new(e.to_string()))?;

        Ok(response.content)
    }
}

#[async_trait]
impl StructuredStore for SqliteStructuredStore {
    async fn classify_question(&self, question: &str) -> Result<bool, ProviderError> {
        let response = self.complete(&self.classify_prompt, question).await?;
        let answerable = Verdict::parse(&response).is_positive();

        tracing::debug!(answerable, "Structured answerability classified");
        Ok(answerable)
    }

    async fn generate_query(&self, question: &str) -> Result<Option<String>, ProviderError> {
        let response = self.complete(&self.query_prompt, question).await?;
        let query = sanitize_query(&response);

        match &query {
            Some(query) => tracing::debug!(query = %query, "Generated structured query"),
            None => tracing::debug!("Model declined to generate a structured query"),
        }

        Ok(query)
    }

    async fn execute_query(&self, query: &str) -> Result<StructuredRows, ExecutionError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ExecutionError::new("structured store lock poisoned"))?;

        let mut stmt = conn
            .prepare(query)
            .map_err(|e| ExecutionError::new(e.to_string()))?;

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let column_count = columns.len();

        let mut rows = stmt
            .query([])
            .map_err(|e| ExecutionError::new(e.to_string()))?;

        let mut rendered_rows = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(ExecutionError::new(e.to_string())),
            };

            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row
                    .get_ref(i)
                    .map_err(|e| ExecutionError::new(e.to_string()))?;
                values.push(render_value(value));
            }
            rendered_rows.push(values);
        }

        Ok(StructuredRows {
            columns,
            rows: rendered_rows,
        })
    }
}

/// Render a SQLite value as display text.
fn render_value(value: rusqlite::types::ValueRef<'_>) -> String {
    use rusqlite::types::ValueRef;

    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Validate and normalize a generated query.
///
/// Only a single SELECT is accepted; anything else (including the
/// model's literal "None" refusal) yields no query.
fn sanitize_query(raw: &str) -> Option<String> {
    let query = raw
        .trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if query.eq_ignore_ascii_case("none") || query.is_empty() {
        return None;
    }

    if !query.to_lowercase().starts_with("select") {
        return None;
    }

    Some(query.trim_end_matches(';').trim().to_string())
}

/// Null store used when the structured source is disabled or absent.
///
/// The availability flag passed into the pipeline prevents it from ever
/// being consulted; these implementations exist to satisfy the wiring.
pub struct OfflineStructuredStore;

#[async_trait]
impl StructuredStore for OfflineStructuredStore {
    async fn classify_question(&self, _question: &str) -> Result<bool, ProviderError> {
        Err(ProviderError::new("structured store is offline"))
    }

    async fn generate_query(&self, _question: &str) -> Result<Option<String>, ProviderError> {
        Err(ProviderError::new("structured store is offline"))
    }

    async fn execute_query(&self, _query: &str) -> Result<StructuredRows, ExecutionError> {
        Err(ExecutionError::new("structured store is offline"))
    }
}
