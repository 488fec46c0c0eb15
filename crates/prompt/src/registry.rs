//! Prompt registry: built-in defaults with workspace YAML overrides.

use crate::types::PromptDefinition;
use selfrag_core::{AppError, AppResult};
use std::path::Path;

/// Identifier of the relevance-grading prompt.
pub const GRADE_RELEVANCE: &str = "grade.relevance";
/// Identifier of the grounding-grading prompt.
pub const GRADE_GROUNDING: &str = "grade.grounding";
/// Identifier of the answer-adequacy prompt.
pub const GRADE_ADEQUACY: &str = "grade.adequacy";
/// Identifier of the answer-generation prompt.
pub const GENERATE_ANSWER: &str = "generate.answer";
/// Identifier of the question-rewrite prompt.
pub const REWRITE_QUESTION: &str = "rewrite.question";
/// Identifier of the structured-answerability prompt.
pub const STRUCTURED_CLASSIFY: &str = "structured.classify";
/// Identifier of the structured-query-generation prompt.
pub const STRUCTURED_QUERY: &str = "structured.query";

/// All built-in prompt identifiers.
pub fn prompt_ids() -> &'static [&'static str] {
    &[
        GRADE_RELEVANCE,
        GRADE_GROUNDING,
        GRADE_ADEQUACY,
        GENERATE_ANSWER,
        REWRITE_QUESTION,
        STRUCTURED_CLASSIFY,
        STRUCTURED_QUERY,
    ]
}

/// Get the built-in definition for a prompt ID, if one exists.
fn builtin(prompt_id: &str) -> Option<PromptDefinition> {
    let def = match prompt_id {
        GRADE_RELEVANCE => PromptDefinition::builtin(
            GRADE_RELEVANCE,
            "Passage relevance grader",
            Some(
                "You are a grader assessing whether a retrieved passage is relevant \
                 to a user question. It does not need to answer the question fully; \
                 it is relevant if it contains keywords or meaning related to the \
                 question. Respond with ONLY 'yes' or 'no'.",
            ),
            "Passage:\n{{document}}\n\nQuestion: {{question}}",
        ),
        GRADE_GROUNDING => PromptDefinition::builtin(
            GRADE_GROUNDING,
            "Answer grounding grader",
            Some(
                "You are a grader assessing whether an answer is supported by a set \
                 of facts. The answer must not contain claims that go beyond the \
                 facts. Respond with ONLY 'yes' or 'no'.",
            ),
            "Facts:\n{{evidence}}\n\nAnswer: {{answer}}",
        ),
        GRADE_ADEQUACY => PromptDefinition::builtin(
            GRADE_ADEQUACY,
            "Answer adequacy grader",
            Some(
                "You are a grader assessing whether an answer actually resolves a \
                 question. Respond with ONLY 'yes' or 'no'.",
            ),
            "Question: {{question}}\n\nAnswer: {{answer}}",
        ),
        GENERATE_ANSWER => PromptDefinition::builtin(
            GENERATE_ANSWER,
            "Answer generation",
            Some(
                "You are an assistant answering questions from retrieved evidence.\n\
                 Instructions:\n\
                 - Provide a clear, direct answer based only on the context provided\n\
                 - Do not mention technical terms like \"context\", \"passages\", or \"retrieval\"\n\
                 - If the context does not contain the answer, state: \"I could not \
                 find this information in the available sources.\"\n\
                 - Keep your response concise and factual",
            ),
            "User question:\n{{question}}\n\nRelevant context:\n{{context}}",
        ),
        REWRITE_QUESTION => PromptDefinition::builtin(
            REWRITE_QUESTION,
            "Question rewriter",
            Some(
                "You are a question rewriter. Rewrite the input question into a \
                 semantically equivalent form that is better suited for document \
                 retrieval. Return ONLY the rewritten question, nothing else.",
            ),
            "{{question}}",
        ),
        STRUCTURED_CLASSIFY => PromptDefinition::builtin(
            STRUCTURED_CLASSIFY,
            "Structured answerability classifier",
            Some(
                "You are a database expert. Given a question, determine whether it \
                 can be answered using the database described below.\n\n\
                 Schema:\n{{schema}}\n\n\
                 Respond with ONLY 'yes' or 'no'.",
            ),
            "{{question}}",
        ),
        STRUCTURED_QUERY => PromptDefinition::builtin(
            STRUCTURED_QUERY,
            "Structured query generation",
            Some(
                "You are a SQL expert. Generate a single SQLite SELECT query that \
                 answers the question using the database described below.\n\n\
                 Schema:\n{{schema}}\n\n\
                 Rules:\n\
                 1. Only use columns that exist in the schema\n\
                 2. Return the query only, no explanations, no backticks\n\
                 3. If the question cannot be answered from the schema, return 'None'",
            ),
            "{{question}}",
        ),
        _ => return None,
    };
    Some(def)
}

/// Load a prompt definition by ID.
///
/// A workspace override at `.selfrag/prompts/<id>.yml` takes precedence
/// over the built-in definition of the same ID.
///
/// # Arguments
/// * `workspace_path` - Root workspace directory containing `.selfrag/`
/// * `prompt_id` - Prompt identifier (e.g., "grade.relevance")
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".selfrag/prompts")
        .join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to parse prompt YAML {:?}: {}",
                prompt_file, e
            ))
        })?;

        validate_prompt(&definition)?;
        return Ok(definition);
    }

    builtin(prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt ID: {}", prompt_id)))
}

/// List all available prompt IDs: built-ins plus workspace overrides.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut ids: Vec<String> = prompt_ids().iter().map(|s| s.to_string()).collect();

    let prompts_dir = workspace_path.join(".selfrag/prompts");
    if prompts_dir.exists() {
        for entry in walkdir::WalkDir::new(&prompts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !ids.iter().any(|id| id == stem) {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
    }

    ids.sort();
    Ok(ids)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
