//! LLM-backed pipeline roles: graders, generator, and rewriter.

use async_trait::async_trait;
use selfrag_core::AppResult;
use selfrag_llm::{LlmClient, LlmRequest};
use selfrag_pipeline::{Generator, Grader, ProviderError, QueryRewriter, Verdict};
use selfrag_prompt::registry::{
    GENERATE_ANSWER, GRADE_ADEQUACY, GRADE_GROUNDING, GRADE_RELEVANCE, REWRITE_QUESTION,
};
use selfrag_prompt::{load_prompt, render_prompt, PromptDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Run a rendered prompt through the LLM.
async fn complete(
    llm: &Arc<dyn LlmClient>,
    model: &str,
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
    temperature: f32,
    max_tokens: Option<u32>,
) -> Result<String, ProviderError> {
    let built = render_prompt(definition, variables).map_err(|e| ProviderError::new(e.to_string()))?;

    let mut request = LlmRequest::new(built.user, model).with_temperature(temperature);
    if let Some(system) = built.system {
        request = request.with_system(system);
    }
    if let Some(max_tokens) = max_tokens {
        request = request.with_max_tokens(max_tokens);
    }

    let response = llm
        .complete(&request)
        .await
        .map_err(|e| ProviderError::new(e.to_string()))?;

    Ok(response.content)
}

/// The three binary graders, backed by one LLM client.
pub struct LlmGrader {
    llm: Arc<dyn LlmClient>,
    model: String,
    relevance: PromptDefinition,
    grounding: PromptDefinition,
    adequacy: PromptDefinition,
}

impl LlmGrader {
    /// Load the grader prompts and bind them to an LLM client.
    pub fn new(workspace: &Path, llm: Arc<dyn LlmClient>, model: &str) -> AppResult<Self> {
        Ok(Self {
            llm,
            model: model.to_string(),
            relevance: load_prompt(workspace, GRADE_RELEVANCE)?,
            grounding: load_prompt(workspace, GRADE_GROUNDING)?,
            adequacy: load_prompt(workspace, GRADE_ADEQUACY)?,
        })
    }

    async fn verdict(
        &self,
        definition: &PromptDefinition,
        variables: HashMap<String, String>,
    ) -> Result<Verdict, ProviderError> {
        let response = complete(&self.llm, &self.model, definition, variables, 0.0, Some(8)).await?;
        let verdict = Verdict::parse(&response);

        if verdict == Verdict::Ambiguous {
            tracing::warn!(
                prompt = %definition.id,
                response = %response.trim(),
                "Ambiguous grader verdict, treating as negative"
            );
        }

        Ok(verdict)
    }
}

#[async_trait]
impl Grader for LlmGrader {
    async fn grade_relevance(
        &self,
        question: &str,
        content: &str,
    ) -> Result<Verdict, ProviderError> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("document".to_string(), content.to_string());
        self.verdict(&self.relevance, variables).await
    }

    async fn grade_grounding(
        &self,
        evidence: &str,
        answer: &str,
    ) -> Result<Verdict, ProviderError> {
        let mut variables = HashMap::new();
        variables.insert("evidence".to_string(), evidence.to_string());
        variables.insert("answer".to_string(), answer.to_string());
        self.verdict(&self.grounding, variables).await
    }

    async fn grade_adequacy(&self, question: &str, answer: &str) -> Result<Verdict, ProviderError> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("answer".to_string(), answer.to_string());
        self.verdict(&self.adequacy, variables).await
    }
}

/// Answer generator backed by an LLM.
pub struct LlmGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

impl LlmGenerator {
    /// Load the generation prompt and bind it to an LLM client.
    pub fn new(workspace: &Path, llm: Arc<dyn LlmClient>, model: &str) -> AppResult<Self> {
        Ok(Self {
            llm,
            model: model.to_string(),
            prompt: load_prompt(workspace, GENERATE_ANSWER)?,
        })
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String, ProviderError> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("context".to_string(), context.to_string());

        // Low temperature for factual answers
        let answer = complete(&self.llm, &self.model, &self.prompt, variables, 0.3, Some(1000)).await?;

        Ok(answer.trim().to_string())
    }
}

/// Question rewriter backed by an LLM.
pub struct LlmRewriter {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

impl LlmRewriter {
    /// Load the rewrite prompt and bind it to an LLM client.
    pub fn new(workspace: &Path, llm: Arc<dyn LlmClient>, model: &str) -> AppResult<Self> {
        Ok(Self {
            llm,
            model: model.to_string(),
            prompt: load_prompt(workspace, REWRITE_QUESTION)?,
        })
    }
}

#[async_trait]
impl QueryRewriter for LlmRewriter {
    async fn rewrite(&self, question: &str) -> Result<String, ProviderError> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());

        let rewritten = complete(&self.llm, &self.model, &self.prompt, variables, 0.0, Some(128)).await?;

        // Models sometimes wrap the rewrite in quotes
        Ok(rewritten.trim().trim_matches('"').trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfrag_llm::{LlmResponse, LlmUsage};

    struct FixedLlm {
        content: String,
    }

    #[async_trait]
    impl LlmClient for FixedLlm {
        fn provider_name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            Ok(LlmResponse {
                content: self.content.clone(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
            })
        }
    }

    fn fixed(content: &str) -> Arc<dyn LlmClient> {
        Arc::new(FixedLlm {
            content: content.to_string(),
        })
    }

    #[tokio::test]
    async fn test_grader_parses_verdicts() {
        let workspace = std::env::temp_dir();
        let grader = LlmGrader::new(&workspace, fixed("yes"), "llama3.2").unwrap();

        let verdict = grader.grade_relevance("q", "doc").await.unwrap();
        assert!(verdict.is_positive());

        let grader = LlmGrader::new(&workspace, fixed("I am not sure"), "llama3.2").unwrap();
        let verdict = grader.grade_grounding("facts", "answer").await.unwrap();
        assert!(!verdict.is_positive());
    }

    #[tokio::test]
    async fn test_generator_trims_answer() {
        let workspace = std::env::temp_dir();
        let generator =
            LlmGenerator::new(&workspace, fixed("  The answer.\n"), "llama3.2").unwrap();

        let answer = generator.generate("q", "context").await.unwrap();
        assert_eq!(answer, "The answer.");
    }

    #[tokio::test]
    async fn test_rewriter_strips_quotes() {
        let workspace = std::env::temp_dir();
        let rewriter =
            LlmRewriter::new(&workspace, fixed("\"a better question\""), "llama3.2").unwrap();

        let rewritten = rewriter.rewrite("a question").await.unwrap();
        assert_eq!(rewritten, "a better question");
    }
}
