//! Tavily web-search provider.
//!
//! Tavily API: https://docs.tavily.com/docs/rest-api/api-reference

use async_trait::async_trait;
use selfrag_pipeline::{Passage, ProviderError, WebSearcher};
use serde::{Deserialize, Serialize};

/// Default number of results requested per search.
const MAX_RESULTS: u32 = 5;

/// Tavily search request format.
#[derive(Debug, Serialize)]
struct TavilyRequest {
    api_key: String,
    query: String,
    include_answer: bool,
    max_results: u32,
}

/// Tavily search response format.
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,

    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,

    #[serde(default)]
    url: String,

    #[serde(default)]
    content: String,
}

/// Web searcher backed by the Tavily search API.
pub struct TavilySearcher {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl TavilySearcher {
    /// Create a searcher against the given endpoint.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Synthesize one evidence text from the API response.
    ///
    /// Prefers the API's own answer; otherwise stitches the result
    /// snippets together.
    fn synthesize(response: &TavilyResponse) -> Option<String> {
        if let Some(answer) = &response.answer {
            if !answer.trim().is_empty() {
                return Some(answer.trim().to_string());
            }
        }

        if response.results.is_empty() {
            return None;
        }

        let summary = response
            .results
            .iter()
            .filter(|result| !result.content.trim().is_empty())
            .map(|result| format!("{}: {}", result.title, result.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        if summary.is_empty() {
            None
        } else {
            Some(summary)
        }
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(&self, question: &str) -> Result<Passage, ProviderError> {
        tracing::info!("Performing web search");

        let request = TavilyRequest {
            api_key: self.api_key.clone(),
            query: question.to_string(),
            include_answer: true,
            max_results: MAX_RESULTS,
        };

        let url = format!("{}/search", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::new(format!(
                "search API error ({}): {}",
                status, error_text
            )));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("failed to parse search response: {}", e)))?;

        let content = Self::synthesize(&body)
            .ok_or_else(|| ProviderError::new("search returned no usable results"))?;

        let mut passage = Passage::new(content);
        if let Some(top) = body.results.first() {
            if !top.url.is_empty() {
                passage = passage.with_attribute("url", &top.url);
            }
        }

        Ok(passage)
    }
}

/// Null searcher used when web search is disabled or unconfigured.
///
/// Always fails; the pipeline converts the failure into an error-tagged
/// evidence item and moves on without retrying.
pub struct OfflineWebSearcher;

#[async_trait]
impl WebSearcher for OfflineWebSearcher {
    async fn search(&self, _question: &str) -> Result<Passage, ProviderError> {
        Err(ProviderError::new("web search is disabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_prefers_answer() {
        let response = TavilyResponse {
            answer: Some("Direct answer.".to_string()),
            results: vec![TavilyResult {
                title: "Page".to_string(),
                url: "https://example.com".to_string(),
                content: "snippet".to_string(),
            }],
        };

        assert_eq!(
            TavilySearcher::synthesize(&response).unwrap(),
            "Direct answer."
        );
    }

    #[test]
    fn test_synthesize_falls_back_to_snippets() {
        let response = TavilyResponse {
            answer: None,
            results: vec![
                TavilyResult {
                    title: "First".to_string(),
                    url: String::new(),
                    content: "one".to_string(),
                },
                TavilyResult {
                    title: "Second".to_string(),
                    url: String::new(),
                    content: "two".to_string(),
                },
            ],
        };

        let summary = TavilySearcher::synthesize(&response).unwrap();
        assert!(summary.contains("First: one"));
        assert!(summary.contains("Second: two"));
    }

    #[test]
    fn test_synthesize_empty_response() {
        let response = TavilyResponse {
            answer: Some("   ".to_string()),
            results: vec![],
        };

        assert!(TavilySearcher::synthesize(&response).is_none());
    }

    #[tokio::test]
    async fn test_offline_searcher_fails() {
        let searcher = OfflineWebSearcher;
        let result = searcher.search("anything").await;
        assert!(result.is_err());
    }
}
