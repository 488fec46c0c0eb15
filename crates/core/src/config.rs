//! Configuration management for the selfrag CLI.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.selfrag/config.yaml)
//!
//! The configuration is workspace-centric, with most state stored in `.selfrag/`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Main application configuration.
///
/// This struct holds all global configuration options that affect
/// CLI behavior across commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .selfrag/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// LLM provider (e.g., "ollama")
    pub provider: String,

    /// Default model identifier
    pub model: String,

    /// Provider endpoint override (e.g., Ollama base URL)
    pub endpoint: Option<String>,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Pipeline tuning knobs
    pub pipeline: PipelineSettings,

    /// Structured-store settings
    pub structured: StructuredSettings,

    /// Web-search settings
    pub websearch: WebSearchSettings,
}

/// Pipeline tuning knobs from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Ceiling on total node executions per run
    #[serde(rename = "maxSteps", default = "default_max_steps")]
    pub max_steps: u32,

    /// Number of passages to retrieve per similarity lookup
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: usize,

    /// Per-node deadline in seconds; an expired call takes that node's failure path
    #[serde(rename = "nodeTimeoutSecs", default = "default_node_timeout")]
    pub node_timeout_secs: u64,
}

/// Structured-store settings from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredSettings {
    /// Whether to consult the structured store at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to the SQLite database, relative to the workspace
    #[serde(rename = "dbPath", default = "default_db_path")]
    pub db_path: PathBuf,

    /// Plain-text schema description given to the query-generation prompts
    #[serde(rename = "schemaDescription", default)]
    pub schema_description: String,
}

/// Web-search settings from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchSettings {
    /// Whether the web-search fallback is available
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Environment variable holding the search API key
    #[serde(rename = "apiKeyEnv", default = "default_search_key_env")]
    pub api_key_env: String,

    /// Search API endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
}

fn default_max_steps() -> u32 {
    8
}

fn default_top_k() -> usize {
    4
}

fn default_node_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".selfrag/structured.db")
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            top_k: default_top_k(),
            node_timeout_secs: default_node_timeout(),
        }
    }
}

impl Default for StructuredSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_db_path(),
            schema_description: String::new(),
        }
    }
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    pipeline: Option<PipelineSettings>,
    structured: Option<StructuredSettings>,
    websearch: Option<WebSearchSettings>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    #[serde(rename = "apiKeyEnv")]
    api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            pipeline: PipelineSettings::default(),
            structured: StructuredSettings::default(),
            websearch: WebSearchSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `SELFRAG_WORKSPACE`: Override workspace path
    /// - `SELFRAG_CONFIG`: Path to config file
    /// - `SELFRAG_PROVIDER`: LLM provider
    /// - `SELFRAG_MODEL`: Model identifier
    /// - `SELFRAG_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        // Load from environment variables
        if let Ok(workspace) = std::env::var("SELFRAG_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("SELFRAG_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        // Validate workspace exists
        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        // Load from YAML config file if it exists
        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join(".selfrag/config.yaml")
        };

        if config_path.exists() {
            tracing::debug!("Merging config file {:?}", config_path);
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("SELFRAG_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("SELFRAG_MODEL") {
            config.model = model;
        }

        if let Ok(key) = std::env::var("SELFRAG_API_KEY") {
            config.api_key = Some(key);
        }

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        // Check for NO_COLOR environment variable
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        // Merge logging settings
        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        // Merge LLM settings
        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
            if let Some(env_var) = llm.api_key_env {
                if let Ok(key) = std::env::var(&env_var) {
                    result.api_key = Some(key);
                }
            }
        }

        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }

        if let Some(structured) = config_file.structured {
            result.structured = structured;
        }

        if let Some(websearch) = config_file.websearch {
            result.websearch = websearch;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// This method merges command-line flags with the loaded configuration,
    /// giving precedence to CLI flags over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .selfrag directory.
    pub fn selfrag_dir(&self) -> PathBuf {
        self.workspace.join(".selfrag")
    }

    /// Ensure the .selfrag directory exists.
    pub fn ensure_selfrag_dir(&self) -> AppResult<()> {
        let dir = self.selfrag_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .selfrag directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Path to the document vector index.
    pub fn index_path(&self) -> PathBuf {
        self.selfrag_dir().join("index.db")
    }

    /// Path to the structured store, resolved against the workspace.
    pub fn structured_db_path(&self) -> PathBuf {
        if self.structured.db_path.is_absolute() {
            self.structured.db_path.clone()
        } else {
            self.workspace.join(&self.structured.db_path)
        }
    }

    /// Resolve the web-search API key from the configured environment variable.
    pub fn resolve_search_api_key(&self) -> Option<String> {
        std::env::var(&self.websearch.api_key_env).ok()
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if self.pipeline.max_steps == 0 {
            return Err(AppError::Config(
                "pipeline.maxSteps must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
