//! LLM provider abstraction for the selfrag pipeline.
//!
//! Defines the `LlmClient` trait, request/response types, the Ollama
//! provider implementation, and a small factory for provider resolution.

pub mod client;
pub mod factory;
pub mod providers;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::OllamaClient;
