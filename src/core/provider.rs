//! Provider abstraction layer for LLM APIs
//!
//! The agent, the indexer and the memory extractor talk to the model through
//! this trait so an OpenAI-compatible HTTP backend and the in-process test
//! provider are interchangeable.

use crate::models::openai::{
    OpenAIChatCompletionRequest, OpenAIChatCompletionResponse, OpenAIEmbeddingRequest,
    OpenAIEmbeddingResponse,
};
use async_trait::async_trait;
use thiserror::Error;

/// Error types for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Trait for LLM API providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send non-streaming chat completion request
    async fn create_chat_completion(
        &self,
        request: &OpenAIChatCompletionRequest,
    ) -> Result<OpenAIChatCompletionResponse, ProviderError>;

    /// Embed a batch of texts
    async fn create_embeddings(
        &self,
        request: &OpenAIEmbeddingRequest,
    ) -> Result<OpenAIEmbeddingResponse, ProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}
