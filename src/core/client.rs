//! Model client
//!
//! Thin layer over a [`Provider`] that fixes the chat and embedding models and
//! exposes the two calls the rest of the crate needs: embed texts and get the
//! next assistant message.

use crate::core::provider::{Provider, ProviderError};
use crate::models::openai::{
    OpenAIChatCompletionRequest, OpenAIEmbeddingRequest, OpenAIMessage, OpenAITool,
};
use serde_json::Value;
use std::sync::Arc;

/// Chat and embedding access bound to the configured models
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
    chat_model: String,
    embed_model: String,
}

impl ModelClient {
    pub fn new(
        provider: Arc<dyn Provider>,
        chat_model: impl Into<String>,
        embed_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            chat_model: chat_model.into(),
            embed_model: embed_model.into(),
        }
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Embed `texts`, returning one vector per input in input order
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAIEmbeddingRequest {
            model: self.embed_model.clone(),
            input: texts.to_vec(),
        };
        let mut response = self.provider.create_embeddings(&request).await?;

        if response.data.len() != texts.len() {
            return Err(ProviderError::Unexpected(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|item| item.index);
        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }

    /// Embed a single text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_texts(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ProviderError::EmptyResponse("no embedding returned".to_string()))
    }

    /// Ask the chat model for the next assistant message
    ///
    /// When `tools` is given the model may answer with tool calls
    /// (`tool_choice = "auto"`).
    pub async fn chat(
        &self,
        messages: Vec<OpenAIMessage>,
        tools: Option<Vec<OpenAITool>>,
        temperature: Option<f32>,
    ) -> Result<OpenAIMessage, ProviderError> {
        let mut request = OpenAIChatCompletionRequest::new(self.chat_model.clone(), messages);
        request.temperature = temperature;
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            request.tools = Some(tools);
            request.tool_choice = Some(Value::String("auto".to_string()));
        }

        let response = self.provider.create_chat_completion(&request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ProviderError::EmptyResponse("no choices in completion".to_string()))
    }

    /// Plain chat returning only the text of the answer
    pub async fn chat_text(&self, messages: Vec<OpenAIMessage>) -> Result<String, ProviderError> {
        let message = self.chat(messages, None, None).await?;
        Ok(message.content.unwrap_or_default())
    }

    /// One tiny completion to verify credentials and connectivity
    pub async fn ping(&self) -> Result<String, ProviderError> {
        let mut request = OpenAIChatCompletionRequest::new(
            self.chat_model.clone(),
            vec![OpenAIMessage::user("Hello!")],
        );
        request.max_tokens = Some(10);
        let response = self.provider.create_chat_completion(&request).await?;
        Ok(response.id)
    }
}
