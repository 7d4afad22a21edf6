//! OpenAI provider implementation
//!
//! Works against api.openai.com and any OpenAI-compatible base URL.

use crate::core::provider::{Provider, ProviderError};
use crate::models::openai::{
    OpenAIChatCompletionRequest, OpenAIChatCompletionResponse, OpenAIEmbeddingRequest,
    OpenAIEmbeddingResponse,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// OpenAI provider
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `base_url` - OpenAI API base URL
    /// * `timeout` - Request timeout in seconds
    pub fn new(api_key: String, base_url: String, timeout: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| {
                ProviderError::Unexpected(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Classify OpenAI errors and provide helpful messages
    fn classify_error(error_detail: &str) -> String {
        let error_lower = error_detail.to_lowercase();

        if error_lower.contains("unsupported_country_region_territory")
            || error_lower.contains("country, region, or territory not supported")
        {
            return "OpenAI API is not available in your region.".to_string();
        }

        if error_lower.contains("invalid_api_key") || error_lower.contains("unauthorized") {
            return "Invalid API key. Please check your OPENAI_API_KEY configuration.".to_string();
        }

        if error_lower.contains("rate_limit") || error_lower.contains("quota") {
            return "Rate limit exceeded. Please wait and try again, or upgrade your API plan."
                .to_string();
        }

        if error_lower.contains("model")
            && (error_lower.contains("not found") || error_lower.contains("does not exist"))
        {
            return "Model not found. Please check CHAT_MODEL / EMBED_MODEL.".to_string();
        }

        if error_lower.contains("billing") || error_lower.contains("payment") {
            return "Billing issue. Please check your OpenAI account billing status.".to_string();
        }

        error_detail.to_string()
    }

    /// POST `body` to `{base_url}/{path}` and decode the JSON answer
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Unexpected(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("OpenAI {} failed with status {}", path, status);
            let classified_error = Self::classify_error(&error_text);

            return Err(match status.as_u16() {
                401 => ProviderError::Authentication(classified_error),
                429 => ProviderError::RateLimit(classified_error),
                400 => ProviderError::BadRequest(classified_error),
                _ => ProviderError::ApiError {
                    status: status.as_u16(),
                    message: classified_error,
                },
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Unexpected(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn create_chat_completion(
        &self,
        request: &OpenAIChatCompletionRequest,
    ) -> Result<OpenAIChatCompletionResponse, ProviderError> {
        self.post_json("chat/completions", request).await
    }

    async fn create_embeddings(
        &self,
        request: &OpenAIEmbeddingRequest,
    ) -> Result<OpenAIEmbeddingResponse, ProviderError> {
        self.post_json("embeddings", request).await
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error() {
        let classify = OpenAIProvider::classify_error;
        assert!(classify("invalid_api_key provided").contains("OPENAI_API_KEY"));
        assert!(classify("You exceeded your current quota").contains("Rate limit"));
        assert!(classify("The model `gpt-x` does not exist").contains("Model not found"));
        assert_eq!(classify("boom"), "boom");
    }

    async fn spawn_api() -> String {
        use axum::{Json, Router, http::StatusCode, routing::post};
        use serde_json::{Value, json};

        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "id": "chatcmpl-1",
                        "object": "chat.completion",
                        "created": 0,
                        "model": body["model"],
                        "choices": [{
                            "index": 0,
                            "message": {"role": "assistant", "content": "pong"},
                            "finish_reason": "stop"
                        }]
                    }))
                }),
            )
            .route(
                "/v1/embeddings",
                post(|| async {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"error": {"code": "invalid_api_key"}})),
                    )
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    #[tokio::test]
    async fn test_chat_completion_round_trip() {
        use crate::models::openai::OpenAIMessage;

        let provider = OpenAIProvider::new("sk-test".into(), spawn_api().await, 5).unwrap();
        let request =
            OpenAIChatCompletionRequest::new("gpt-4o-mini", vec![OpenAIMessage::user("ping")]);
        let response = provider.create_chat_completion(&request).await.unwrap();
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.choices[0].message.text(), "pong");
    }

    #[tokio::test]
    async fn test_error_status_is_classified() {
        let provider = OpenAIProvider::new("sk-bad".into(), spawn_api().await, 5).unwrap();
        let request = OpenAIEmbeddingRequest {
            model: "text-embedding-3-small".into(),
            input: vec!["hello".into()],
        };
        match provider.create_embeddings(&request).await {
            Err(ProviderError::Authentication(message)) => {
                assert!(message.contains("OPENAI_API_KEY"))
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.data.len())),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider =
            OpenAIProvider::new("sk-test".into(), "https://api.openai.com/v1/".into(), 5).unwrap();
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.provider_name(), "OpenAI");
    }
}
