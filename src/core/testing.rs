//! In-process provider for tests
//!
//! Replies come from a queue of scripted assistant messages; embeddings are a
//! deterministic hashed bag of words so texts sharing words land close.

use crate::core::provider::{Provider, ProviderError};
use crate::models::openai::{
    OpenAIChatCompletionRequest, OpenAIChatCompletionResponse, OpenAIChoice, OpenAIEmbedding,
    OpenAIEmbeddingRequest, OpenAIEmbeddingResponse, OpenAIMessage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const DIMENSIONS: usize = 64;

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<OpenAIMessage>>,
    requests: Mutex<Vec<OpenAIChatCompletionRequest>>,
    embedding_calls: AtomicUsize,
    fail_embeddings: AtomicBool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, message: OpenAIMessage) {
        self.replies.lock().unwrap().push_back(message);
    }

    pub fn fail_embeddings(&self) {
        self.fail_embeddings.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<OpenAIChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<OpenAIChatCompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn embedding_calls(&self) -> usize {
        self.embedding_calls.load(Ordering::SeqCst)
    }

    /// Deterministic embedding of `text`
    pub fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn create_chat_completion(
        &self,
        request: &OpenAIChatCompletionRequest,
    ) -> Result<OpenAIChatCompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let message = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Unexpected("no scripted reply left".to_string()))?;

        Ok(OpenAIChatCompletionResponse {
            id: "chatcmpl-test".to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: request.model.clone(),
            choices: vec![OpenAIChoice {
                index: 0,
                message,
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        })
    }

    async fn create_embeddings(
        &self,
        request: &OpenAIEmbeddingRequest,
    ) -> Result<OpenAIEmbeddingResponse, ProviderError> {
        self.embedding_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(ProviderError::RateLimit("scripted failure".to_string()));
        }

        // reversed: callers must reorder by index
        let data = request
            .input
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| OpenAIEmbedding {
                index,
                embedding: Self::embed(text),
            })
            .collect();

        Ok(OpenAIEmbeddingResponse {
            data,
            model: request.model.clone(),
            usage: None,
        })
    }

    fn provider_name(&self) -> &str {
        "Scripted"
    }
}
