//! OpenAI API data models
//!
//! Request and response structures for the chat completions and embeddings
//! endpoints. Chat messages double as the agent's conversation record.

use crate::core::constants::{role, tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OpenAI message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl OpenAIMessage {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(role::SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(role::USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(role::ASSISTANT, content)
    }

    /// Assistant message requesting tool calls
    pub fn assistant_with_tools(content: impl Into<String>, calls: Vec<OpenAIToolCall>) -> Self {
        let mut message = Self::assistant(content);
        if !calls.is_empty() {
            message.tool_calls = Some(calls);
        }
        message
    }

    /// Tool observation answering `tool_call_id`
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut message = Self::with_role(role::TOOL, content);
        message.tool_call_id = Some(tool_call_id.into());
        message.name = Some(name.into());
        message
    }

    /// Text content, empty when absent
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Tool calls requested by this message, empty when none
    pub fn calls(&self) -> &[OpenAIToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.calls().is_empty()
    }
}

/// OpenAI tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: OpenAIFunction,
}

fn default_call_type() -> String {
    tool::FUNCTION.to_string()
}

#[cfg(test)]
impl OpenAIToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: tool::FUNCTION.to_string(),
            function: OpenAIFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// OpenAI function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// OpenAI tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAITool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAIFunctionDef,
}

/// OpenAI function definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// OpenAI chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

impl OpenAIChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<OpenAIMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            tools: None,
            tool_choice: None,
        }
    }
}

/// OpenAI chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

/// OpenAI choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChoice {
    pub index: u32,
    pub message: OpenAIMessage,
    pub finish_reason: Option<String>,
}

/// OpenAI usage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// OpenAI embeddings request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIEmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

/// OpenAI embeddings response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIEmbeddingResponse {
    pub data: Vec<OpenAIEmbedding>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

/// A single embedding vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIEmbedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}
