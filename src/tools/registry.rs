//! Tool registry
//!
//! Indexes tool specs by name, lists them in function-calling form and runs
//! them. Tool failures never escape [`ToolRegistry::call`]; they come back as
//! JSON error payloads the model can read.

use crate::models::openai::OpenAITool;
use crate::tools::context::ToolContext;
use crate::tools::definitions::{ToolError, ToolSpec, as_openai_tool_spec, default_tool_specs};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Registered tools in registration order
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.tools.iter().any(|t| t.name == spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        self.tools.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ToolSpec, RegistryError> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    pub fn list_openai_tools(&self) -> Vec<OpenAITool> {
        self.tools.iter().map(as_openai_tool_spec).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Human readable listing
    pub fn describe(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = format!("\n📦 등록된 Tool 목록:\n{}\n", rule);
        for spec in &self.tools {
            out.push_str(&format!("\n🔧 {}\n   {}\n", spec.name, spec.description));
        }
        out.push_str(&rule);
        out
    }

    /// Run a tool and render its output for the model
    ///
    /// Only an unknown tool name is an error; validation and runtime failures
    /// are rendered as JSON.
    pub async fn call(&self, name: &str, args: Value) -> Result<String, RegistryError> {
        let spec = self.get(name)?;
        debug!("Calling tool {} with {}", name, args);

        let rendered = match spec.handler.call(args.clone()).await {
            Ok(Value::String(text)) => return Ok(text),
            Ok(value) => value,
            Err(ToolError::Validation(details)) => json!({
                "error": "validation_error",
                "details": details,
                "tool_name": name,
                "arguments": args,
            }),
            Err(ToolError::Runtime(details)) => json!({
                "error": "runtime_error",
                "details": details,
                "tool_name": name,
                "arguments": args,
            }),
        };

        Ok(serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| rendered.to_string()))
    }
}

/// Registry holding the six built-in tools
pub fn register_default_tools(ctx: Arc<ToolContext>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    for spec in default_tool_specs(ctx) {
        registry.register_tool(spec)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::ModelClient;
    use crate::core::testing::ScriptedProvider;
    use crate::store::VectorStore;
    use crate::tools::rag_tool::SearchSettings;
    use crate::tools::web_search::WebSearch;

    fn registry() -> ToolRegistry {
        let client = ModelClient::new(Arc::new(ScriptedProvider::new()), "chat", "embed");
        let ctx = ToolContext::new(
            client,
            VectorStore::open_in_memory().unwrap(),
            SearchSettings {
                reranker: None,
                candidate_multiplier: 2,
            },
            WebSearch::new(None, None).unwrap(),
        );
        register_default_tools(Arc::new(ctx)).unwrap()
    }

    #[test]
    fn test_default_tools_in_order() {
        let registry = registry();
        assert_eq!(
            registry.tool_names(),
            vec![
                "search_documents",
                "read_memory",
                "write_memory",
                "calculator",
                "get_time",
                "google_search"
            ]
        );

        let tools = registry.list_openai_tools();
        assert_eq!(tools.len(), 6);
        assert_eq!(tools[0].tool_type, "function");
        assert_eq!(tools[0].function.name, "search_documents");
        assert_eq!(tools[3].function.parameters["type"], "object");
        assert!(registry.describe().contains("🔧 get_time"));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry();
        let spec = registry.get("calculator").unwrap().clone();
        assert_eq!(
            registry.register_tool(spec),
            Err(RegistryError::Duplicate("calculator".to_string()))
        );
    }

    #[tokio::test]
    async fn test_call_calculator() {
        let output = registry()
            .call("calculator", json!({"a": 100, "op": "*", "b": 2}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["expression"], "100.0 * 2.0");
        assert_eq!(value["result"], 200.0);
        assert!(output.contains('\n'));
    }

    #[tokio::test]
    async fn test_validation_error_payload() {
        let args = json!({"a": 10, "op": "**", "b": 5});
        let output = registry().call("calculator", args.clone()).await.unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["error"], "validation_error");
        assert_eq!(value["tool_name"], "calculator");
        assert_eq!(value["arguments"], args);
        assert!(value["details"].is_array());
    }

    #[tokio::test]
    async fn test_runtime_error_payload() {
        let output = registry()
            .call("calculator", json!({"a": 1, "op": "/", "b": 0}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["error"], "runtime_error");
        assert_eq!(value["details"], "Division by zero");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = registry().call("launch_rocket", json!({})).await;
        assert_eq!(
            result,
            Err(RegistryError::UnknownTool("launch_rocket".to_string()))
        );
    }

    #[tokio::test]
    async fn test_search_without_index_reports_failure() {
        let output = registry()
            .call("search_documents", json!({"query": "ReAct"}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "검색 중 오류가 발생했습니다.");
    }
}
