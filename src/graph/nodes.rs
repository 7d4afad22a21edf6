//! Graph nodes
//!
//! `llm_node` asks the model for the next Thought + Action, `tool_node` runs
//! the requested actions and records the observations, and
//! `should_continue` picks the next edge.

use crate::core::client::ModelClient;
use crate::core::constants::PREVIEW_CHARS;
use crate::core::provider::ProviderError;
use crate::graph::state::{AgentState, StateUpdate};
use crate::models::openai::{OpenAIMessage, OpenAITool};
use crate::tools::ToolRegistry;
use serde_json::{Value, json};
use tracing::{info, warn};

pub const SYSTEM_PROMPT: &str = "\
You are a helpful AI assistant that uses tools with a ReAct-style loop.

당신은 다음과 같은 Tool들을 사용할 수 있습니다:
- search_documents: 수업 자료 PDF에서 정보 검색 (Function Calling, RAG, LangGraph 등)
- read_memory: 과거 대화 내용에서 기억 검색
- write_memory: 중요한 정보를 장기 기억에 저장
- calculator: 사칙연산 수행
- get_time: 현재 시간 조회
- google_search: Google 검색으로 최신 정보 검색

**ReAct 패턴 가이드:**

1. **Thought (생각)**: 질문을 분석하고 어떤 도구가 필요한지 생각합니다.
2. **Action (행동)**: 필요한 도구를 호출합니다 (tool_calls).
3. **Observation (관찰)**: 도구 실행 결과를 확인합니다.
4. **Final Answer (최종 답변)**: 관찰 결과를 바탕으로 사용자에게 친절하게 답변합니다.

**중요 규칙:**
- 강의 내용에 대한 질문은 반드시 `search_documents` 도구를 사용하세요.
- 최신 뉴스, 실시간 정보는 `google_search` 도구를 사용하세요.
- 계산이 필요하면 `calculator` 도구를 사용하세요 (추측하지 마세요).
- 사용자의 개인정보나 선호사항은 `write_memory`로 저장하세요.
- 도구 결과를 직접 인용할 때는 출처를 명확히 밝히세요.
- 답변은 항상 한국어로 친절하게 작성하세요.

**메모리 저장 가이드:**
다음과 같은 정보는 자동으로 저장해야 합니다:
- 사용자의 이름, 전공, 관심사 등 개인정보 (memory_type: \"profile\")
- 중요한 대화 내용, 사건, 경험 (memory_type: \"episodic\")
- 사용자가 학습한 개념, 이해한 내용 (memory_type: \"knowledge\")
";

/// Edge taken after the LLM node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Tools,
    End,
}

/// First `max` characters of `text`, with an ellipsis when cut
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Ask the model for the next step given the whole conversation
pub async fn llm_node(
    state: &AgentState,
    client: &ModelClient,
    tools: &[OpenAITool],
) -> Result<StateUpdate, ProviderError> {
    let mut messages = Vec::with_capacity(state.messages.len() + 1);
    messages.push(OpenAIMessage::system(SYSTEM_PROMPT));
    messages.extend(state.messages.iter().cloned());

    let reply = client.chat(messages, Some(tools.to_vec()), None).await?;

    info!("🤖 LLM node (loop {})", state.loop_count + 1);
    if !reply.text().is_empty() {
        info!("💭 Thought: {}", preview(reply.text(), PREVIEW_CHARS));
    }
    for call in reply.calls() {
        info!("🔧 Action: {}({})", call.function.name, call.function.arguments);
    }

    let message = OpenAIMessage::assistant_with_tools(
        reply.content.unwrap_or_default(),
        reply.tool_calls.unwrap_or_default(),
    );

    Ok(StateUpdate {
        messages: vec![message],
        loop_count: Some(state.loop_count + 1),
    })
}

fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        Ok(json!({}))
    } else {
        serde_json::from_str(raw)
    }
}

/// Execute every tool call of the last message, in order
pub async fn tool_node(state: &AgentState, registry: &ToolRegistry) -> StateUpdate {
    let calls = state
        .last_message()
        .map(|m| m.calls().to_vec())
        .unwrap_or_default();

    if calls.is_empty() {
        warn!("tool node reached without tool calls");
        return StateUpdate::default();
    }

    let mut messages = Vec::with_capacity(calls.len());
    for call in calls {
        let name = call.function.name.as_str();
        info!("🔍 Executing: {}", name);

        let outcome = match parse_arguments(&call.function.arguments) {
            Ok(args) => registry
                .call(name, args.clone())
                .await
                .map_err(|e| (e.to_string(), args)),
            Err(e) => Err((e.to_string(), Value::String(call.function.arguments.clone()))),
        };

        let output = match outcome {
            Ok(output) => {
                info!("📊 Result preview: {}", preview(&output, PREVIEW_CHARS));
                output
            }
            Err((reason, arguments)) => {
                warn!("❌ Tool {} failed: {}", name, reason);
                json!({
                    "error": format!("Tool execution failed: {}", reason),
                    "tool_name": name,
                    "arguments": arguments,
                })
                .to_string()
            }
        };

        messages.push(OpenAIMessage::tool(call.id.clone(), name, output));
    }

    StateUpdate {
        messages,
        loop_count: None,
    }
}

/// `End` at the loop cap or when the model answered without tool calls
pub fn should_continue(state: &AgentState, max_loops: u32) -> Route {
    if state.loop_count >= max_loops {
        warn!("⚠️ Max loops ({}) reached. Forcing end.", max_loops);
        return Route::End;
    }

    match state.last_message() {
        Some(message) if message.has_tool_calls() => Route::Tools,
        _ => Route::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedProvider;
    use crate::models::openai::OpenAIToolCall;
    use crate::store::VectorStore;
    use crate::tools::rag_tool::SearchSettings;
    use crate::tools::web_search::WebSearch;
    use crate::tools::{ToolContext, register_default_tools};
    use std::sync::Arc;

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

    fn state_with_calls(calls: Vec<OpenAIToolCall>) -> AgentState {
        AgentState {
            messages: vec![
                OpenAIMessage::user("question"),
                OpenAIMessage::assistant_with_tools("", calls),
            ],
            loop_count: 1,
        }
    }

    #[test]
    fn test_should_continue() {
        let state = state_with_calls(vec![OpenAIToolCall::new("c1", "get_time", "{}")]);
        assert_eq!(should_continue(&state, 10), Route::Tools);

        let mut capped = state.clone();
        capped.loop_count = 10;
        assert_eq!(should_continue(&capped, 10), Route::End);

        let answered = AgentState {
            messages: vec![OpenAIMessage::assistant("final")],
            loop_count: 1,
        };
        assert_eq!(should_continue(&answered, 10), Route::End);
        assert_eq!(should_continue(&AgentState::default(), 10), Route::End);
    }

    #[tokio::test]
    async fn test_llm_node_appends_reply_and_counts() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut reply = OpenAIMessage::assistant_with_tools(
            "",
            vec![OpenAIToolCall::new("c1", "calculator", r#"{"a":1,"op":"+","b":2}"#)],
        );
        reply.content = None;
        provider.push_reply(reply);
        let client = ModelClient::new(provider.clone(), "gpt-4o-mini", "embed");
        let tools = registry().list_openai_tools();

        let state = AgentState::new(vec![OpenAIMessage::user("1+2?")]);
        let update = llm_node(&state, &client, &tools).await.unwrap();

        assert_eq!(update.loop_count, Some(1));
        assert_eq!(update.messages[0].content.as_deref(), Some(""));
        assert!(update.messages[0].has_tool_calls());

        let request = provider.last_request().unwrap();
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].text(), SYSTEM_PROMPT);
        assert_eq!(request.messages[1].text(), "1+2?");
        assert_eq!(request.tools.unwrap().len(), 6);
        assert_eq!(request.tool_choice, Some(json!("auto")));
    }

    #[tokio::test]
    async fn test_tool_node_runs_each_call() {
        let state = state_with_calls(vec![
            OpenAIToolCall::new("c1", "calculator", r#"{"a": 1234, "op": "*", "b": 5678}"#),
            OpenAIToolCall::new("c2", "get_time", ""),
        ]);
        let update = tool_node(&state, &registry()).await;

        assert_eq!(update.loop_count, None);
        assert_eq!(update.messages.len(), 2);
        assert_eq!(update.messages[0].role, "tool");
        assert_eq!(update.messages[0].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(update.messages[0].name.as_deref(), Some("calculator"));
        let value: Value = serde_json::from_str(update.messages[0].text()).unwrap();
        assert_eq!(value["result"], 7006652.0);

        let value: Value = serde_json::from_str(update.messages[1].text()).unwrap();
        assert_eq!(value["timezone"], "Asia/Seoul");
    }

    #[tokio::test]
    async fn test_tool_node_failures_become_observations() {
        let state = state_with_calls(vec![
            OpenAIToolCall::new("c1", "no_such_tool", "{}"),
            OpenAIToolCall::new("c2", "calculator", "{not json"),
        ]);
        let update = tool_node(&state, &registry()).await;

        let unknown: Value = serde_json::from_str(update.messages[0].text()).unwrap();
        assert_eq!(unknown["error"], "Tool execution failed: Unknown tool: no_such_tool");
        assert_eq!(unknown["tool_name"], "no_such_tool");
        assert_eq!(unknown["arguments"], json!({}));

        let malformed: Value = serde_json::from_str(update.messages[1].text()).unwrap();
        assert!(malformed["error"].as_str().unwrap().starts_with("Tool execution failed"));
        assert_eq!(malformed["arguments"], "{not json");
    }

    #[tokio::test]
    async fn test_tool_node_without_calls() {
        let state = AgentState::new(vec![OpenAIMessage::assistant("done")]);
        assert!(tool_node(&state, &registry()).await.messages.is_empty());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("가나다라마", 2), "가나...");
    }
}
