//! API endpoint handlers
//!
//! JSON and server-sent-event chat over the ReAct agent, plus service info,
//! health and connectivity checks.

use crate::core::client::ModelClient;
use crate::core::config::Config;
use crate::core::constants::event;
use crate::graph::agent::Step;
use crate::graph::{AgentEvent, ReactAgent};
use crate::memory::MemoryExtractor;
use crate::models::openai::OpenAIMessage;
use crate::store::VectorStore;
use crate::tools::{ToolContext, register_default_tools};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub agent: Arc<ReactAgent>,
    pub client: ModelClient,
    /// `None` disables background memory extraction
    pub extractor: Option<Arc<MemoryExtractor>>,
    /// Most recent user turns and final answers, at most `memory_recent_n`
    pub history: Arc<Mutex<Vec<OpenAIMessage>>>,
}

impl AppState {
    /// Wire the agent, its tools and the memory extractor
    pub fn new(
        config: Arc<Config>,
        client: ModelClient,
        store: Arc<VectorStore>,
    ) -> anyhow::Result<Self> {
        let ctx = ToolContext::from_config(&config, client.clone(), store)?;
        let memory = ctx.memory.clone();
        let registry = Arc::new(register_default_tools(Arc::new(ctx))?);
        let agent = Arc::new(ReactAgent::new(client.clone(), registry, config.max_loops));
        let extractor = config
            .auto_save
            .then(|| Arc::new(MemoryExtractor::new(client.clone(), memory)));

        Ok(Self {
            config,
            agent,
            client,
            extractor,
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Record a finished turn and extract memories in the background
    async fn remember_turn(&self, question: &str, answer: &str) {
        let recent = {
            let mut history = self.history.lock().await;
            history.push(OpenAIMessage::user(question));
            history.push(OpenAIMessage::assistant(answer));
            let excess = history.len().saturating_sub(self.config.memory_recent_n);
            history.drain(..excess);
            history.clone()
        };

        if let Some(extractor) = self.extractor.clone() {
            let min_importance = self.config.memory_min_importance;
            tokio::spawn(async move {
                let saved = extractor.auto_save_memories(&recent, min_importance).await;
                debug!("Background auto-save stored {} memories", saved);
            });
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub thread_id: String,
    pub answer: String,
    pub steps: Vec<Step>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/test-connection", get(test_connection))
        .route("/tools", get(list_tools))
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "type": "error",
            "error": { "message": message.into() }
        })),
    )
        .into_response()
}

fn thread_id_for(request: &ChatRequest) -> String {
    request
        .thread_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// POST /api/chat - Run the agent to completion
async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }
    let thread_id = thread_id_for(&request);
    info!("📥 Chat request on thread {}", thread_id);

    match state.agent.invoke(&request.message, &thread_id).await {
        Ok(outcome) => {
            info!(
                "📤 Thread {} answered after {} loops, {} tool calls",
                thread_id,
                outcome.loops,
                outcome.steps.len()
            );
            state.remember_turn(&request.message, &outcome.answer).await;
            Json(ChatResponse {
                thread_id,
                answer: outcome.answer,
                steps: outcome.steps,
            })
            .into_response()
        }
        Err(e) => {
            error!("Agent error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// SSE events for one agent event
fn sse_events(agent_event: &AgentEvent, thread_id: &str) -> Vec<Event> {
    match agent_event {
        AgentEvent::Llm {
            content,
            tool_calls,
        } => {
            let mut events = Vec::new();
            if !content.is_empty() && !tool_calls.is_empty() {
                events.push(Event::default().event(event::THINKING).data(content.clone()));
            }
            if !tool_calls.is_empty() {
                let names: Vec<&str> = tool_calls
                    .iter()
                    .map(|call| call.function.name.as_str())
                    .collect();
                events.push(
                    Event::default()
                        .event(event::TOOL_USE)
                        .data(json!({ "tools": names }).to_string()),
                );
            }
            events
        }
        AgentEvent::Tools { results } => results
            .iter()
            .map(|result| {
                Event::default().event(event::OBSERVATION).data(
                    json!({ "tool": result.name, "content": result.content }).to_string(),
                )
            })
            .collect(),
        AgentEvent::Done { answer } => vec![
            Event::default()
                .event(event::ANSWER)
                .data(json!({ "thread_id": thread_id, "answer": answer }).to_string()),
        ],
        AgentEvent::Error { message } => vec![
            Event::default()
                .event(event::ERROR)
                .data(json!({ "message": message }).to_string()),
        ],
    }
}

/// Forward agent events to the response, recording the finished turn
///
/// Keeps draining after the client disconnects so the turn still lands in
/// the history.
async fn relay_events<S>(
    state: AppState,
    question: String,
    mut agent_events: S,
    tx: mpsc::Sender<AgentEvent>,
) where
    S: futures::Stream<Item = AgentEvent> + Unpin,
{
    while let Some(agent_event) = agent_events.next().await {
        match &agent_event {
            AgentEvent::Done { answer } => state.remember_turn(&question, answer).await,
            AgentEvent::Error { message } => error!("Agent stream error: {}", message),
            _ => {}
        }
        let _ = tx.send(agent_event).await;
    }
}

/// POST /api/chat/stream - Run the agent, streaming its progress
async fn chat_stream(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }
    let thread_id = thread_id_for(&request);
    info!("📥 Streaming chat request on thread {}", thread_id);

    let agent_events = state.agent.run_agent_stream(&request.message, &thread_id);
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(relay_events(state, request.message, agent_events, tx));

    let mut events = ReceiverStream::new(rx);
    let stream = async_stream::stream! {
        while let Some(agent_event) = events.next().await {
            for sse_event in sse_events(&agent_event, &thread_id) {
                yield Ok::<_, Infallible>(sse_event);
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// GET / - Root endpoint
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "Study Agent v0.1.0",
        "status": "running",
        "config": {
            "openai_base_url": state.config.openai_base_url,
            "chat_model": state.config.chat_model,
            "embed_model": state.config.embed_model,
            "api_key_configured": state.config.validate_api_key(),
            "google_search_configured": state.config.google_search_configured(),
            "rerank": state.config.rerank,
            "max_loops": state.config.max_loops,
            "auto_save": state.extractor.is_some(),
        },
        "endpoints": {
            "chat": "/api/chat",
            "chat_stream": "/api/chat/stream",
            "tools": "/tools",
            "health": "/health",
            "test_connection": "/test-connection",
        },
    }))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "api_key_valid": state.config.validate_api_key(),
        "threads": state.agent.checkpointer().len().await,
    }))
}

/// GET /tools - Registered tools as offered to the model
async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.agent.registry().list_openai_tools();
    Json(json!({
        "count": tools.len(),
        "tools": tools,
    }))
}

/// GET /test-connection - Test chat model connectivity
async fn test_connection(State(state): State<AppState>) -> impl IntoResponse {
    match state.client.ping().await {
        Ok(response_id) => Json(json!({
            "status": "success",
            "message": format!("Successfully connected to {} API", state.client.provider_name()),
            "provider": state.client.provider_name(),
            "model_used": state.client.chat_model(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "response_id": response_id,
        })),
        Err(e) => {
            error!("API connectivity test failed: {}", e);
            Json(json!({
                "status": "failed",
                "error_type": "API Error",
                "message": e.to_string(),
                "provider": state.client.provider_name(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "suggestions": [
                    "Check your API key is valid",
                    "Verify your API key has the necessary permissions",
                    "Check if you have reached rate limits",
                ],
            }))
        }
    }
}
