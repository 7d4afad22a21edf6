//! ReAct agent
//!
//! START → llm → (should_continue) → tools → llm … → END, with the state of
//! each thread checkpointed in memory between invocations.

use crate::core::client::ModelClient;
use crate::core::constants::{MAX_THREADS, PREVIEW_CHARS, node};
use crate::core::provider::ProviderError;
use crate::graph::nodes::{Route, llm_node, preview, should_continue, tool_node};
use crate::graph::state::AgentState;
use crate::models::openai::{OpenAIMessage, OpenAITool, OpenAIToolCall};
use crate::tools::ToolRegistry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Observation produced by one tool call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolObservation {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
}

/// Progress of a streamed run, one event per node execution
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum AgentEvent {
    Llm {
        content: String,
        tool_calls: Vec<OpenAIToolCall>,
    },
    Tools {
        results: Vec<ToolObservation>,
    },
    Done {
        answer: String,
    },
    Error {
        message: String,
    },
}

/// A tool call made during a run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Step {
    pub tool: String,
    pub arguments: String,
    pub observation: String,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub answer: String,
    pub steps: Vec<Step>,
    pub loops: u32,
}

struct Checkpoint {
    state: Arc<Mutex<AgentState>>,
    last_used: u64,
}

#[derive(Default)]
struct Threads {
    slots: HashMap<String, Checkpoint>,
    tick: u64,
}

/// Per-thread state kept between invocations
///
/// Each thread has its own lock, held for a whole invocation, so turns on
/// one thread run one after another. Beyond `capacity` threads the least
/// recently used idle one is dropped.
pub struct MemorySaver {
    threads: Mutex<Threads>,
    capacity: usize,
}

impl Default for MemorySaver {
    fn default() -> Self {
        Self::with_capacity(MAX_THREADS)
    }
}

impl MemorySaver {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            threads: Mutex::new(Threads::default()),
            capacity: capacity.max(1),
        }
    }

    /// The state slot of `thread_id`, created empty when missing
    async fn slot(&self, thread_id: &str) -> Arc<Mutex<AgentState>> {
        let mut threads = self.threads.lock().await;
        threads.tick += 1;
        let tick = threads.tick;

        if let Some(checkpoint) = threads.slots.get_mut(thread_id) {
            checkpoint.last_used = tick;
            return Arc::clone(&checkpoint.state);
        }

        if threads.slots.len() >= self.capacity {
            let idle = threads
                .slots
                .iter()
                .filter(|(_, c)| Arc::strong_count(&c.state) == 1)
                .min_by_key(|(_, c)| c.last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = idle {
                debug!("Evicting checkpoint of thread {}", id);
                threads.slots.remove(&id);
            }
        }

        let state = Arc::new(Mutex::new(AgentState::default()));
        threads.slots.insert(
            thread_id.to_string(),
            Checkpoint {
                state: Arc::clone(&state),
                last_used: tick,
            },
        );
        state
    }

    #[cfg(test)]
    pub async fn get(&self, thread_id: &str) -> Option<AgentState> {
        let slot = self
            .threads
            .lock()
            .await
            .slots
            .get(thread_id)
            .map(|c| Arc::clone(&c.state))?;
        let state = slot.lock().await.clone();
        Some(state)
    }

    pub async fn len(&self) -> usize {
        self.threads.lock().await.slots.len()
    }
}

pub struct ReactAgent {
    client: ModelClient,
    registry: Arc<ToolRegistry>,
    tools: Vec<OpenAITool>,
    checkpointer: MemorySaver,
    max_loops: u32,
}

impl ReactAgent {
    pub fn new(client: ModelClient, registry: Arc<ToolRegistry>, max_loops: u32) -> Self {
        let tools = registry.list_openai_tools();
        info!(
            "Graph nodes {:?}, tools: {}",
            Self::node_names(),
            registry.tool_names().join(", ")
        );
        Self {
            client,
            registry,
            tools,
            checkpointer: MemorySaver::default(),
            max_loops,
        }
    }

    pub fn node_names() -> [&'static str; 2] {
        [node::LLM, node::TOOLS]
    }

    pub fn checkpointer(&self) -> &MemorySaver {
        &self.checkpointer
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the loop and return the final answer
    pub async fn run_agent(&self, input: &str, thread_id: &str) -> Result<String, AgentError> {
        Ok(self.invoke(input, thread_id).await?.answer)
    }

    /// Run the loop and return the answer with the tool calls made
    pub async fn invoke(&self, input: &str, thread_id: &str) -> Result<RunOutcome, AgentError> {
        self.execute(input, thread_id, None).await
    }

    /// Run the loop on a background task, streaming node events
    ///
    /// The stream ends with `Done` or `Error`.
    pub fn run_agent_stream(
        self: &Arc<Self>,
        input: &str,
        thread_id: &str,
    ) -> ReceiverStream<AgentEvent> {
        let (tx, rx) = mpsc::channel(16);
        let agent = Arc::clone(self);
        let input = input.to_string();
        let thread_id = thread_id.to_string();

        tokio::spawn(async move {
            let last = match agent.execute(&input, &thread_id, Some(&tx)).await {
                Ok(outcome) => AgentEvent::Done {
                    answer: outcome.answer,
                },
                Err(e) => AgentEvent::Error {
                    message: e.to_string(),
                },
            };
            let _ = tx.send(last).await;
        });

        ReceiverStream::new(rx)
    }

    async fn execute(
        &self,
        input: &str,
        thread_id: &str,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        info!("🚀 ReAct agent start (thread {})", thread_id);
        info!("📝 User: {}", input);

        let slot = self.checkpointer.slot(thread_id).await;
        let mut state = slot.lock().await;
        state.messages.push(OpenAIMessage::user(input));
        state.loop_count = 0;

        let mut steps = Vec::new();
        self.run_loop(&mut *state, &mut steps, events).await?;

        let answer = state
            .last_message()
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        info!("✅ ReAct agent done after {} loops", state.loop_count);

        Ok(RunOutcome {
            answer,
            steps,
            loops: state.loop_count,
        })
    }

    async fn run_loop(
        &self,
        state: &mut AgentState,
        steps: &mut Vec<Step>,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<(), AgentError> {
        loop {
            let update = llm_node(state, &self.client, &self.tools).await?;
            state.apply(update);

            if let (Some(tx), Some(last)) = (events, state.last_message()) {
                let _ = tx
                    .send(AgentEvent::Llm {
                        content: last.text().to_string(),
                        tool_calls: last.calls().to_vec(),
                    })
                    .await;
            }

            if should_continue(state, self.max_loops) == Route::End {
                break;
            }

            let calls = state
                .last_message()
                .map(|m| m.calls().to_vec())
                .unwrap_or_default();
            let update = tool_node(state, &self.registry).await;

            let observations: Vec<ToolObservation> = update
                .messages
                .iter()
                .map(|m| ToolObservation {
                    tool_call_id: m.tool_call_id.clone().unwrap_or_default(),
                    name: m.name.clone().unwrap_or_default(),
                    content: m.text().to_string(),
                })
                .collect();

            for (call, observation) in calls.iter().zip(&observations) {
                steps.push(Step {
                    tool: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                    observation: preview(&observation.content, PREVIEW_CHARS),
                });
            }
            if let Some(tx) = events {
                let _ = tx
                    .send(AgentEvent::Tools {
                        results: observations,
                    })
                    .await;
            }

            state.apply(update);
        }

        // A run cut off at the loop cap leaves calls without observations;
        // drop them so the thread can be continued.
        if let Some(last) = state.messages.last_mut() {
            if last.has_tool_calls() {
                warn!("Dropping unanswered tool calls at the loop cap");
                last.tool_calls = None;
            }
        }
        Ok(())
    }
}
