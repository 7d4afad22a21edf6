//! ReAct control loop
//!
//! Two nodes, `llm` and `tools`, joined by a conditional edge and a loop cap.

pub mod agent;
pub mod nodes;
pub mod state;

pub use agent::{AgentEvent, ReactAgent};
