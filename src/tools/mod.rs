//! Tools the agent can call
//!
//! `definitions` holds the typed inputs and specs, `registry` dispatches
//! calls, and the remaining modules implement the tools backed by storage
//! or the network.

pub mod context;
pub mod definitions;
pub mod memory_tool;
pub mod rag_tool;
pub mod registry;
pub mod web_search;

pub use context::ToolContext;
pub use registry::{ToolRegistry, register_default_tools};
