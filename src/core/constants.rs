//! Constants shared across the agent
//!
//! Message roles, tool names, collection names and the defaults that the
//! configuration layer falls back to.

/// Message role constants
pub mod role {
    /// User role identifier
    pub const USER: &str = "user";

    /// Assistant role identifier
    pub const ASSISTANT: &str = "assistant";

    /// System role identifier
    pub const SYSTEM: &str = "system";

    /// Tool role identifier
    pub const TOOL: &str = "tool";
}

/// Tool type constants
pub mod tool {
    /// Function tool type
    pub const FUNCTION: &str = "function";

    pub const SEARCH_DOCUMENTS: &str = "search_documents";
    pub const READ_MEMORY: &str = "read_memory";
    pub const WRITE_MEMORY: &str = "write_memory";
    pub const CALCULATOR: &str = "calculator";
    pub const GET_TIME: &str = "get_time";
    pub const GOOGLE_SEARCH: &str = "google_search";
}

/// Persistent collection names
pub mod collection {
    /// Chunks of the class materials
    pub const DOCUMENTS: &str = "documents";

    /// Long-term memories
    pub const MEMORY: &str = "memory_collection";
}

/// Memory type constants
pub mod memory {
    pub const PROFILE: &str = "profile";
    pub const EPISODIC: &str = "episodic";
    pub const KNOWLEDGE: &str = "knowledge";
}

/// Graph node names
pub mod node {
    pub const LLM: &str = "llm";
    pub const TOOLS: &str = "tools";
}

/// Server-sent event names emitted by the chat stream
pub mod event {
    pub const THINKING: &str = "thinking";
    pub const TOOL_USE: &str = "tool_use";
    pub const OBSERVATION: &str = "observation";
    pub const ANSWER: &str = "answer";
    pub const ERROR: &str = "error";
}

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default embedding model
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// Default OpenAI API base URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Google Custom Search endpoint
pub const GOOGLE_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Number of class PDFs the setup check expects to find
pub const EXPECTED_PDF_COUNT: usize = 9;

/// Maximum characters shown when logging a tool result preview
pub const PREVIEW_CHARS: usize = 200;

/// Threads kept by the in-memory checkpointer before idle ones are evicted
pub const MAX_THREADS: usize = 1024;
