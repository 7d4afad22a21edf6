//! Shared handles the tool handlers run against

use crate::core::client::ModelClient;
use crate::core::config::Config;
use crate::rag::rerank::{LexicalReranker, Reranker};
use crate::store::VectorStore;
use crate::tools::memory_tool::MemoryTool;
use crate::tools::rag_tool::SearchSettings;
use crate::tools::web_search::WebSearch;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct ToolContext {
    pub client: ModelClient,
    pub store: Arc<VectorStore>,
    pub search: SearchSettings,
    pub memory: MemoryTool,
    pub web: WebSearch,
}

impl ToolContext {
    pub fn new(
        client: ModelClient,
        store: Arc<VectorStore>,
        search: SearchSettings,
        web: WebSearch,
    ) -> Self {
        Self {
            memory: MemoryTool::new(client.clone(), store.clone()),
            client,
            store,
            search,
            web,
        }
    }

    /// Context wired from the application configuration
    pub fn from_config(
        config: &Config,
        client: ModelClient,
        store: Arc<VectorStore>,
    ) -> Result<Self> {
        let web = WebSearch::new(
            config.google_api_key.clone(),
            config.google_search_engine_id.clone(),
        )
        .context("Failed to build the web search client")?;
        if !web.is_configured() {
            info!("Google search keys not set, google_search returns mock results");
        }

        Ok(Self::new(client, store, search_settings(config), web))
    }
}

/// Retrieval settings from the configuration
pub fn search_settings(config: &Config) -> SearchSettings {
    let reranker: Option<Arc<dyn Reranker>> = if config.rerank {
        Some(Arc::new(LexicalReranker::default()))
    } else {
        None
    };
    SearchSettings {
        reranker,
        candidate_multiplier: config.candidate_multiplier,
    }
}
