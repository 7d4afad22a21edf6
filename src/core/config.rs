//! Application configuration management
//!
//! Configuration is assembled from three layers: built-in defaults, an
//! optional TOML file and environment variables (a `.env` file is loaded
//! first). Later layers win. All values are validated at startup.

use crate::core::constants::{DEFAULT_CHAT_MODEL, DEFAULT_EMBED_MODEL, DEFAULT_OPENAI_BASE_URL};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 90;

/// Default server port (the port the chat UI has always used)
const DEFAULT_PORT: u16 = 7860;

/// Default chunk size in characters
const DEFAULT_CHUNK_SIZE: usize = 700;

/// Default chunk overlap in characters
const DEFAULT_CHUNK_OVERLAP: usize = 120;

/// Default number of texts per embedding request
const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Default ReAct loop cap
const DEFAULT_MAX_LOOPS: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAISection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for OpenAISection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embed_model: default_embed_model(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GoogleSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub search_engine_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_chroma_dir")]
    pub chroma_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            chroma_dir: default_chroma_dir(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default = "default_true")]
    pub rerank: bool,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embed_batch_size: default_embed_batch_size(),
            rerank: true,
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_true")]
    pub auto_save: bool,
    #[serde(default = "default_recent_n")]
    pub recent_n: usize,
    #[serde(default = "default_min_importance")]
    pub min_importance: u8,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            auto_save: true,
            recent_n: default_recent_n(),
            min_importance: default_min_importance(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_embed_model() -> String {
    DEFAULT_EMBED_MODEL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chroma_dir() -> PathBuf {
    PathBuf::from("chroma_db")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_embed_batch_size() -> usize {
    DEFAULT_EMBED_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

fn default_candidate_multiplier() -> usize {
    2
}

fn default_max_loops() -> u32 {
    DEFAULT_MAX_LOOPS
}

fn default_recent_n() -> usize {
    6
}

fn default_min_importance() -> u8 {
    3
}

/// Raw shape of `config.toml`. Every section is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub openai: OpenAISection,
    #[serde(default)]
    pub google: GoogleSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub rag: RagSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub memory: MemorySection,
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI API key (empty when not configured)
    pub openai_api_key: String,

    /// OpenAI-compatible API base URL
    pub openai_base_url: String,

    /// Model used by the agent, the memory extractor and grounded answers
    pub chat_model: String,

    /// Model used for document and memory embeddings
    pub embed_model: String,

    /// Request timeout in seconds
    pub request_timeout: u64,

    /// Google Custom Search credentials; mock results are served when unset
    pub google_api_key: Option<String>,
    pub google_search_engine_id: Option<String>,

    pub host: String,
    pub port: u16,
    pub log_level: String,

    /// Directory holding the persistent vector collections
    pub chroma_dir: PathBuf,

    /// Directory scanned for class materials
    pub data_dir: PathBuf,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,

    /// Whether search results get a second reranking pass
    pub rerank: bool,

    /// Stage-one candidates retrieved per requested result
    pub candidate_multiplier: usize,

    /// ReAct loop cap
    pub max_loops: u32,

    /// Run the memory extractor after each chat turn
    pub auto_save: bool,
    pub memory_recent_n: usize,
    pub memory_min_importance: u8,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default())
    }
}

impl Config {
    fn from_toml(config: TomlConfig) -> Self {
        Config {
            openai_api_key: config.openai.api_key.unwrap_or_default(),
            openai_base_url: config.openai.base_url,
            chat_model: config.openai.chat_model,
            embed_model: config.openai.embed_model,
            request_timeout: config.openai.request_timeout,
            google_api_key: non_blank(config.google.api_key),
            google_search_engine_id: non_blank(config.google.search_engine_id),
            host: config.server.host,
            port: config.server.port,
            log_level: config.server.log_level,
            chroma_dir: config.storage.chroma_dir,
            data_dir: config.storage.data_dir,
            chunk_size: config.rag.chunk_size,
            chunk_overlap: config.rag.chunk_overlap,
            embed_batch_size: config.rag.embed_batch_size,
            rerank: config.rag.rerank,
            candidate_multiplier: config.rag.candidate_multiplier,
            max_loops: config.agent.max_loops,
            auto_save: config.memory.auto_save,
            memory_recent_n: config.memory.recent_n,
            memory_min_importance: config.memory.min_importance,
        }
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if the
    /// resulting values are invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read configuration file")?;
        let config: TomlConfig =
            toml::from_str(&content).context("Failed to parse TOML configuration")?;
        let config = Self::from_toml(config);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `.env`, the optional config file and the
    /// process environment
    ///
    /// The config file path comes from `CONFIG_PATH` (default `config.toml`);
    /// a missing file is not an error.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = if Path::new(&config_path).exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read configuration file")?;
            let parsed: TomlConfig =
                toml::from_str(&content).context("Failed to parse TOML configuration")?;
            Self::from_toml(parsed)
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides
    ///
    /// `lookup` maps a variable name to its value. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai_api_key = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Some(v) = get("CHAT_MODEL") {
            self.chat_model = v;
        }
        if let Some(v) = get("EMBED_MODEL") {
            self.embed_model = v;
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.google_api_key = Some(v);
        }
        if let Some(v) = get("GOOGLE_SEARCH_ENGINE_ID") {
            self.google_search_engine_id = Some(v);
        }
        if let Some(v) = get("HOST") {
            self.host = v;
        }
        if let Some(v) = get("PORT") {
            self.port = v.trim().parse().context("PORT must be a valid port number")?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("REQUEST_TIMEOUT") {
            self.request_timeout = v
                .trim()
                .parse()
                .context("REQUEST_TIMEOUT must be a number of seconds")?;
        }
        if let Some(v) = get("CHROMA_DIR") {
            self.chroma_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("rag.chunk_size must be greater than zero");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.embed_batch_size == 0 {
            bail!("rag.embed_batch_size must be greater than zero");
        }
        if self.candidate_multiplier == 0 {
            bail!("rag.candidate_multiplier must be at least 1");
        }
        if self.max_loops == 0 {
            bail!("agent.max_loops must be at least 1");
        }
        if !(1..=5).contains(&self.memory_min_importance) {
            bail!("memory.min_importance must be between 1 and 5");
        }
        Ok(())
    }

    /// Whether an OpenAI API key is configured
    pub fn validate_api_key(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }

    /// Whether real Google search is configured
    pub fn google_search_configured(&self) -> bool {
        self.google_api_key.is_some() && self.google_search_engine_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [openai]
            api_key = "sk-test123"
            chat_model = "gpt-4o"

            [server]
            port = 9000

            [storage]
            chroma_dir = "/tmp/chroma"

            [rag]
            chunk_size = 500
            chunk_overlap = 50
            rerank = false

            [memory]
            recent_n = 4
        "#
        )
        .unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.embed_model, "text-embedding-3-small");
        assert_eq!(config.port, 7860);
        assert_eq!(config.chunk_size, 700);
        assert_eq!(config.chunk_overlap, 120);
        assert_eq!(config.max_loops, 10);
        assert_eq!(config.memory_min_importance, 3);
        assert_eq!(config.chroma_dir, PathBuf::from("chroma_db"));
        assert!(config.rerank);
        assert!(!config.validate_api_key());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config() {
        let file = create_test_config();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.openai_api_key, "sk-test123");
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.embed_model, "text-embedding-3-small");
        assert_eq!(config.port, 9000);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.memory_recent_n, 4);
        assert!(!config.rerank);
        assert!(config.validate_api_key());
    }

    #[test]
    fn test_env_overrides_win() {
        let file = create_test_config();
        let mut config = Config::from_file(file.path()).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-from-env"),
            ("EMBED_MODEL", "text-embedding-3-large"),
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_SEARCH_ENGINE_ID", "cx"),
            ("PORT", "8080"),
            ("CHAT_MODEL", "  "),
        ]);
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.openai_api_key, "sk-from-env");
        assert_eq!(config.embed_model, "text-embedding-3-large");
        assert_eq!(config.port, 8080);
        // blank values are ignored
        assert_eq!(config.chat_model, "gpt-4o");
        assert!(config.google_search_configured());
    }

    #[test]
    fn test_blank_google_keys_mean_mock_search() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[google]\napi_key = \"\"\nsearch_engine_id = \"cx\"\n").unwrap();
        file.flush().unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.google_api_key, None);
        assert_eq!(config.google_search_engine_id.as_deref(), Some("cx"));
        assert!(!config.google_search_configured());
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[rag]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
        file.flush().unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }
}
