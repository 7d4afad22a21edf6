//! Long-term memory tools: `read_memory` and `write_memory`

use crate::core::client::ModelClient;
use crate::core::constants::collection;
use crate::store::{Collection, Record, StoreError, VectorStore, Where};
use crate::tools::definitions::{MemoryFilter, MemoryType, ToolError};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

/// A memory as returned by `read_memory`
#[derive(Debug, Clone, Serialize)]
pub struct MemoryItem {
    pub content: String,
    pub memory_type: String,
    pub importance: i64,
    pub timestamp: String,
    pub tags: Vec<String>,
    pub similarity: f64,
}

/// Reads and writes the memory collection
#[derive(Clone)]
pub struct MemoryTool {
    client: ModelClient,
    store: Arc<VectorStore>,
}

/// `memory_<timestamp>_<hash % 10000>`
pub fn memory_id(timestamp: &str, content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("memory_{}_{}", timestamp, hasher.finish() % 10000)
}

fn split_tags(tags: &str) -> Vec<String> {
    if tags.is_empty() {
        Vec::new()
    } else {
        tags.split(',').map(str::to_string).collect()
    }
}

impl MemoryTool {
    pub fn new(client: ModelClient, store: Arc<VectorStore>) -> Self {
        Self { client, store }
    }

    fn collection(&self) -> Result<Collection, StoreError> {
        self.store.get_or_create_collection(collection::MEMORY)
    }

    /// Memories closest to `query`, optionally limited to one type
    pub async fn read(
        &self,
        query: &str,
        filter: MemoryFilter,
        top_k: usize,
    ) -> Result<Vec<MemoryItem>, ToolError> {
        let memories = self.collection()?;
        let embedding = self.client.embed_one(query).await?;

        let where_filter: Option<Where> = filter.memory_type().map(|kind| {
            let mut map = Map::new();
            map.insert("memory_type".to_string(), json!(kind.as_str()));
            map
        });

        let hits = memories.query(&embedding, top_k, where_filter.as_ref())?;
        debug!("read_memory '{}' matched {} memories", query, hits.len());

        Ok(hits
            .into_iter()
            .map(|hit| {
                let similarity = hit.similarity();
                let field = |key: &str| hit.metadata.get(key);
                MemoryItem {
                    memory_type: field("memory_type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    importance: field("importance").and_then(Value::as_i64).unwrap_or(0),
                    timestamp: field("timestamp")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    tags: split_tags(field("tags").and_then(Value::as_str).unwrap_or_default()),
                    content: hit.document,
                    similarity,
                }
            })
            .collect())
    }

    /// Store a memory, returning its id
    pub async fn write(
        &self,
        content: &str,
        memory_type: MemoryType,
        importance: u8,
        tags: &[String],
    ) -> Result<String, ToolError> {
        let memories = self.collection()?;
        let embedding = self.client.embed_one(content).await?;

        let timestamp = chrono::Local::now()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let id = memory_id(&timestamp, content);

        let mut metadata = Map::new();
        metadata.insert("memory_type".to_string(), json!(memory_type.as_str()));
        metadata.insert("importance".to_string(), json!(importance));
        metadata.insert("timestamp".to_string(), json!(timestamp));
        metadata.insert("tags".to_string(), json!(tags.join(",")));

        memories.add(vec![Record {
            id: id.clone(),
            embedding,
            document: content.to_string(),
            metadata,
        }])?;
        debug!("Stored {} memory {}", memory_type, id);
        Ok(id)
    }
}

/// `read_memory` tool output
pub async fn read_memory_json(
    memory: &MemoryTool,
    query: &str,
    filter: MemoryFilter,
    top_k: usize,
) -> Value {
    match memory.read(query, filter, top_k).await {
        Ok(items) if items.is_empty() => json!({
            "success": true,
            "message": "저장된 기억이 없습니다.",
            "memories": [],
        }),
        Ok(items) => json!({
            "success": true,
            "query": query,
            "count": items.len(),
            "memories": items,
        }),
        Err(e) => {
            warn!("read_memory failed: {}", e);
            json!({"success": false, "error": e.to_string()})
        }
    }
}

/// `write_memory` tool output
pub async fn write_memory_json(
    memory: &MemoryTool,
    content: &str,
    memory_type: MemoryType,
    importance: u8,
    tags: Vec<String>,
) -> Value {
    match memory.write(content, memory_type, importance, &tags).await {
        Ok(memory_id) => json!({
            "success": true,
            "message": "메모리 저장 완료",
            "memory_id": memory_id,
            "memory_type": memory_type.as_str(),
            "importance": importance,
            "tags": tags,
        }),
        Err(e) => {
            warn!("write_memory failed: {}", e);
            json!({"success": false, "error": e.to_string()})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedProvider;

    fn memory_tool() -> (Arc<ScriptedProvider>, MemoryTool) {
        let provider = Arc::new(ScriptedProvider::new());
        let client = ModelClient::new(provider.clone(), "chat", "embed");
        let store = VectorStore::open_in_memory().unwrap();
        (provider, MemoryTool::new(client, store))
    }

    #[test]
    fn test_memory_id_format() {
        let id = memory_id("2024-11-27T10:00:00.000001", "내 이름은 김철수");
        assert!(id.starts_with("memory_2024-11-27T10:00:00.000001_"));
        let suffix: u64 = id.rsplit('_').next().unwrap().parse().unwrap();
        assert!(suffix < 10000);
        assert_eq!(id, memory_id("2024-11-27T10:00:00.000001", "내 이름은 김철수"));
    }

    #[tokio::test]
    async fn test_empty_memory() {
        let (_, memory) = memory_tool();
        let value = read_memory_json(&memory, "anything", MemoryFilter::All, 5).await;
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "저장된 기억이 없습니다.");
        assert_eq!(value["memories"], json!([]));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_, memory) = memory_tool();
        let tags = vec!["LangGraph".to_string(), "ReAct".to_string()];
        let saved = write_memory_json(
            &memory,
            "user works on a LangGraph project",
            MemoryType::Profile,
            4,
            tags.clone(),
        )
        .await;
        assert_eq!(saved["success"], true);
        assert_eq!(saved["message"], "메모리 저장 완료");
        assert_eq!(saved["memory_type"], "profile");
        assert_eq!(saved["tags"], json!(tags));

        memory
            .write("HNSW builds a layered graph", MemoryType::Knowledge, 3, &[])
            .await
            .unwrap();

        let value = read_memory_json(&memory, "LangGraph project", MemoryFilter::All, 5).await;
        assert_eq!(value["count"], 2);
        let first = &value["memories"][0];
        assert_eq!(first["content"], "user works on a LangGraph project");
        assert_eq!(first["importance"], 4);
        assert_eq!(first["tags"], json!(["LangGraph", "ReAct"]));
        assert!(first["similarity"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_type_filter() {
        let (_, memory) = memory_tool();
        memory.write("likes Rust", MemoryType::Profile, 3, &[]).await.unwrap();
        memory.write("learned BM25", MemoryType::Knowledge, 3, &[]).await.unwrap();

        let items = memory.read("Rust", MemoryFilter::Knowledge, 5).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].memory_type, "knowledge");
        assert!(items[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported() {
        let (provider, memory) = memory_tool();
        provider.fail_embeddings();
        let value =
            write_memory_json(&memory, "x", MemoryType::Episodic, 3, Vec::new()).await;
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().contains("Rate limit"));
    }
}
