//! Building the `documents` collection from the data directory

use crate::core::client::ModelClient;
use crate::core::constants::collection;
use crate::rag::loader::{find_documents, load_document};
use crate::rag::splitter::{build_text_splitter, chunk_document};
use crate::store::{Record, VectorStore};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub data_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_created: usize,
    pub storage_path: Option<PathBuf>,
}

/// Rebuild the document collection from scratch
///
/// Every chunk is embedded before the store is touched. The old collection
/// is swapped for the new records in one transaction, so a failed run leaves
/// the previous index in place.
pub async fn build_index(
    client: &ModelClient,
    store: &Arc<VectorStore>,
    options: &IndexOptions,
) -> Result<IndexStats> {
    let files = find_documents(&options.data_dir)?;
    if files.is_empty() {
        bail!("no documents found in {}", options.data_dir.display());
    }
    info!(
        "📁 Found {} documents in {}",
        files.len(),
        options.data_dir.display()
    );

    let splitter = build_text_splitter(options.chunk_size, options.chunk_overlap);
    let mut chunks = Vec::new();
    let mut processed = 0;
    let mut failed = 0;

    for path in &files {
        let text = match load_document(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                failed += 1;
                continue;
            }
        };
        let doc_chunks = chunk_document(&text, &path.to_string_lossy(), &splitter);
        info!(
            "Processed {} ({} chars, {} chunks)",
            path.display(),
            text.chars().count(),
            doc_chunks.len()
        );
        chunks.extend(doc_chunks);
        processed += 1;
    }

    info!("🔄 Embedding {} chunks", chunks.len());
    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(options.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = client
            .embed_texts(&texts)
            .await
            .context("Failed to embed document chunks")?;
        records.extend(batch.iter().zip(embeddings).map(|(chunk, embedding)| Record {
            id: chunk.id.clone(),
            embedding,
            document: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        }));
    }

    let (_, added) = store.replace_collection(collection::DOCUMENTS, &records)?;
    info!("💾 Stored {} chunks in '{}'", added, collection::DOCUMENTS);

    Ok(IndexStats {
        files_processed: processed,
        files_failed: failed,
        chunks_created: added,
        storage_path: store.path().map(|p| p.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedProvider;

    fn options(dir: &std::path::Path) -> IndexOptions {
        IndexOptions {
            data_dir: dir.to_path_buf(),
            chunk_size: 60,
            chunk_overlap: 10,
            batch_size: 2,
        }
    }

    #[tokio::test]
    async fn test_build_index_replaces_collection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("react.md"),
            "ReAct alternates thought and action.\n\nObservations feed the next thought.\n\nThe loop ends with a final answer.",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("rag.txt"),
            "RAG retrieves passages before answering.",
        )
        .unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let client = ModelClient::new(provider.clone(), "chat", "embed");
        let store = VectorStore::open_in_memory().unwrap();

        let stale = store.get_or_create_collection(collection::DOCUMENTS).unwrap();
        stale
            .add(vec![Record {
                id: "old::chunk_0".into(),
                embedding: vec![1.0],
                document: "stale".into(),
                metadata: Default::default(),
            }])
            .unwrap();

        let stats = build_index(&client, &store, &options(dir.path())).await.unwrap();
        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.files_failed, 0);
        assert!(stats.chunks_created >= 3);
        assert!(provider.embedding_calls() >= 2);

        let documents = store.get_collection(collection::DOCUMENTS).unwrap();
        assert_eq!(documents.count().unwrap(), stats.chunks_created);

        let query = ScriptedProvider::embed("RAG retrieves passages before answering.");
        let hit = &documents.query(&query, 1, None).unwrap()[0];
        assert_eq!(hit.id, "rag.txt::chunk_0");
    }

    #[tokio::test]
    async fn test_empty_data_dir_keeps_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let client = ModelClient::new(Arc::new(ScriptedProvider::new()), "chat", "embed");
        let store = VectorStore::open_in_memory().unwrap();
        store.get_or_create_collection(collection::DOCUMENTS).unwrap();

        assert!(build_index(&client, &store, &options(dir.path())).await.is_err());
        assert!(store.get_collection(collection::DOCUMENTS).is_ok());
    }

    #[tokio::test]
    async fn test_failed_embedding_keeps_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("react.md"),
            "ReAct alternates thought and action.",
        )
        .unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let client = ModelClient::new(provider.clone(), "chat", "embed");
        let store = VectorStore::open_in_memory().unwrap();

        let before = build_index(&client, &store, &options(dir.path())).await.unwrap();
        assert_eq!(before.chunks_created, 1);

        provider.fail_embeddings();
        let err = build_index(&client, &store, &options(dir.path()))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to embed document chunks"));

        let documents = store.get_collection(collection::DOCUMENTS).unwrap();
        assert_eq!(documents.count().unwrap(), 1);
    }
}
