//! `search_documents`: two-stage retrieval over the class materials
//!
//! Stage one pulls `n * candidate_multiplier` chunks by embedding
//! similarity. Stage two reranks them against the query text and keeps the
//! best `n`.

use crate::core::client::ModelClient;
use crate::core::constants::collection;
use crate::rag::rerank::{Reranker, rerank};
use crate::store::{VectorStore, round3};
use crate::tools::context::ToolContext;
use crate::tools::definitions::ToolError;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retrieval settings shared by the tool and the `query` command
#[derive(Clone)]
pub struct SearchSettings {
    /// `None` disables stage two
    pub reranker: Option<Arc<dyn Reranker>>,
    pub candidate_multiplier: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub rank: usize,
    pub content: String,
    /// File name of the source document
    pub source: String,
    pub chunk_id: Value,
    pub embedding_similarity: f64,
    pub similarity: f64,
    pub rerank_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub results: Vec<SearchResult>,
    pub reranked: bool,
}

fn basename(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string())
}

/// Retrieve the `n_results` most relevant chunks for `query`
pub async fn retrieve(
    client: &ModelClient,
    store: &Arc<VectorStore>,
    settings: &SearchSettings,
    query: &str,
    n_results: usize,
) -> Result<Retrieval, ToolError> {
    let documents = store.get_collection(collection::DOCUMENTS)?;
    let embedding = client.embed_one(query).await?;

    let candidates = match settings.reranker {
        Some(_) => n_results.saturating_mul(settings.candidate_multiplier.max(1)),
        None => n_results,
    };
    let hits = documents.query(&embedding, candidates, None)?;
    debug!(
        "Stage one returned {} candidates from {} for '{}'",
        hits.len(),
        documents.name(),
        query
    );

    let ordered: Vec<(usize, Option<f64>)> = match &settings.reranker {
        Some(reranker) if !hits.is_empty() => {
            debug!("Reranking with {}", reranker.name());
            let texts: Vec<&str> = hits.iter().map(|h| h.document.as_str()).collect();
            rerank(reranker.as_ref(), query, &texts, n_results)
                .into_iter()
                .map(|(index, score)| (index, Some(round3(score as f64))))
                .collect()
        }
        _ => (0..hits.len().min(n_results)).map(|i| (i, None)).collect(),
    };

    let reranked = settings.reranker.is_some();
    let results = ordered
        .into_iter()
        .enumerate()
        .map(|(position, (index, rerank_score))| {
            let hit = &hits[index];
            let source = hit
                .metadata
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let similarity = hit.similarity();
            debug!("#{} {} (similarity {})", position + 1, hit.id, similarity);
            SearchResult {
                rank: position + 1,
                content: hit.document.clone(),
                source: basename(source),
                chunk_id: hit.metadata.get("chunk_id").cloned().unwrap_or(json!(0)),
                embedding_similarity: similarity,
                similarity,
                rerank_score,
            }
        })
        .collect();

    Ok(Retrieval { results, reranked })
}

/// `search_documents` tool output
pub async fn search_documents(ctx: &ToolContext, query: &str, n_results: usize) -> Value {
    match retrieve(&ctx.client, &ctx.store, &ctx.search, query, n_results).await {
        Ok(retrieval) if retrieval.results.is_empty() => json!({
            "success": false,
            "message": "검색 결과가 없습니다.",
            "results": [],
        }),
        Ok(retrieval) => json!({
            "success": true,
            "query": query,
            "count": retrieval.results.len(),
            "reranked": retrieval.reranked,
            "results": retrieval.results,
        }),
        Err(e) => {
            warn!("search_documents failed: {}", e);
            json!({
                "success": false,
                "error": e.to_string(),
                "message": "검색 중 오류가 발생했습니다.",
            })
        }
    }
}
