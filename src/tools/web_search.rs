//! `google_search`: Google Custom Search with a mock fallback

use crate::core::constants::GOOGLE_SEARCH_URL;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The API returns at most ten items per request
const MAX_RESULTS: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Clone)]
pub struct WebSearch {
    http: reqwest::Client,
    api_key: Option<String>,
    engine_id: Option<String>,
    endpoint: String,
}

impl WebSearch {
    pub fn new(api_key: Option<String>, engine_id: Option<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(SEARCH_TIMEOUT).build()?,
            api_key,
            engine_id,
            endpoint: GOOGLE_SEARCH_URL.to_string(),
        })
    }

    /// Point at a different Custom Search compatible endpoint
    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.engine_id.is_some()
    }

    /// Search the web. Failures are reported inside the returned payload.
    pub async fn search(&self, query: &str, num_results: usize) -> Value {
        let (Some(api_key), Some(engine_id)) = (&self.api_key, &self.engine_id) else {
            debug!("Google search not configured, serving mock results");
            return mock_results(query);
        };

        let num = num_results.min(MAX_RESULTS).to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("key", api_key.as_str()),
                ("cx", engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("hl", "ko"),
                ("gl", "kr"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("Google search request failed: {}", e);
                return json!({
                    "success": false,
                    "error": format!("Search API error: {}", e),
                    "query": query,
                });
            }
        };

        let body: SearchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Google search returned an unreadable body: {}", e);
                return json!({
                    "success": false,
                    "error": format!("Unexpected error: {}", e),
                    "query": query,
                });
            }
        };

        if body.items.is_empty() {
            return json!({
                "success": false,
                "message": "검색 결과가 없습니다.",
                "query": query,
            });
        }

        let results: Vec<Value> = body
            .items
            .into_iter()
            .take(num_results)
            .map(|item| json!({"title": item.title, "link": item.link, "snippet": item.snippet}))
            .collect();

        json!({
            "success": true,
            "query": query,
            "total_results": results.len(),
            "results": results,
        })
    }
}

fn mock_results(query: &str) -> Value {
    json!({
        "success": true,
        "query": query,
        "results": [
            {
                "title": format!("Search result for '{}' - Example 1", query),
                "link": "https://example.com/1",
                "snippet": "This is a mock search result. Set GOOGLE_API_KEY and GOOGLE_SEARCH_ENGINE_ID in .env to use real Google Search.",
            },
            {
                "title": format!("Search result for '{}' - Example 2", query),
                "link": "https://example.com/2",
                "snippet": "Mock data is being used. Real search requires Google API key.",
            }
        ],
        "note": "⚠️ Mock data - Set GOOGLE_API_KEY and GOOGLE_SEARCH_ENGINE_ID in .env for real search",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<HashMap<String, String>>>;

    async fn spawn_search_api(status: StatusCode, items: Value) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let seen = captured.clone();
        let app = Router::new().route(
            "/customsearch/v1",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let items = items.clone();
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = params;
                    (status, Json(json!({"items": items})))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/customsearch/v1", addr), captured)
    }

    fn configured(endpoint: String) -> WebSearch {
        WebSearch::new(Some("key".into()), Some("cx".into()))
            .unwrap()
            .with_endpoint(endpoint)
    }

    #[tokio::test]
    async fn test_mock_without_credentials() {
        let search = WebSearch::new(None, Some("cx".into())).unwrap();
        assert!(!search.is_configured());
        let value = search.search("LangGraph tutorial", 3).await;
        assert_eq!(value["success"], true);
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
        assert!(value["note"].as_str().unwrap().contains("Mock data"));
        assert_eq!(
            value["results"][0]["title"],
            "Search result for 'LangGraph tutorial' - Example 1"
        );
    }

    #[tokio::test]
    async fn test_results_are_truncated() {
        let items = json!([
            {"title": "a", "link": "https://a", "snippet": "sa"},
            {"title": "b", "link": "https://b", "snippet": "sb"},
            {"title": "c", "link": "https://c"}
        ]);
        let (endpoint, captured) = spawn_search_api(StatusCode::OK, items).await;
        let value = configured(endpoint).search("rust", 2).await;

        let params = captured.lock().unwrap().clone();
        assert_eq!(params["q"], "rust");
        assert_eq!(params["num"], "2");
        assert_eq!(params["hl"], "ko");
        assert_eq!(params["gl"], "kr");
        assert_eq!(params["cx"], "cx");

        assert_eq!(value["success"], true);
        assert_eq!(value["total_results"], 2);
        assert_eq!(value["results"][1]["link"], "https://b");
    }

    #[tokio::test]
    async fn test_no_items() {
        let (endpoint, captured) = spawn_search_api(StatusCode::OK, json!([])).await;
        let value = configured(endpoint).search("nothing", 25).await;
        assert_eq!(captured.lock().unwrap()["num"], "10");
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "검색 결과가 없습니다.");
    }

    #[tokio::test]
    async fn test_http_error() {
        let (endpoint, _) = spawn_search_api(StatusCode::FORBIDDEN, json!([])).await;
        let value = configured(endpoint).search("q", 5).await;
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().starts_with("Search API error:"));
    }
}
