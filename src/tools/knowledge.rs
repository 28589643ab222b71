//! Knowledge-base search collaborator.
//!
//! Product questions are answered from an Azure AI Search index holding
//! chunked documents. Each hit is rendered as `[<chunk_id>]: <chunk>`
//! followed by a `-----` separator line.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{ToolError, ToolResult};
use crate::config::SearchSettings;

/// REST API version used for search requests.
pub const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";

/// Hits returned per query.
const TOP_RESULTS: usize = 5;

/// Nearest neighbours considered by the vector half of the hybrid query.
const VECTOR_NEIGHBOURS: usize = 50;

/// Index field holding chunk embeddings.
const VECTOR_FIELD: &str = "text_vector";

const SEMANTIC_CONFIGURATION: &str = "default";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Free-text search over the knowledge base.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn search(&self, query: &str) -> ToolResult<String>;
}

/// Hybrid semantic and vector search against an Azure AI Search index.
pub struct AzureSearchClient {
    http: reqwest::Client,
    endpoint: String,
    index: String,
    api_key: Zeroizing<String>,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    chunk_id: String,
    #[serde(default)]
    chunk: String,
}

impl AzureSearchClient {
    pub fn new(settings: &SearchSettings) -> ToolResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            index: settings.index.clone(),
            api_key: settings.api_key.clone(),
            api_version: settings
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_SEARCH_API_VERSION.to_string()),
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint, self.index, self.api_version
        )
    }
}

#[async_trait]
impl KnowledgeSearch for AzureSearchClient {
    async fn search(&self, query: &str) -> ToolResult<String> {
        let body = json!({
            "search": query,
            "queryType": "semantic",
            "semanticConfiguration": SEMANTIC_CONFIGURATION,
            "top": TOP_RESULTS,
            "vectorQueries": [{
                "kind": "text",
                "text": query,
                "k": VECTOR_NEIGHBOURS,
                "fields": VECTOR_FIELD,
            }],
            "select": "chunk_id,chunk",
        });

        debug!("Searching index {} for '{}'", self.index, query);
        let response = self
            .http
            .post(self.search_url())
            .header("api-key", self.api_key.as_str())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ToolError::SearchFailed(format!("HTTP {status}: {detail}")));
        }

        let results: SearchResponse = response.json().await?;
        debug!("Search returned {} hits", results.value.len());
        Ok(format_hits(&results.value))
    }
}

fn format_hits(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for hit in hits {
        out.push_str(&format!("[{}]: {}\n-----\n", hit.chunk_id, hit.chunk));
    }
    out
}

/// Used when no search service is configured; answers with an explanation.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredSearch;

#[async_trait]
impl KnowledgeSearch for UnconfiguredSearch {
    async fn search(&self, query: &str) -> ToolResult<String> {
        warn!("Knowledge search requested but no search service is configured");
        Ok(format!(
            "Unable to search for '{query}' - search service not configured."
        ))
    }
}

/// Search backend for the given settings, falling back to [`UnconfiguredSearch`].
pub fn knowledge_search(settings: Option<&SearchSettings>) -> Arc<dyn KnowledgeSearch> {
    let Some(settings) = settings else {
        return Arc::new(UnconfiguredSearch);
    };
    match AzureSearchClient::new(settings) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("Failed to create search client, search disabled: {}", e);
            Arc::new(UnconfiguredSearch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hits() {
        let hits = vec![
            SearchHit {
                chunk_id: "doc1_0".to_string(),
                chunk: "Gold card earns 2% cashback.".to_string(),
            },
            SearchHit {
                chunk_id: "doc2_3".to_string(),
                chunk: "No annual fee.".to_string(),
            },
        ];
        assert_eq!(
            format_hits(&hits),
            "[doc1_0]: Gold card earns 2% cashback.\n-----\n[doc2_3]: No annual fee.\n-----\n"
        );
        assert_eq!(format_hits(&[]), "");
    }

    #[tokio::test]
    async fn test_unconfigured_search_explains() {
        let result = UnconfiguredSearch.search("card benefits").await.unwrap();
        assert_eq!(
            result,
            "Unable to search for 'card benefits' - search service not configured."
        );
    }

    #[test]
    fn test_search_url() {
        let settings = SearchSettings {
            endpoint: "https://search.example.net/".to_string(),
            index: "products".to_string(),
            api_key: Zeroizing::new("key".to_string()),
            api_version: None,
        };
        let client = AzureSearchClient::new(&settings).unwrap();
        assert_eq!(
            client.search_url(),
            "https://search.example.net/indexes/products/docs/search?api-version=2024-07-01"
        );
    }
}
