//! Elasticsearch Search Index
//!
//! Information Hiding:
//! - REST endpoints, mappings and response envelopes hidden from callers
//! - Every request is bounded by the client timeout
//! - HTTP and decode failures are reported as index errors, never panics

use super::{SearchHits, SearchIndex, SearchQuery};
use crate::config::settings::SearchConfig;
use crate::core::{HistoryError, HistoryResult, SearchDocument};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    total: TotalHits,
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: SearchDocument,
}

pub struct ElasticsearchIndex {
    client: Client,
    base_url: String,
    index_name: String,
    refresh_on_write: bool,
}

impl ElasticsearchIndex {
    pub fn new(config: &SearchConfig) -> HistoryResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index_name: config.index_name.clone(),
            refresh_on_write: config.refresh_on_write,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index_name)
    }

    /// Field mappings for session documents
    fn mappings() -> Value {
        json!({
            "mappings": {
                "properties": {
                    "id": { "type": "integer" },
                    "userId": { "type": "integer" },
                    "title": { "type": "text" },
                    "content": { "type": "text" },
                    "lastMessageAt": { "type": "date" },
                    "createdAt": { "type": "date" }
                }
            }
        })
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn ensure_schema(&self) -> HistoryResult<()> {
        let exists = self.client.head(self.index_url()).send().await?;
        match exists.status() {
            status if status.is_success() => {
                tracing::debug!("[ElasticsearchIndex] Index '{}' already exists", self.index_name);
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(HistoryError::index(format!(
                    "index existence check returned {}",
                    status
                )));
            }
        }

        let response = self
            .client
            .put(self.index_url())
            .json(&Self::mappings())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!("[ElasticsearchIndex] Created index '{}'", self.index_name);
            return Ok(());
        }

        let body = error_body(response).await;
        // another instance won the creation race
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            tracing::debug!("[ElasticsearchIndex] Index '{}' created concurrently", self.index_name);
            return Ok(());
        }

        Err(HistoryError::index(format!(
            "index creation returned {}: {}",
            status, body
        )))
    }

    async fn upsert_document(&self, doc: &SearchDocument) -> HistoryResult<()> {
        let refresh = if self.refresh_on_write { "true" } else { "false" };
        let response = self
            .client
            .put(format!("{}/_doc/{}", self.index_url(), doc.id))
            .query(&[("refresh", refresh)])
            .json(doc)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(HistoryError::index(format!(
                "upsert of document {} returned {}: {}",
                doc.id, status, body
            )));
        }

        tracing::debug!("[ElasticsearchIndex] Upserted document {}", doc.id);
        Ok(())
    }

    async fn query(&self, query: &SearchQuery) -> HistoryResult<SearchHits> {
        let response = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&query.to_elastic())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(HistoryError::index(format!(
                "search returned {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| HistoryError::index(format!("search response decode error: {}", e)))?;

        Ok(SearchHits {
            total: parsed.hits.total.value,
            hits: parsed.hits.hits.into_iter().map(|h| h.source).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::now_millis;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> SearchConfig {
        SearchConfig {
            url: server.uri(),
            index_name: "chat_histories".to_string(),
            timeout_ms: 500,
            refresh_on_write: true,
        }
    }

    fn sample_doc() -> SearchDocument {
        let at = now_millis();
        SearchDocument {
            id: 12,
            owner_id: 3,
            title: "Trip planning".to_string(),
            content: "Where should I go in Da Nang?".to_string(),
            last_message_at: at,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_ensure_schema_skips_existing_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/chat_histories"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let index = ElasticsearchIndex::new(&config_for(&server)).unwrap();
        index.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_missing_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/chat_histories"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/chat_histories"))
            .and(body_partial_json(json!({
                "mappings": { "properties": { "userId": { "type": "integer" } } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(1)
            .mount(&server)
            .await;

        let index = ElasticsearchIndex::new(&config_for(&server)).unwrap();
        index.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_schema_tolerates_creation_race() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "type": "resource_already_exists_exception" }
            })))
            .mount(&server)
            .await;

        let index = ElasticsearchIndex::new(&config_for(&server)).unwrap();
        index.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_puts_document_with_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/chat_histories/_doc/12"))
            .and(query_param("refresh", "true"))
            .and(body_partial_json(json!({ "id": 12, "userId": 3, "title": "Trip planning" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let index = ElasticsearchIndex::new(&config_for(&server)).unwrap();
        index.upsert_document(&sample_doc()).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_failure_is_index_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let index = ElasticsearchIndex::new(&config_for(&server)).unwrap();
        let err = index.upsert_document(&sample_doc()).await.unwrap_err();
        assert!(err.is_index());
    }

    #[tokio::test]
    async fn test_query_parses_total_and_sources() {
        let server = MockServer::start().await;
        let doc = sample_doc();
        Mock::given(method("POST"))
            .and(path("/chat_histories/_search"))
            .and(body_partial_json(json!({ "from": 0, "size": 10 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {
                    "total": { "value": 27, "relation": "eq" },
                    "hits": [ { "_id": "12", "_source": doc } ]
                }
            })))
            .mount(&server)
            .await;

        let index = ElasticsearchIndex::new(&config_for(&server)).unwrap();
        let query = SearchQuery::builder(3).keyword(Some("da nang")).build();
        let hits = index.query(&query).await.unwrap();

        assert_eq!(hits.total, 27);
        assert_eq!(hits.hits, vec![doc]);
    }

    #[tokio::test]
    async fn test_query_timeout_is_index_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let index = ElasticsearchIndex::new(&config_for(&server)).unwrap();
        let err = index
            .query(&SearchQuery::builder(1).build())
            .await
            .unwrap_err();
        assert!(err.is_index());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_index_error() {
        let config = SearchConfig {
            url: "http://127.0.0.1:1".to_string(),
            timeout_ms: 200,
            ..SearchConfig::default()
        };
        let index = ElasticsearchIndex::new(&config).unwrap();
        assert!(index.ensure_schema().await.unwrap_err().is_index());
    }
}
