//! HTTP backend for Elasticsearch-compatible clusters

use crate::search::backend::{SearchBackend, SearchHit, SearchResponse};
use crate::search::config::{RefreshPolicy, SearchConfig};
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::{Query, SearchRequest};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// Search backend speaking the cluster's REST API
#[derive(Clone)]
pub struct ElasticBackend {
    client: Client,
    base_url: String,
    refresh: RefreshPolicy,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    hits: RawHits,
    #[serde(default)]
    aggregations: HashMap<String, RawAggregation>,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    #[serde(default)]
    total: Option<RawTotal>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// `hits.total` is a bare number before 7.0 and an object after
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct RawAggregation {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct RawDeleteByQuery {
    deleted: u64,
}

impl ElasticBackend {
    /// Create a backend for the configured cluster
    pub fn new(config: &SearchConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .user_agent(concat!("natlas-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                SearchError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            refresh: config.refresh,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body, mapping error statuses
    async fn send_json(&self, request: RequestBuilder) -> SearchResult<Value> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(service_error(status, &body));
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Turn an error response into a `SearchError`, keeping the cluster's reason
fn service_error(status: StatusCode, body: &str) -> SearchError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let kind = error
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if status == StatusCode::NOT_FOUND && kind == "index_not_found_exception" {
        let index = error
            .and_then(|e| e.get("index"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return SearchError::IndexNotFound(index.to_string());
    }

    let reason = error
        .and_then(|e| e.get("reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());

    SearchError::Service {
        status: status.as_u16(),
        reason,
    }
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    async fn ping(&self) -> SearchResult<()> {
        let info = self.send_json(self.client.get(self.url("_nodes"))).await?;

        if info.get("cluster_name").is_some() {
            Ok(())
        } else {
            Err(SearchError::Unreachable(
                "node info carries no cluster_name".to_string(),
            ))
        }
    }

    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        let response = self.client.head(self.url(index)).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(SearchError::Service {
                status: status.as_u16(),
                reason: format!("unexpected status checking index {}", index),
            }),
        }
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> SearchResult<()> {
        match self
            .send_json(self.client.put(self.url(index)).json(mapping))
            .await
        {
            Ok(_) => Ok(()),
            // Another instance created it between our check and this call
            Err(SearchError::Service { status: 400, reason })
                if reason.contains("already exists") =>
            {
                debug!(index = %index, "Index already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> SearchResult<SearchResponse> {
        let body = self
            .send_json(
                self.client
                    .post(self.url(&format!("{}/_search", index)))
                    .json(&request.to_body()),
            )
            .await?;

        let raw: RawSearchResponse = serde_json::from_value(body)?;

        let total = match raw.hits.total {
            Some(RawTotal::Count(n)) | Some(RawTotal::Object { value: n }) => n,
            None => raw.hits.hits.len() as u64,
        };

        let sums = raw
            .aggregations
            .into_iter()
            .map(|(name, agg)| (name, agg.value.unwrap_or(0.0)))
            .collect();

        let hits = raw
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                source: hit.source,
            })
            .collect();

        Ok(SearchResponse { total, hits, sums })
    }

    async fn count(&self, index: &str) -> SearchResult<u64> {
        let body = self
            .send_json(self.client.get(self.url(&format!("{}/_count", index))))
            .await?;
        let raw: RawCount = serde_json::from_value(body)?;
        Ok(raw.count)
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Value,
    ) -> SearchResult<()> {
        let mut request = match id {
            Some(id) => self.client.put(self.url(&format!("{}/_doc/{}", index, id))),
            None => self.client.post(self.url(&format!("{}/_doc", index))),
        };

        if let Some(refresh) = self.refresh.as_param() {
            request = request.query(&[("refresh", refresh)]);
        }

        self.send_json(request.json(document)).await?;
        Ok(())
    }

    async fn delete_by_query(&self, indices: &[&str], query: &Query) -> SearchResult<u64> {
        let mut request = self
            .client
            .post(self.url(&format!("{}/_delete_by_query", indices.join(","))))
            .query(&[("conflicts", "proceed")]);

        // delete_by_query only understands an immediate refresh
        if self.refresh != RefreshPolicy::None {
            request = request.query(&[("refresh", "true")]);
        }

        let body = self
            .send_json(request.json(&json!({ "query": query.to_json() })))
            .await?;
        let raw: RawDeleteByQuery = serde_json::from_value(body)?;
        Ok(raw.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::SearchConfigBuilder;
    use mockito::Matcher;

    fn backend_for(url: &str, refresh: RefreshPolicy) -> ElasticBackend {
        let config = SearchConfigBuilder::new().url(url).refresh(refresh).build();
        ElasticBackend::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_ping_requires_cluster_name() {
        let mut server = mockito::Server::new_async().await;
        let healthy = server
            .mock("GET", "/_nodes")
            .with_header("content-type", "application/json")
            .with_body(r#"{"cluster_name":"natlas","nodes":{}}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), RefreshPolicy::None);
        backend.ping().await.unwrap();
        healthy.assert_async().await;

        let mut bare = mockito::Server::new_async().await;
        bare.mock("GET", "/_nodes")
            .with_header("content-type", "application/json")
            .with_body(r#"{"nodes":{}}"#)
            .create_async()
            .await;

        let backend = backend_for(&bare.url(), RefreshPolicy::None);
        assert!(backend.ping().await.unwrap_err().is_unreachable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let backend = backend_for("http://127.0.0.1:1", RefreshPolicy::None);
        let err = backend.ping().await.unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_index_exists_and_create() {
        let mut server = mockito::Server::new_async().await;
        server.mock("HEAD", "/nmap").with_status(200).create_async().await;
        server.mock("HEAD", "/nmap_history").with_status(404).create_async().await;
        let create = server
            .mock("PUT", "/nmap_history")
            .match_body(Matcher::PartialJson(json!({
                "mappings": { "properties": { "ip": { "type": "ip" } } }
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"acknowledged":true}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), RefreshPolicy::None);
        assert!(backend.index_exists("nmap").await.unwrap());
        assert!(!backend.index_exists("nmap_history").await.unwrap());

        let mapping = json!({ "mappings": { "properties": { "ip": { "type": "ip" } } } });
        backend.create_index("nmap_history", &mapping).await.unwrap();
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_parses_both_total_formats() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/nmap/_search")
            .match_body(Matcher::PartialJson(json!({ "size": 1, "track_total_hits": true })))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"hits":{"total":{"value":7,"relation":"eq"},
                    "hits":[{"_id":"10.0.0.1","_source":{"ip":"10.0.0.1"}}]},
                    "aggregations":{"screenshot_count":{"value":12.0}}}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/nmap_history/_search")
            .with_header("content-type", "application/json")
            .with_body(r#"{"hits":{"total":3,"hits":[]}}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), RefreshPolicy::None);
        let request = SearchRequest::new(Query::MatchAll).with_page(1, 0);

        let current = backend.search("nmap", &request).await.unwrap();
        assert_eq!(current.total, 7);
        assert_eq!(current.hits[0].id, "10.0.0.1");
        assert_eq!(current.hits[0].source["ip"], "10.0.0.1");
        assert_eq!(current.sum("screenshot_count"), 12);

        let history = backend.search("nmap_history", &request).await.unwrap();
        assert_eq!(history.total, 3);
        assert!(history.hits.is_empty());
    }

    #[tokio::test]
    async fn test_error_statuses_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/missing/_search")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":{"type":"index_not_found_exception","reason":"no such index [missing]","index":"missing"},"status":404}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/nmap/_search")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"type":"search_phase_execution_exception","reason":"Failed to parse query [AND AND]"},"status":400}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), RefreshPolicy::None);
        let request = SearchRequest::new(Query::query_string("AND AND", &["nmap_data"]));

        match backend.search("missing", &request).await.unwrap_err() {
            SearchError::IndexNotFound(index) => assert_eq!(index, "missing"),
            other => panic!("unexpected error: {}", other),
        }

        match backend.search("nmap", &request).await.unwrap_err() {
            SearchError::Service { status, reason } => {
                assert_eq!(status, 400);
                assert!(reason.contains("Failed to parse query"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_index_document_paths_and_refresh() {
        let mut server = mockito::Server::new_async().await;
        let upsert = server
            .mock("PUT", "/nmap/_doc/10.0.0.1")
            .match_query(Matcher::UrlEncoded("refresh".into(), "wait_for".into()))
            .match_body(Matcher::PartialJson(json!({ "scan_id": "s1" })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"created"}"#)
            .create_async()
            .await;
        let append = server
            .mock("POST", "/nmap_history/_doc")
            .match_query(Matcher::UrlEncoded("refresh".into(), "wait_for".into()))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"created","_id":"x1"}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), RefreshPolicy::WaitFor);
        let doc = json!({ "ip": "10.0.0.1", "scan_id": "s1" });
        backend.index_document("nmap", Some("10.0.0.1"), &doc).await.unwrap();
        backend.index_document("nmap_history", None, &doc).await.unwrap();

        upsert.assert_async().await;
        append.assert_async().await;
    }

    #[tokio::test]
    async fn test_count_and_delete_by_query() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/nmap/_count")
            .with_header("content-type", "application/json")
            .with_body(r#"{"count":42}"#)
            .create_async()
            .await;
        let delete = server
            .mock("POST", "/nmap,nmap_history/_delete_by_query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("conflicts".into(), "proceed".into()),
                Matcher::UrlEncoded("refresh".into(), "true".into()),
            ]))
            .match_body(Matcher::Json(json!({ "query": { "term": { "scan_id": "s1" } } })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"deleted":2,"failures":[]}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), RefreshPolicy::WaitFor);
        assert_eq!(backend.count("nmap").await.unwrap(), 42);

        let deleted = backend
            .delete_by_query(&["nmap", "nmap_history"], &Query::term("scan_id", "s1"))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        delete.assert_async().await;
    }
}
