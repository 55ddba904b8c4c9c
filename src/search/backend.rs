//! The seam between the scan store and a concrete search cluster

use crate::search::error::SearchResult;
use crate::search::query::{Query, SearchRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// A single search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Document id
    pub id: String,

    /// Document source, projected if the request asked for it
    pub source: Value,
}

/// Search response with results and aggregates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Total number of matching documents (before pagination)
    pub total: u64,

    /// The requested page of hits
    pub hits: Vec<SearchHit>,

    /// Sum aggregations by name
    pub sums: HashMap<String, f64>,
}

impl SearchResponse {
    /// Sum aggregation rounded down to a count
    pub fn sum(&self, name: &str) -> u64 {
        self.sums.get(name).map(|v| v.max(0.0) as u64).unwrap_or(0)
    }
}

/// Operations the scan store needs from a document-search service
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Lightweight liveness check
    async fn ping(&self) -> SearchResult<()>;

    /// Check whether an index exists
    async fn index_exists(&self, index: &str) -> SearchResult<bool>;

    /// Create an index with the given mapping body
    async fn create_index(&self, index: &str, mapping: &Value) -> SearchResult<()>;

    /// Run a search against one index
    async fn search(&self, index: &str, request: &SearchRequest) -> SearchResult<SearchResponse>;

    /// Count every document in an index
    async fn count(&self, index: &str) -> SearchResult<u64>;

    /// Store a document, generating an id when `id` is `None` and replacing
    /// any existing document otherwise
    async fn index_document(&self, index: &str, id: Option<&str>, document: &Value)
        -> SearchResult<()>;

    /// Delete every document matching `query` across `indices`, returning
    /// how many were removed
    async fn delete_by_query(&self, indices: &[&str], query: &Query) -> SearchResult<u64>;
}
