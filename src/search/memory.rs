//! In-memory search backend (for development and testing)

use crate::search::backend::{SearchBackend, SearchHit, SearchResponse};
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::{lookup, Query, SearchRequest, SortOrder};
use async_trait::async_trait;
use chrono::DateTime;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use uuid::Uuid;

type Documents = BTreeMap<String, Value>;

/// Process-local backend that evaluates queries itself.
///
/// It can be switched offline to simulate an unreachable cluster, and it
/// counts every request it receives.
#[derive(Clone)]
pub struct InMemoryBackend {
    indices: Arc<DashMap<String, Documents>>,
    online: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            indices: Arc::new(DashMap::new()),
            online: Arc::new(AtomicBool::new(true)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulate the cluster going away or coming back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, AtomicOrdering::SeqCst);
    }

    /// Number of requests received so far, including refused ones
    pub fn request_count(&self) -> usize {
        self.requests.load(AtomicOrdering::SeqCst)
    }

    /// Every document currently stored in an index
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.indices
            .get(index)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Document stored under `id`
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.indices.get(index).and_then(|docs| docs.get(id).cloned())
    }

    fn begin(&self) -> SearchResult<()> {
        self.requests.fetch_add(1, AtomicOrdering::SeqCst);
        if self.online.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(SearchError::Unreachable(
                "in-memory backend is offline".to_string(),
            ))
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric sort key: dates by instant, numbers by value
fn sort_key(doc: &Value, field: &str) -> Option<f64> {
    match lookup(doc, field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9),
        _ => None,
    }
}

/// Documents without the sort field go last in either direction
fn compare_keys(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let natural = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Ascending => natural,
                SortOrder::Descending => natural.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn project(doc: &Value, fields: &[String]) -> Value {
    let projected: Map<String, Value> = fields
        .iter()
        .filter_map(|field| doc.get(field).map(|v| (field.clone(), v.clone())))
        .collect();
    Value::Object(projected)
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn ping(&self) -> SearchResult<()> {
        self.begin()
    }

    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        self.begin()?;
        Ok(self.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, _mapping: &Value) -> SearchResult<()> {
        self.begin()?;
        self.indices.entry(index.to_string()).or_default();
        tracing::debug!(index = %index, "Created in-memory index");
        Ok(())
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> SearchResult<SearchResponse> {
        self.begin()?;
        let docs = self
            .indices
            .get(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;

        let mut matched: Vec<(&String, &Value)> = docs
            .iter()
            .filter(|(_, doc)| request.query.matches(doc))
            .collect();

        let mut sums = HashMap::new();
        for agg in &request.sums {
            let total: f64 = matched
                .iter()
                .filter_map(|(_, doc)| lookup(doc, &agg.field).and_then(Value::as_f64))
                .sum();
            sums.insert(agg.name.clone(), total);
        }

        if let Some(seed) = request.query.random_seed() {
            matched.shuffle(&mut StdRng::seed_from_u64(seed));
        } else if let Some(sort) = &request.sort {
            matched.sort_by(|(_, a), (_, b)| {
                compare_keys(sort_key(a, &sort.field), sort_key(b, &sort.field), sort.order)
            });
        }

        let hits = matched
            .iter()
            .skip(request.from)
            .take(request.size)
            .map(|(id, doc)| SearchHit {
                id: (*id).clone(),
                source: match &request.source {
                    Some(fields) => project(doc, fields),
                    None => (*doc).clone(),
                },
            })
            .collect();

        Ok(SearchResponse {
            total: matched.len() as u64,
            hits,
            sums,
        })
    }

    async fn count(&self, index: &str) -> SearchResult<u64> {
        self.begin()?;
        self.indices
            .get(index)
            .map(|docs| docs.len() as u64)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Value,
    ) -> SearchResult<()> {
        self.begin()?;
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.indices
            .entry(index.to_string())
            .or_default()
            .insert(id, document.clone());
        Ok(())
    }

    async fn delete_by_query(&self, indices: &[&str], query: &Query) -> SearchResult<u64> {
        self.begin()?;
        let mut deleted = 0;
        for index in indices {
            if let Some(mut docs) = self.indices.get_mut(*index) {
                let before = docs.len();
                docs.retain(|_, doc| !query.matches(doc));
                deleted += (before - docs.len()) as u64;
            }
        }
        Ok(deleted)
    }
}
