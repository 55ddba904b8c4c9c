//! The scan store façade
//!
//! Every public operation follows the same contract: check connectivity
//! first, run the request, and on any failure return the operation's empty
//! value instead of an error. Callers can always render what they get.
//!
//! Connectivity failures flip the store to disconnected. While disconnected
//! the store pings the cluster at most once per reconnect interval; calls
//! in between return their empty value without touching the network.

use crate::models::{ScanRecord, ScreenshotEntry};
use crate::search::backend::{SearchBackend, SearchHit};
use crate::search::config::SearchConfig;
use crate::search::error::{SearchError, SearchResult};
use crate::search::factory::create_backend;
use crate::search::health::{ConnectionHealth, ConnectionStatus};
use crate::search::mapping::IndexMapping;
use crate::search::query::{Query, SearchRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{debug, error, info, warn};

/// Term searched when the caller gives an empty query
pub const DEFAULT_QUERY: &str = "nmap";

const SCREENSHOT_SUM: &str = "screenshot_count";

/// Which of the two scan indices to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SearchIndex {
    /// Latest scan per host
    #[default]
    Current,
    /// Every scan
    History,
}

/// A page of results plus the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            total: 0,
            items: Vec::new(),
        }
    }
}

/// Result of a single-record lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostLookup {
    /// Number of records that matched
    pub total: u64,
    /// The most recent of them
    pub record: Option<ScanRecord>,
}

/// Screenshot listing with the total number of screenshots across matches
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreenshotPage {
    pub total: u64,
    pub screenshot_count: u64,
    pub items: Vec<ScreenshotEntry>,
}

/// Façade over the search cluster holding scan results
pub struct ScanStore {
    backend: Arc<dyn SearchBackend>,
    config: SearchConfig,
    mapping: IndexMapping,
    health: ConnectionHealth,
}

impl ScanStore {
    /// Build the configured backend and connect to it.
    ///
    /// Only configuration problems (bad mapping file, unusable client
    /// settings) are errors; an unreachable cluster yields a disconnected
    /// store.
    pub async fn from_config(config: SearchConfig) -> SearchResult<Self> {
        let mapping = IndexMapping::load(config.mapping_path.as_deref())?;
        let backend = create_backend(&config)?;
        Ok(Self::connect(backend, config, mapping).await)
    }

    /// Ping the cluster and make sure both indices exist.
    ///
    /// Never fails: when the cluster cannot be reached the store starts
    /// disconnected and records why.
    pub async fn connect(
        backend: Arc<dyn SearchBackend>,
        config: SearchConfig,
        mapping: IndexMapping,
    ) -> Self {
        let store = Self {
            backend,
            health: ConnectionHealth::new(config.reconnect_interval()),
            config,
            mapping,
        };

        let attempts = store.config.max_retries + 1;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match store.backend.ping().await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Search cluster liveness check failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => {
                store.health.mark_connected();
                info!(url = %store.config.url, "Connected to search cluster");
                store.ensure_indices().await;
            }
            Some(e) => {
                error!(url = %store.config.url, error = %e, "Could not establish connection to search cluster");
                store.health.mark_disconnected(e.to_string());
            }
        }

        store
    }

    /// Current view of the cluster connection
    pub fn status(&self) -> ConnectionStatus {
        self.health.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.health.is_connected()
    }

    fn index_name(&self, index: SearchIndex) -> &str {
        match index {
            SearchIndex::Current => &self.config.current_index,
            SearchIndex::History => &self.config.history_index,
        }
    }

    /// Create whichever scan indices are missing
    async fn ensure_indices(&self) {
        for index in [SearchIndex::Current, SearchIndex::History] {
            let name = self.index_name(index);
            let result = match self.backend.index_exists(name).await {
                Ok(true) => Ok(()),
                Ok(false) => {
                    info!(index = %name, "Creating index");
                    self.backend.create_index(name, self.mapping.body()).await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                error!(index = %name, error = %e, "Failed to initialise index");
                if e.is_unreachable() {
                    self.health.mark_disconnected(e.to_string());
                }
                return;
            }
        }

        self.health.mark_indices_ready();
    }

    /// Connectivity preamble shared by every operation
    async fn check_status(&self) -> bool {
        if self.health.is_connected() {
            return true;
        }
        if !self.health.reconnect_due() {
            return false;
        }

        match self.backend.ping().await {
            Ok(()) => {
                info!(url = %self.config.url, "Reconnected to search cluster");
                self.health.mark_connected();
                if !self.health.indices_ready() {
                    self.ensure_indices().await;
                }
                self.health.is_connected()
            }
            Err(e) => {
                debug!(error = %e, "Reconnect attempt failed");
                self.health.mark_disconnected(e.to_string());
                false
            }
        }
    }

    /// Run `work` under the connectivity preamble, absorbing any failure
    /// into `empty`. `work` is not polled when the store is disconnected.
    async fn guarded<T, F>(&self, operation: &'static str, empty: T, work: F) -> T
    where
        F: Future<Output = SearchResult<T>>,
    {
        if !self.check_status().await {
            debug!(operation, "Search cluster disconnected; returning empty result");
            return empty;
        }

        match work.await {
            Ok(value) => value,
            Err(e) => self.absorb(operation, e, empty),
        }
    }

    fn absorb<T>(&self, operation: &'static str, err: SearchError, empty: T) -> T {
        if err.is_unreachable() {
            warn!(operation, error = %err, "Lost connection to search cluster");
            self.health.mark_disconnected(err.to_string());
        } else {
            warn!(operation, error = %err, "Search request failed");
        }
        empty
    }

    /// Full-text search over scan output, restricted to hosts that are up
    /// with at least one open port, newest first
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
        index: SearchIndex,
    ) -> Page<ScanRecord> {
        self.guarded(
            "search",
            Page::default(),
            self.try_search(query, limit, offset, index),
        )
        .await
    }

    async fn try_search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
        index: SearchIndex,
    ) -> SearchResult<Page<ScanRecord>> {
        let query = if query.trim().is_empty() {
            DEFAULT_QUERY
        } else {
            query
        };

        let request = SearchRequest::new(Query::all_of(vec![
            Query::query_string(query, &["nmap_data"]),
            up_with_open_ports(),
        ]))
        .with_page(limit, offset)
        .newest_first();

        let response = self.backend.search(self.index_name(index), &request).await?;
        Ok(Page {
            total: response.total,
            items: decode_hits(response.hits),
        })
    }

    /// Number of hosts in the current index
    pub async fn total_hosts(&self) -> u64 {
        self.guarded(
            "total_hosts",
            0,
            self.backend.count(self.index_name(SearchIndex::Current)),
        )
        .await
    }

    /// Record a completed scan: append it to history and make it the
    /// host's current record
    pub async fn new_host(&self, record: &ScanRecord) -> bool {
        self.guarded("new_host", false, self.try_new_host(record)).await
    }

    async fn try_new_host(&self, record: &ScanRecord) -> SearchResult<bool> {
        let document = serde_json::to_value(record)?;

        self.backend
            .index_document(self.index_name(SearchIndex::History), None, &document)
            .await?;
        self.backend
            .index_document(
                self.index_name(SearchIndex::Current),
                Some(&record.ip),
                &document,
            )
            .await?;

        debug!(ip = %record.ip, scan_id = %record.scan_id, "Stored scan");
        Ok(true)
    }

    /// Most recent scan of `ip`
    pub async fn get_host(&self, ip: &str) -> HostLookup {
        self.guarded(
            "get_host",
            HostLookup::default(),
            self.latest_in_history(Query::term("ip", ip)),
        )
        .await
    }

    /// Scans of `ip`, newest first
    pub async fn get_host_history(&self, ip: &str, limit: usize, offset: usize) -> Page<ScanRecord> {
        self.guarded(
            "get_host_history",
            Page::default(),
            self.try_host_history(ip, limit, offset),
        )
        .await
    }

    async fn try_host_history(
        &self,
        ip: &str,
        limit: usize,
        offset: usize,
    ) -> SearchResult<Page<ScanRecord>> {
        let request = SearchRequest::new(Query::term("ip", ip))
            .with_page(limit, offset)
            .newest_first();

        let response = self
            .backend
            .search(self.index_name(SearchIndex::History), &request)
            .await?;
        Ok(Page {
            total: response.total,
            items: decode_hits(response.hits),
        })
    }

    /// Total screenshots taken of `ip` across its history
    pub async fn count_host_screenshots(&self, ip: &str) -> u64 {
        self.guarded(
            "count_host_screenshots",
            0,
            self.try_count_host_screenshots(ip),
        )
        .await
    }

    async fn try_count_host_screenshots(&self, ip: &str) -> SearchResult<u64> {
        let request = SearchRequest::new(Query::term("ip", ip))
            .with_page(0, 0)
            .with_sum(SCREENSHOT_SUM, "num_screenshots");

        let response = self
            .backend
            .search(self.index_name(SearchIndex::History), &request)
            .await?;
        Ok(response.sum(SCREENSHOT_SUM))
    }

    /// Scans of `ip` that produced screenshots, newest first
    pub async fn get_host_screenshots(
        &self,
        ip: &str,
        limit: usize,
        offset: usize,
    ) -> Page<ScreenshotEntry> {
        self.guarded(
            "get_host_screenshots",
            Page::default(),
            self.try_host_screenshots(ip, limit, offset),
        )
        .await
    }

    async fn try_host_screenshots(
        &self,
        ip: &str,
        limit: usize,
        offset: usize,
    ) -> SearchResult<Page<ScreenshotEntry>> {
        let request = SearchRequest::new(Query::all_of(vec![
            Query::term("ip", ip),
            Query::range_gt("num_screenshots", 0),
        ]))
        .with_page(limit, offset)
        .with_source(&["screenshots", "ctime", "scan_id"])
        .newest_first();

        let response = self
            .backend
            .search(self.index_name(SearchIndex::History), &request)
            .await?;
        Ok(Page {
            total: response.total,
            items: decode_hits(response.hits),
        })
    }

    /// The scan identified by `scan_id`
    pub async fn get_host_by_scan_id(&self, scan_id: &str) -> HostLookup {
        self.guarded(
            "get_host_by_scan_id",
            HostLookup::default(),
            self.latest_in_history(Query::term("scan_id", scan_id)),
        )
        .await
    }

    async fn latest_in_history(&self, query: Query) -> SearchResult<HostLookup> {
        let request = SearchRequest::new(query).with_page(1, 0).newest_first();
        let response = self
            .backend
            .search(self.index_name(SearchIndex::History), &request)
            .await?;

        if response.total == 0 {
            return Ok(HostLookup::default());
        }

        Ok(HostLookup {
            total: response.total,
            record: decode_hits(response.hits).into_iter().next(),
        })
    }

    /// Delete one scan everywhere, returning how many documents went.
    ///
    /// When the scan is its host's current record, the next most recent
    /// scan of that host is copied back into the current index. The steps
    /// are not atomic; a failure part way through can leave the current
    /// index stale until the host is next scanned.
    pub async fn delete_scan(&self, scan_id: &str) -> Option<u64> {
        self.guarded("delete_scan", None, self.try_delete_scan(scan_id))
            .await
    }

    async fn try_delete_scan(&self, scan_id: &str) -> SearchResult<Option<u64>> {
        let current = self.index_name(SearchIndex::Current);
        let history = self.index_name(SearchIndex::History);
        let by_scan = Query::term("scan_id", scan_id);

        let found = self
            .backend
            .search(current, &SearchRequest::new(by_scan.clone()).with_page(1, 0))
            .await?;

        let mut replacement: Option<(String, Value)> = None;
        let current_ip = found
            .hits
            .first()
            .and_then(|hit| hit.source.get("ip"))
            .and_then(Value::as_str);

        if let Some(ip) = current_ip {
            let recent = self
                .backend
                .search(
                    history,
                    &SearchRequest::new(Query::term("ip", ip))
                        .with_page(2, 0)
                        .newest_first(),
                )
                .await?;

            // With a single scan on record there is nothing to fall back to
            if recent.hits.len() == 2 {
                replacement = recent
                    .hits
                    .into_iter()
                    .find(|hit| hit.source.get("scan_id").and_then(Value::as_str) != Some(scan_id))
                    .map(|hit| (ip.to_string(), hit.source));
            }
        }

        let deleted = self.backend.delete_by_query(&[current, history], &by_scan).await?;

        if let Some((ip, document)) = replacement {
            self.backend.index_document(current, Some(&ip), &document).await?;
            info!(ip = %ip, scan_id = %scan_id, "Restored previous scan as current");
        }

        info!(scan_id = %scan_id, deleted, "Deleted scan");
        Ok(Some(deleted))
    }

    /// Delete every scan of `ip` from both indices
    pub async fn delete_host(&self, ip: &str) -> Option<u64> {
        self.guarded("delete_host", None, self.try_delete_host(ip))
            .await
    }

    async fn try_delete_host(&self, ip: &str) -> SearchResult<Option<u64>> {
        let indices = [
            self.index_name(SearchIndex::Current),
            self.index_name(SearchIndex::History),
        ];
        let deleted = self
            .backend
            .delete_by_query(&indices, &Query::term("ip", ip))
            .await?;

        info!(ip = %ip, deleted, "Deleted host");
        Ok(Some(deleted))
    }

    /// A random current host that is up with open ports
    pub async fn random_host(&self) -> Option<ScanRecord> {
        self.guarded("random_host", None, self.try_random_host()).await
    }

    async fn try_random_host(&self) -> SearchResult<Option<ScanRecord>> {
        // The cluster takes the seed as a signed long
        let seed = u64::from(rand::random::<u32>());
        let request =
            SearchRequest::new(Query::random(up_with_open_ports(), seed)).with_page(1, 0);

        let response = self
            .backend
            .search(self.index_name(SearchIndex::Current), &request)
            .await?;
        Ok(decode_hits(response.hits).into_iter().next())
    }

    /// Current hosts with screenshots, newest first, plus the screenshot
    /// total across all of them
    pub async fn get_current_screenshots(&self, limit: usize, offset: usize) -> ScreenshotPage {
        self.guarded(
            "get_current_screenshots",
            ScreenshotPage::default(),
            self.try_current_screenshots(limit, offset),
        )
        .await
    }

    async fn try_current_screenshots(
        &self,
        limit: usize,
        offset: usize,
    ) -> SearchResult<ScreenshotPage> {
        let request = SearchRequest::new(Query::range_gt("num_screenshots", 0))
            .with_page(limit, offset)
            .with_sum(SCREENSHOT_SUM, "num_screenshots")
            .with_source(&["screenshots", "ctime", "scan_id", "ip"])
            .newest_first();

        let response = self
            .backend
            .search(self.index_name(SearchIndex::Current), &request)
            .await?;
        Ok(ScreenshotPage {
            total: response.total,
            screenshot_count: response.sum(SCREENSHOT_SUM),
            items: decode_hits(response.hits),
        })
    }
}

fn up_with_open_ports() -> Query {
    Query::all_of(vec![
        Query::term("is_up", true),
        Query::range_gt("port_count", 0),
    ])
}

/// Decode hit sources, skipping any that do not fit the expected shape
fn decode_hits<T: DeserializeOwned>(hits: Vec<SearchHit>) -> Vec<T> {
    hits.into_iter()
        .filter_map(|hit| match serde_json::from_value(hit.source) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(document_id = %hit.id, error = %e, "Skipping malformed scan document");
                None
            }
        })
        .collect()
}
