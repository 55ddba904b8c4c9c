//! Search configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which backend the scan store talks to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Elasticsearch,
    Memory,
}

/// Refresh behaviour requested on writes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Let the cluster refresh on its own schedule
    None,
    /// Return once the write is visible to search
    #[default]
    WaitFor,
    /// Force an immediate refresh
    Immediate,
}

impl RefreshPolicy {
    /// Value for the `refresh` query parameter, if any
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            RefreshPolicy::None => None,
            RefreshPolicy::WaitFor => Some("wait_for"),
            RefreshPolicy::Immediate => Some("true"),
        }
    }
}

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Backend implementation
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the cluster
    #[serde(default = "default_url")]
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra connection attempts made at startup
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum time between reconnect attempts while disconnected
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Index holding the latest scan per host
    #[serde(default = "default_current_index")]
    pub current_index: String,

    /// Index holding every scan
    #[serde(default = "default_history_index")]
    pub history_index: String,

    /// Index mapping file; the bundled mapping is used when unset
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,

    /// Refresh behaviour on writes
    #[serde(default)]
    pub refresh: RefreshPolicy,
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            url: default_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            current_index: default_current_index(),
            history_index: default_history_index(),
            mapping_path: None,
            refresh: RefreshPolicy::default(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    1
}

fn default_reconnect_interval_secs() -> u64 {
    60
}

fn default_current_index() -> String {
    "nmap".to_string()
}

fn default_history_index() -> String {
    "nmap_history".to_string()
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn reconnect_interval_secs(mut self, secs: u64) -> Self {
        self.config.reconnect_interval_secs = secs;
        self
    }

    pub fn indices(mut self, current: impl Into<String>, history: impl Into<String>) -> Self {
        self.config.current_index = current.into();
        self.config.history_index = history.into();
        self
    }

    pub fn mapping_path(mut self, path: PathBuf) -> Self {
        self.config.mapping_path = Some(path);
        self
    }

    pub fn refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.config.refresh = refresh;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
