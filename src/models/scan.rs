use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use validator::Validate;

/// One completed scan of a single host, as submitted by a scanning agent.
///
/// Only the fields the store queries on are typed. Everything else an agent
/// sends (hostname, port tables, raw xml, agent id, ...) is carried in
/// `extra` so a record reads back exactly as it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScanRecord {
    /// Host address the scan targeted
    #[validate(length(min = 1, max = 64))]
    pub ip: String,

    /// Identifier of this scan event, unique across history
    #[validate(length(min = 1, max = 256))]
    pub scan_id: String,

    /// Scan completion time
    pub ctime: DateTime<Utc>,

    /// Whether the host answered
    #[serde(default)]
    pub is_up: bool,

    /// Number of open ports found
    #[serde(default)]
    pub port_count: u32,

    /// Number of screenshots taken during the scan
    #[serde(default)]
    pub num_screenshots: u32,

    /// Screenshot artifacts
    #[serde(default)]
    pub screenshots: Vec<Screenshot>,

    /// Free-text scan output, the target of full-text search
    #[serde(default)]
    pub nmap_data: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScanRecord {
    /// Create a record for a host that was found down
    pub fn new(ip: impl Into<String>, scan_id: impl Into<String>, ctime: DateTime<Utc>) -> Self {
        Self {
            ip: ip.into(),
            scan_id: scan_id.into(),
            ctime,
            is_up: false,
            port_count: 0,
            num_screenshots: 0,
            screenshots: Vec::new(),
            nmap_data: String::new(),
            extra: Map::new(),
        }
    }

    /// Parsed host address, `None` when `ip` is not a valid address
    pub fn ip_addr(&self) -> Option<IpAddr> {
        self.ip.parse().ok()
    }

    /// Mark the host up with the given number of open ports
    pub fn with_open_ports(mut self, port_count: u32) -> Self {
        self.is_up = true;
        self.port_count = port_count;
        self
    }

    pub fn with_nmap_data(mut self, nmap_data: impl Into<String>) -> Self {
        self.nmap_data = nmap_data.into();
        self
    }

    /// Attach screenshots, keeping `num_screenshots` in step
    pub fn with_screenshots(mut self, screenshots: Vec<Screenshot>) -> Self {
        self.num_screenshots = screenshots.len() as u32;
        self.screenshots = screenshots;
        self
    }
}

/// Reference to a screenshot artifact captured for a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    /// Service the capture was taken from (HTTP, HTTPS, VNC)
    pub service: String,

    pub port: u16,

    /// Content hash of the full-size image
    pub hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_hash: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Screenshot {
    pub fn new(service: impl Into<String>, port: u16, hash: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            port,
            hash: hash.into(),
            thumb_hash: None,
            extra: Map::new(),
        }
    }
}

/// Screenshot-only projection of a scan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotEntry {
    #[serde(default)]
    pub screenshots: Vec<Screenshot>,

    pub ctime: DateTime<Utc>,

    pub scan_id: String,

    /// Present when read from the current index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}
