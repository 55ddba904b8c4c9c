//! Shared fixtures for the scan store and API tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use natlas_server::models::{ScanRecord, Screenshot};
use natlas_server::search::{IndexMapping, InMemoryBackend, ScanStore, SearchConfigBuilder};
use std::sync::Arc;

/// Store over a fresh in-memory backend, returned alongside the backend so
/// tests can inspect documents and toggle connectivity
pub async fn memory_store(reconnect_interval_secs: u64) -> (ScanStore, InMemoryBackend) {
    let backend = InMemoryBackend::new();
    let store = store_over(&backend, reconnect_interval_secs).await;
    (store, backend)
}

pub async fn store_over(backend: &InMemoryBackend, reconnect_interval_secs: u64) -> ScanStore {
    let config = SearchConfigBuilder::new()
        .reconnect_interval_secs(reconnect_interval_secs)
        .build();
    ScanStore::connect(
        Arc::new(backend.clone()),
        config,
        IndexMapping::bundled().unwrap(),
    )
    .await
}

/// Minutes past a fixed epoch, so ordering is explicit in each test
pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 1, 12, minute, 0).unwrap()
}

/// An up host with open ports and typical scan output
pub fn scan(ip: &str, scan_id: &str, minute: u32) -> ScanRecord {
    ScanRecord::new(ip, scan_id, at(minute))
        .with_open_ports(2)
        .with_nmap_data(format!(
            "Nmap scan report for {ip}\n22/tcp open ssh OpenSSH 8.2\n80/tcp open http nginx"
        ))
}

pub fn scan_with_screenshots(ip: &str, scan_id: &str, minute: u32, count: u16) -> ScanRecord {
    let shots = (0..count)
        .map(|i| Screenshot::new("HTTP", 80 + i, format!("hash-{scan_id}-{i}")))
        .collect();
    scan(ip, scan_id, minute).with_screenshots(shots)
}
