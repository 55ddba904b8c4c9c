//! natlas-server: host scan result storage over an Elasticsearch-compatible
//! cluster, with a small HTTP API in front of it.
//!
//! The heart of the crate is [`search::ScanStore`], a façade that keeps two
//! indices in step: a history index holding every scan ever recorded and a
//! current index holding the latest scan per host.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod search;
