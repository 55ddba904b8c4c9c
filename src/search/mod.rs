//! Scan storage on top of a document-search cluster
//!
//! Two indices hold scan results: the current index keeps the latest scan
//! of each host keyed by its IP, and the history index keeps every scan.
//! [`ScanStore`] is the only entry point the rest of the server uses. It
//! talks to the cluster through the [`SearchBackend`] trait, which has a
//! REST implementation ([`ElasticBackend`]) and a process-local one
//! ([`InMemoryBackend`]) for development and tests.
//!
//! # Example
//!
//! ```no_run
//! use natlas_server::search::{ScanStore, SearchConfig, SearchIndex};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ScanStore::from_config(SearchConfig::default()).await?;
//! let page = store.search("ssh", 20, 0, SearchIndex::Current).await;
//! println!("{} hosts match", page.total);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod elastic;
pub mod error;
pub mod factory;
pub mod health;
pub mod mapping;
pub mod memory;
pub mod query;
pub mod store;

pub use backend::{SearchBackend, SearchHit, SearchResponse};
pub use config::{BackendKind, RefreshPolicy, SearchConfig, SearchConfigBuilder};
pub use elastic::ElasticBackend;
pub use error::{SearchError, SearchResult};
pub use factory::create_backend;
pub use health::{ConnectionHealth, ConnectionStatus};
pub use mapping::IndexMapping;
pub use memory::InMemoryBackend;
pub use query::{Query, SearchRequest, SortOrder};
pub use store::{HostLookup, Page, ScanStore, ScreenshotPage, SearchIndex, DEFAULT_QUERY};
