use crate::search::backend::SearchBackend;
use crate::search::config::{BackendKind, SearchConfig};
use crate::search::elastic::ElasticBackend;
use crate::search::error::SearchResult;
use crate::search::memory::InMemoryBackend;
use std::sync::Arc;

/// Create a search backend based on configuration
pub fn create_backend(config: &SearchConfig) -> SearchResult<Arc<dyn SearchBackend>> {
    match config.backend {
        BackendKind::Elasticsearch => {
            tracing::info!(url = %config.url, "Initializing Elasticsearch backend");
            Ok(Arc::new(ElasticBackend::new(config)?))
        }

        BackendKind::Memory => {
            tracing::warn!("Using in-memory search backend; scans will not survive a restart");
            Ok(Arc::new(InMemoryBackend::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::SearchConfigBuilder;

    #[tokio::test]
    async fn test_create_memory_backend() {
        let config = SearchConfigBuilder::new().backend(BackendKind::Memory).build();
        let backend = create_backend(&config).unwrap();
        assert!(backend.ping().await.is_ok());
    }

    #[test]
    fn test_create_elastic_backend_without_contacting_cluster() {
        let config = SearchConfigBuilder::new().url("http://127.0.0.1:1").build();
        assert!(create_backend(&config).is_ok());
    }
}
