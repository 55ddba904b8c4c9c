use natlas_server::{
    api::{build_router, AppState},
    config::Config,
    error::Result,
    search::ScanStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; a bad file or environment value stops startup
    let config = Config::load()?;

    // Initialize tracing
    let level = &config.observability.log_level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("natlas_server={level},tower_http={level}").into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        service = %config.observability.service_name,
        "Starting natlas server v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Connect to the search cluster; an unreachable cluster is not fatal
    tracing::info!("Search backend: {:?}", config.search.backend);
    let store = Arc::new(ScanStore::from_config(config.search.clone()).await?);
    if store.is_connected() {
        tracing::info!("✅ Scan store ready");
    } else {
        tracing::warn!(
            "⚠️  Search cluster unavailable; retrying at most every {}s",
            config.search.reconnect_interval_secs
        );
    }

    let app = build_router(AppState::new(store), &config.server);

    // Start HTTP server
    let http_addr = config.bind_address();
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("🚀 HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
