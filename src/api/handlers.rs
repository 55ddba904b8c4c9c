use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{ScanRecord, ScreenshotEntry};
use crate::search::{ConnectionStatus, HostLookup, Page, ScreenshotPage, SearchIndex};
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// `Json` body extractor whose rejections use the JSON error body
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Query` extractor with the same treatment
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Pagination shared by the listing endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let connection = state.store.status();
    Ok(Json(HealthResponse {
        status: if connection.connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        search: connection,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub search: ConnectionStatus,
}

/// Full-text search over scan output
pub async fn search(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<SearchParams>,
) -> Result<Json<Page<ScanRecord>>> {
    let page = state
        .store
        .search(
            params.q.as_deref().unwrap_or_default(),
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            params.offset.unwrap_or(0),
            params.index.unwrap_or_default(),
        )
        .await;

    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// `current` (default) or `history`
    pub index: Option<SearchIndex>,
}

/// Number of hosts with a current scan
pub async fn count_hosts(State(state): State<AppState>) -> Result<Json<CountResponse>> {
    Ok(Json(CountResponse {
        total: state.store.total_hosts().await,
    }))
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub total: u64,
}

/// Store a completed scan
pub async fn create_host(
    State(state): State<AppState>,
    AppJson(record): AppJson<ScanRecord>,
) -> Result<(StatusCode, Json<StoredResponse>)> {
    record.validate()?;
    if record.ip_addr().is_none() {
        return Err(AppError::Validation(format!(
            "'{}' is not an IP address",
            record.ip
        )));
    }

    if !state.store.new_host(&record).await {
        return Err(AppError::Unavailable(format!(
            "scan {} could not be stored",
            record.scan_id
        )));
    }

    tracing::info!(ip = %record.ip, scan_id = %record.scan_id, "Scan submitted");

    Ok((
        StatusCode::CREATED,
        Json(StoredResponse {
            ip: record.ip,
            scan_id: record.scan_id,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct StoredResponse {
    pub ip: String,
    pub scan_id: String,
}

/// A random live host
pub async fn random_host(State(state): State<AppState>) -> Result<Json<ScanRecord>> {
    state
        .store
        .random_host()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no hosts available".to_string()))
}

/// Latest scan of a host
pub async fn get_host(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<HostLookup>> {
    found(state.store.get_host(&ip).await, || format!("host {}", ip))
}

/// Scan history of a host
pub async fn get_host_history(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    AppQuery(params): AppQuery<PageParams>,
) -> Result<Json<Page<ScanRecord>>> {
    Ok(Json(
        state
            .store
            .get_host_history(&ip, params.limit(), params.offset())
            .await,
    ))
}

/// Screenshots taken of a host across its history
pub async fn get_host_screenshots(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    AppQuery(params): AppQuery<PageParams>,
) -> Result<Json<ScreenshotPage>> {
    let Page { total, items }: Page<ScreenshotEntry> = state
        .store
        .get_host_screenshots(&ip, params.limit(), params.offset())
        .await;
    let screenshot_count = state.store.count_host_screenshots(&ip).await;

    Ok(Json(ScreenshotPage {
        total,
        screenshot_count,
        items,
    }))
}

/// Delete every scan of a host
pub async fn delete_host(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<DeleteResponse>> {
    deleted(state.store.delete_host(&ip).await, || format!("host {} could not be deleted", ip))
}

/// A single scan
pub async fn get_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<HostLookup>> {
    found(state.store.get_host_by_scan_id(&scan_id).await, || {
        format!("scan {}", scan_id)
    })
}

/// Delete a single scan
pub async fn delete_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    deleted(state.store.delete_scan(&scan_id).await, || {
        format!("scan {} could not be deleted", scan_id)
    })
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

/// Latest screenshots across all hosts
pub async fn list_screenshots(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PageParams>,
) -> Result<Json<ScreenshotPage>> {
    Ok(Json(
        state
            .store
            .get_current_screenshots(params.limit(), params.offset())
            .await,
    ))
}

fn found(lookup: HostLookup, what: impl FnOnce() -> String) -> Result<Json<HostLookup>> {
    if lookup.record.is_none() {
        return Err(AppError::NotFound(what()));
    }
    Ok(Json(lookup))
}

// The store reports a failed delete as `None`; by then it has already
// logged the cause.
fn deleted(count: Option<u64>, what: impl FnOnce() -> String) -> Result<Json<DeleteResponse>> {
    count
        .map(|deleted| Json(DeleteResponse { deleted }))
        .ok_or_else(|| AppError::Unavailable(what()))
}
