use crate::api::{handlers, AppState};
use crate::config::ServerConfig;
use crate::error::AppError;
use axum::{
    http::{header, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Search
        .route("/search", get(handlers::search))
        // Hosts
        .route("/hosts", post(handlers::create_host))
        .route("/hosts/count", get(handlers::count_hosts))
        .route("/hosts/random", get(handlers::random_host))
        .route(
            "/hosts/:ip",
            get(handlers::get_host).delete(handlers::delete_host),
        )
        .route("/hosts/:ip/history", get(handlers::get_host_history))
        .route("/hosts/:ip/screenshots", get(handlers::get_host_screenshots))
        // Scans
        .route(
            "/scans/:scan_id",
            get(handlers::get_scan).delete(handlers::delete_scan),
        )
        .route("/screenshots", get(handlers::list_screenshots))
        .fallback(not_found)
        // Add state
        .with_state(state)
        // Add middleware
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(middleware::map_response(json_error_bodies))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}

/// Give the bare 405 and 408 responses produced by the router and the
/// timeout layer the usual JSON error body
async fn json_error_bodies(method: Method, uri: Uri, response: Response) -> Response {
    let error = match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => {
            AppError::MethodNotAllowed(format!("{} {}", method, uri.path()))
        }
        StatusCode::REQUEST_TIMEOUT => {
            AppError::Timeout(format!("{} {}", method, uri.path()))
        }
        _ => return response,
    };

    let mut rewritten = error.into_response();
    if let Some(allow) = response.headers().get(header::ALLOW) {
        rewritten.headers_mut().insert(header::ALLOW, allow.clone());
    }
    rewritten
}

/// Turn a handler panic into a JSON 500
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(panic = %detail, "Handler panicked");
    AppError::Internal("request handler panicked".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn json_body(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_panic_becomes_json_500() {
        async fn boom() -> &'static str {
            panic!("boom")
        }

        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"]["code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_with_json() {
        async fn slow() -> &'static str {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }

        let app = Router::new()
            .route("/slow", get(slow))
            .layer(TimeoutLayer::new(Duration::from_millis(20)))
            .layer(middleware::map_response(json_error_bodies));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "TIMEOUT");
        assert_eq!(json["error"]["message"], "Operation timed out: GET /slow");
    }
}
