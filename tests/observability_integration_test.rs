// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

/// Integration tests for observability features
///
/// These tests verify:
/// - Metrics endpoint returns Prometheus format
/// - Liveness and readiness endpoints
/// - Request and state metrics are recorded
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use stateish::etag::compute_etag;
use stateish::handler::BaseHandler;
use stateish::observability::metrics;
use stateish::state_http::StateHttpHandler;
use stateish::storage::file_store::FileStore;
use stateish::storage::in_memory::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn setup_app() -> Router {
    let store = Arc::new(InMemoryStore::new());
    let base = BaseHandler::new(store).with_poll_timeout(Duration::from_millis(50));
    StateHttpHandler::new(base).router()
}

async fn body_string(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_app();

    // Exercise a create, a stale write and a timed-out poll first.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/states")
                .body(Body::from("a1"))
                .unwrap(),
        )
        .await
        .unwrap();
    let id = body_string(response).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(format!("/states/{id}"))
                .header(header::IF_MATCH, "\"stale\"")
                .body(Body::from("a1b2"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/states/{id}"))
                .header(header::IF_NONE_MATCH, compute_etag(b"a1"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = app
        .oneshot(Request::builder().uri("/_metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body_str = body_string(response).await;

    assert!(body_str.contains("# HELP"));
    assert!(body_str.contains("# TYPE"));
    assert!(body_str.contains("http_requests_total"));
    assert!(body_str.contains("http_request_duration_seconds"));
    assert!(body_str.contains("cas_conflicts_total"));
    assert!(body_str.contains("long_poll_total"));
    assert!(body_str.contains("cached_states"));
}

#[tokio::test]
async fn test_request_metrics_use_route_labels() {
    let app = setup_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/states/0000000000000000abcd")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let count = metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/states/*id", "404"])
        .get();
    assert!(count >= 1.0);
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = setup_app();

    let response = app
        .oneshot(Request::builder().uri("/_health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body_str = body_string(response).await;
    assert!(body_str.contains("\"status\""));
    assert!(body_str.contains("\"ok\""));
    assert!(body_str.contains("\"timestamp\""));
}

#[tokio::test]
async fn test_ready_endpoint_returns_health_status() {
    let app = setup_app();

    let response = app
        .oneshot(Request::builder().uri("/_ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body_str = body_string(response).await;
    assert!(body_str.contains("\"checks\""));
    assert!(body_str.contains("\"store\""));
    assert!(body_str.contains("healthy"));
}

#[tokio::test]
async fn test_ready_endpoint_reports_missing_states_dir() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("states");
    let store = Arc::new(FileStore::new(&root).await.unwrap());
    let app = StateHttpHandler::new(BaseHandler::new(store)).router();
    std::fs::remove_dir_all(&root).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/_ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_string(response).await.contains("unhealthy"));
}

#[test]
fn test_storage_metrics_are_recorded() {
    metrics::record_storage_op("load", "file", 0.001);
    metrics::record_lock_wait(0.0001);

    let output = String::from_utf8(metrics::gather_metrics()).unwrap();
    assert!(output.contains("storage_operation_duration_seconds"));
    assert!(output.contains("cache_lock_wait_duration_seconds"));
}

#[test]
fn test_concurrent_requests_gauge() {
    metrics::inc_concurrent_requests("test");
    metrics::inc_concurrent_requests("test");
    assert_eq!(
        metrics::CONCURRENT_REQUESTS.with_label_values(&["test"]).get(),
        2.0
    );

    metrics::dec_concurrent_requests("test");
    assert_eq!(
        metrics::CONCURRENT_REQUESTS.with_label_values(&["test"]).get(),
        1.0
    );
}

// Tracing initialization is not tested here because the global subscriber
// can only be set once per process.
