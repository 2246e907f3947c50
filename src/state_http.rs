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

use crate::handler::{BaseHandler, ReadOutcome, StateError};
use crate::observability::{health, metrics};
use crate::storage::common::is_valid_state_id;
use axum::{
    body::Body,
    extract::{MatchedPath, Path, Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::services::ServeDir;

const TEXT_PLAIN: &str = "text/plain";

/// HTTP front end for the state service.
#[derive(Clone)]
pub struct StateHttpHandler {
    handler: Arc<BaseHandler>,
    www_dir: Option<PathBuf>,
}

impl StateHttpHandler {
    pub fn new(handler: BaseHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            www_dir: None,
        }
    }

    /// Serve static files from `dir` for paths outside `/states`.
    pub fn with_www_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.www_dir = Some(dir.into());
        self
    }

    pub fn router(self) -> Router {
        let mut router = Router::new()
            .route(
                "/states",
                post(create_state).head(method_not_allowed),
            )
            // A wildcard never matches an empty segment.
            .route(
                "/states/",
                get(empty_state_id)
                    .put(empty_state_id)
                    .head(method_not_allowed),
            )
            .route(
                "/states/*id",
                get(get_state).put(put_state).head(method_not_allowed),
            )
            .route("/_health", get(health_handler))
            .route("/_ready", get(ready_handler))
            .route("/_metrics", get(metrics_handler));

        if let Some(dir) = self.www_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        router
            .layer(middleware::from_fn(track_metrics))
            .with_state(self.handler)
    }
}

#[derive(Debug)]
enum StateHttpError {
    MalformedId(String),
    MissingPrecondition,
    InvalidHeader(HeaderName),
    NotFound(String),
    PreconditionFailed,
    Internal(String),
}

impl From<StateError> for StateHttpError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(id) => StateHttpError::NotFound(id),
            StateError::PreconditionFailed { .. } => StateHttpError::PreconditionFailed,
            StateError::IdTaken(_) | StateError::Storage(_) => {
                tracing::error!("state operation failed: {e}");
                metrics::increment_error("StorageError", "http");
                StateHttpError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for StateHttpError {
    fn into_response(self) -> Response {
        match self {
            StateHttpError::MalformedId(id) => {
                (StatusCode::BAD_REQUEST, format!("Malformed state id: {}", id)).into_response()
            }
            StateHttpError::MissingPrecondition => {
                (StatusCode::BAD_REQUEST, "Missing If-Match header").into_response()
            }
            StateHttpError::InvalidHeader(name) => {
                (StatusCode::BAD_REQUEST, format!("Invalid {} header", name)).into_response()
            }
            StateHttpError::NotFound(id) => {
                (StatusCode::NOT_FOUND, format!("State not found: {}", id)).into_response()
            }
            StateHttpError::PreconditionFailed => StatusCode::PRECONDITION_FAILED.into_response(),
            StateHttpError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}

fn parse_state_id(raw: String) -> Result<String, StateHttpError> {
    if is_valid_state_id(&raw) {
        Ok(raw)
    } else {
        Err(StateHttpError::MalformedId(raw))
    }
}

/// Header value as a string; empty values count as absent.
fn header_str(headers: &HeaderMap, name: HeaderName) -> Result<Option<String>, StateHttpError> {
    match headers.get(&name) {
        None => Ok(None),
        Some(v) => {
            let s = v.to_str().map_err(|_| StateHttpError::InvalidHeader(name))?;
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
    }
}

/// POST /states - Create a state from the request body
async fn create_state(
    State(handler): State<Arc<BaseHandler>>,
    body: Bytes,
) -> Result<impl IntoResponse, StateHttpError> {
    let id = handler.create_state(body).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)], id))
}

/// GET /states/{id} - Read a state, long-polling on If-None-Match
async fn get_state(
    State(handler): State<Arc<BaseHandler>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StateHttpError> {
    let id = parse_state_id(id)?;
    let if_none_match = header_str(&headers, header::IF_NONE_MATCH)?;

    match handler.read_state(&id, if_none_match.as_deref()).await? {
        ReadOutcome::NotModified => Ok(StatusCode::NOT_MODIFIED.into_response()),
        ReadOutcome::Current { data, etag } => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, TEXT_PLAIN.to_string()), (header::ETAG, etag)],
            Body::from(data),
        )
            .into_response()),
    }
}

/// PUT /states/{id} - Replace a state; If-Match is mandatory
async fn put_state(
    State(handler): State<Arc<BaseHandler>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, StateHttpError> {
    let id = parse_state_id(id)?;
    let if_match =
        header_str(&headers, header::IF_MATCH)?.ok_or(StateHttpError::MissingPrecondition)?;

    match handler.compare_and_swap(&id, &if_match, body).await {
        Err(StateError::PreconditionFailed { current, .. }) => {
            tracing::info!(state_id = %id, expected = %if_match, %current, "rejected stale write");
            Err(StateHttpError::PreconditionFailed)
        }
        other => {
            other?;
            Ok(StatusCode::OK)
        }
    }
}

async fn empty_state_id() -> StateHttpError {
    StateHttpError::MalformedId(String::new())
}

async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// GET /_health - Liveness
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /_ready - Store readiness
async fn ready_handler(State(handler): State<Arc<BaseHandler>>) -> impl IntoResponse {
    let status = health::get_health_status(handler.store()).await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// GET /_metrics - Prometheus exposition
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// Counts a request in `concurrent_requests` for as long as it lives, so a
/// request dropped mid-flight (a long-poll client hanging up) is still
/// subtracted.
struct InFlight {
    protocol: &'static str,
}

impl InFlight {
    fn enter(protocol: &'static str) -> Self {
        metrics::inc_concurrent_requests(protocol);
        Self { protocol }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::dec_concurrent_requests(self.protocol);
    }
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "static".to_string());

    let in_flight = InFlight::enter("http");
    let response = next.run(req).await;
    drop(in_flight);

    let status = response.status().as_u16().to_string();
    metrics::increment_http_request(&method, &endpoint, &status);
    metrics::record_http_duration(&method, &endpoint, &status, start.elapsed().as_secs_f64());
    tracing::debug!(%method, %endpoint, %status, "request served");
    response
}
