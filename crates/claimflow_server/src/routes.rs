//! HTTP routes.
//!
//! | Method | Path                          | Handler                 |
//! |--------|-------------------------------|-------------------------|
//! | GET    | `/`                           | service banner          |
//! | GET    | `/health`                     | liveness                |
//! | POST   | `/api`                        | enqueue a submission    |
//! | GET    | `/claims`                     | paginated listing       |
//! | GET    | `/claims/search`              | customer / description  |
//! | GET    | `/claims/{id}`                | one claim               |
//! | GET    | `/claims/{id}/status-history` | recorded transitions    |
//! | PUT    | `/claims/{id}/status`         | replace status          |
//! | PATCH  | `/claims/{id}/status`         | update status, tracked  |
//! | GET    | `/stats`                      | aggregates from disk    |
//!
//! Errors are returned as `{"error": "<message>"}`.

use crate::error::{ServerError, ServerResult};
use crate::handler::{RequestHandler, StatusBody, StatusUpdateResponse};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use claimflow_core::HistoryMode;
use claimflow_protocol::ClaimSubmission;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

type SharedHandler = Arc<RequestHandler>;

/// Query parameters of `GET /claims`.
#[derive(Debug, Default, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

/// Query parameters of `GET /claims/search`.
#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        json_error(status, &self.to_string())
    }
}

/// Runs a handler call on the blocking pool.
async fn blocking<T, F>(handler: SharedHandler, f: F) -> ServerResult<T>
where
    F: FnOnce(&RequestHandler) -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&handler))
        .await
        .map_err(|e| ServerError::Internal(format!("task join error: {e}")))?
}

/// Builds the router over a shared handler.
pub fn router(handler: SharedHandler) -> Router {
    let max_body_size = handler.context().config.max_body_size;

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api", post(handle_submit))
        .route("/claims", get(handle_list_claims))
        .route("/claims/search", get(handle_search))
        .route("/claims/{id}", get(handle_get_claim))
        .route("/claims/{id}/status-history", get(handle_status_history))
        .route(
            "/claims/{id}/status",
            put(handle_replace_status).patch(handle_track_status),
        )
        .route("/stats", get(handle_stats))
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(handler)
}

async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /
async fn handle_root(State(handler): State<SharedHandler>) -> impl IntoResponse {
    Json(handler.banner())
}

/// GET /health
async fn handle_health(State(handler): State<SharedHandler>) -> impl IntoResponse {
    Json(handler.health())
}

/// POST /api
async fn handle_submit(
    State(handler): State<SharedHandler>,
    payload: Result<Json<ClaimSubmission>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let Json(submission) = payload?;
    let response = blocking(handler, move |h| h.submit(submission)).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /claims
async fn handle_list_claims(
    State(handler): State<SharedHandler>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ServerResult<impl IntoResponse> {
    let Query(params) = params?;
    Ok(Json(handler.list_claims(params.limit, params.offset)))
}

/// GET /claims/search
async fn handle_search(
    State(handler): State<SharedHandler>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ServerResult<impl IntoResponse> {
    let Query(params) = params?;
    Ok(Json(handler.search(&params.q)))
}

/// GET /claims/{id}
async fn handle_get_claim(
    State(handler): State<SharedHandler>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    Ok(Json(handler.get_claim(&id)?))
}

/// GET /claims/{id}/status-history
async fn handle_status_history(
    State(handler): State<SharedHandler>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    Ok(Json(handler.status_history(&id)?))
}

/// PUT /claims/{id}/status
async fn handle_replace_status(
    State(handler): State<SharedHandler>,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    update_status(handler, id, body, HistoryMode::Replace).await
}

/// PATCH /claims/{id}/status
async fn handle_track_status(
    State(handler): State<SharedHandler>,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    update_status(handler, id, body, HistoryMode::Track).await
}

async fn update_status(
    handler: SharedHandler,
    id: String,
    body: Result<Json<StatusBody>, JsonRejection>,
    mode: HistoryMode,
) -> ServerResult<Json<StatusUpdateResponse>> {
    let Json(body) = body?;
    let response = blocking(handler, move |h| h.update_status(&id, body, mode)).await?;
    Ok(Json(response))
}

/// GET /stats
async fn handle_stats(State(handler): State<SharedHandler>) -> ServerResult<impl IntoResponse> {
    Ok(Json(blocking(handler, |h| h.stats()).await?))
}
