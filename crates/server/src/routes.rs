//! HTTP surface for optimization runs and run history.
//!
//! Every route resolves the bearer token itself before doing any work, so an
//! unauthenticated request never reaches the pipeline or the database.
//! Failures cross the wire as a generic message; the detail stays in the logs.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;

use revvy_agent::PipelineEvent;
use revvy_core::{OptimizeReport, OptimizeRequest};
use revvy_db::OptimizationRun;

use crate::auth::{bearer_token, SessionVerifier};
use crate::service::{OptimizeService, USER_SAFE_ERROR};

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct ApiState {
    pub service: OptimizeService,
    pub verifier: Arc<dyn SessionVerifier>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/optimize", post(optimize))
        .route("/api/v1/optimize/stream", post(optimize_stream))
        .route("/api/v1/history", get(history_index))
        .route("/api/v1/history/{id}", get(history_entry))
        .with_state(state)
}

async fn optimize(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeReport>, (StatusCode, Json<ApiError>)> {
    let user_id = authorize(&state, &headers)?;
    let report = state.service.run(user_id, &request).await.map_err(pipeline_error)?;
    Ok(Json(report))
}

async fn optimize_stream(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<OptimizeRequest>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let user_id = authorize(&state, &headers)?;
    let receiver = state.service.stream(user_id, request);
    let stream = ReceiverStream::new(receiver).map(|event| Ok::<_, Infallible>(sse_frame(event)));

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    // Proxies must not buffer the event stream.
    response.headers_mut().insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    Ok(response)
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct HistoryPage {
    items: Vec<OptimizationRun>,
    count: usize,
    offset: i64,
    limit: i64,
}

async fn history_index(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, (StatusCode, Json<ApiError>)> {
    let user_id = authorize(&state, &headers)?;

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(bad_request("limit must be between 1 and 100"));
    }
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(bad_request("offset must not be negative"));
    }

    let items = state
        .service
        .history(user_id, limit, offset)
        .await
        .map_err(repository_error)?;
    Ok(Json(HistoryPage { count: items.len(), items, offset, limit }))
}

async fn history_entry(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<OptimizationRun>, (StatusCode, Json<ApiError>)> {
    let user_id = authorize(&state, &headers)?;
    match state.service.history_entry(user_id, id).await.map_err(repository_error)? {
        Some(run) => Ok(Json(run)),
        // Records owned by other users are indistinguishable from absent ones.
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ApiError { error: "Optimization record not found".to_string() }),
        )),
    }
}

fn authorize(
    state: &ApiState,
    headers: &HeaderMap,
) -> Result<i64, (StatusCode, Json<ApiError>)> {
    let token = bearer_token(headers).ok_or_else(|| unauthorized("missing bearer token"))?;
    state
        .verifier
        .verify(token)
        .ok_or_else(|| unauthorized("invalid bearer token"))
}

fn unauthorized(message: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::UNAUTHORIZED, Json(ApiError { error: message.to_string() }))
}

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.to_string() }))
}

fn pipeline_error(
    failure: revvy_agent::PipelineError,
) -> (StatusCode, Json<ApiError>) {
    error!(error = %failure, "optimization pipeline failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: USER_SAFE_ERROR.to_string() }),
    )
}

fn repository_error(
    failure: revvy_db::RepositoryError,
) -> (StatusCode, Json<ApiError>) {
    error!(error = %failure, "history query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: USER_SAFE_ERROR.to_string() }),
    )
}

fn sse_frame(event: PipelineEvent) -> Event {
    Event::default().data(frame_payload(&event))
}

fn frame_payload(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::Node { node, data } => {
            json!({ "node": node.as_str(), "data": data }).to_string()
        }
        PipelineEvent::Result { report } => {
            json!({ "type": "result", "result": report }).to_string()
        }
        PipelineEvent::Error { message } => json!({ "error": message }).to_string(),
        PipelineEvent::Done => "[DONE]".to_string(),
    }
}
