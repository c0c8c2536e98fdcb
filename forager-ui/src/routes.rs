//! API route handlers serving the ingest buffers.

use std::collections::VecDeque;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::{Deserialize, Serialize};

use forager::core::types::{Event, LoopSnapshot};

use crate::state::{AppState, BUFFER_CAPACITY, MetricRecord};

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/snapshots", get(snapshots))
        .route("/metrics", get(metrics))
        .route("/events", get(events))
        .route("/latest", get(latest))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ListResponse<T> {
    items: Vec<T>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    snapshots: usize,
}

/// GET /api/health - liveness plus the current buffer depth.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let buffers = state.buffers.read().await;
    Json(HealthResponse {
        status: "ok",
        snapshots: buffers.snapshots.len(),
    })
}

/// GET /api/snapshots?limit=N - the newest full snapshots, oldest first.
async fn snapshots(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ListResponse<LoopSnapshot>> {
    let limit = clamp_limit(query.limit, 50);
    let buffers = state.buffers.read().await;
    Json(ListResponse {
        items: tail(&buffers.snapshots, limit),
    })
}

/// GET /api/metrics?limit=N - per-tick timeline records, oldest first.
async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ListResponse<MetricRecord>> {
    let limit = clamp_limit(query.limit, 200);
    let buffers = state.buffers.read().await;
    Json(ListResponse {
        items: tail(&buffers.metrics, limit),
    })
}

/// GET /api/events?limit=N - events flattened across snapshots, oldest first.
async fn events(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ListResponse<Event>> {
    let limit = clamp_limit(query.limit, 200);
    let buffers = state.buffers.read().await;
    Json(ListResponse {
        items: tail(&buffers.events, limit),
    })
}

/// GET /api/latest - the newest buffered snapshot, or 404 before the first
/// tick arrives.
async fn latest(State(state): State<AppState>) -> Result<Json<LoopSnapshot>, StatusCode> {
    let buffers = state.buffers.read().await;
    buffers
        .snapshots
        .back()
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, BUFFER_CAPACITY)
}

/// Last `limit` entries of a ring buffer, preserving insertion order.
fn tail<T: Clone>(buffer: &VecDeque<T>, limit: usize) -> Vec<T> {
    let skip = buffer.len().saturating_sub(limit);
    buffer.iter().skip(skip).cloned().collect()
}
