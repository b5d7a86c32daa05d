//! HTTP API.
//!
//! Read endpoints serve the playout snapshot; write endpoints forward
//! commands to the playout task or go straight to the catalog store.
//! Players using the remote output report `ended`/`error` through
//! `/api/v1/output/*`.

use crate::error::PlayoutError;
use crate::model::{Category, ContentItem, PlaybackStats};
use crate::output::OutputEvent;
use crate::playout::{PlayoutCommand, PlayoutHandle, PlayoutSnapshot};
use crate::source::ContentSource;
use crate::store::{CatalogSummary, NewContentItem, PlayRecord, SqliteStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

const DEFAULT_UPCOMING: usize = 5;
const MAX_UPCOMING: usize = 50;
const DEFAULT_PLAYS: u32 = 50;
const MAX_PLAYS: u32 = 500;

#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub playout: PlayoutHandle,
    pub store: Arc<SqliteStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/status", get(status))
        .route("/api/v1/now", get(now_playing))
        .route("/api/v1/upcoming", get(upcoming))
        .route("/api/v1/history", get(history))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/transport/play", post(transport_play))
        .route("/api/v1/transport/pause", post(transport_pause))
        .route("/api/v1/volume", post(set_volume))
        .route("/api/v1/output/ended", post(output_ended))
        .route("/api/v1/output/error", post(output_error))
        .route("/api/v1/listeners/ping", post(listener_ping))
        .route("/api/v1/catalog", get(catalog_list).post(catalog_add))
        .route("/api/v1/catalog/summary", get(catalog_summary))
        .route("/api/v1/catalog/:id", delete(catalog_remove))
        .route("/api/v1/plays", get(recent_plays))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_status(e: &PlayoutError) -> StatusCode {
    match e {
        PlayoutError::SourceUnavailable { .. } | PlayoutError::Storage(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PlayoutError::QueueExhausted => StatusCode::CONFLICT,
        PlayoutError::PlaybackFailure { .. } | PlayoutError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn store_failed(e: PlayoutError) -> StatusCode {
    warn!("catalog request failed: {e}");
    error_status(&e)
}

async fn root() -> &'static str {
    "radio24 engine is running. Try /api/v1/status"
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    #[serde(flatten)]
    playout: PlayoutSnapshot,
    upcoming: Vec<ContentItem>,
    listeners: u32,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snap = state.playout.snapshot().await;
    let listeners = state.store.active_listeners().await.unwrap_or_else(|e| {
        warn!("listener count unavailable: {e}");
        0
    });
    Json(StatusResponse {
        version: state.version.clone(),
        upcoming: snap.upcoming(DEFAULT_UPCOMING),
        listeners,
        playout: snap,
    })
}

async fn now_playing(State(state): State<AppState>) -> Json<Option<ContentItem>> {
    Json(state.playout.snapshot().await.current)
}

#[derive(Deserialize)]
struct UpcomingQuery {
    n: Option<usize>,
}

async fn upcoming(
    State(state): State<AppState>,
    Query(q): Query<UpcomingQuery>,
) -> Json<Vec<ContentItem>> {
    let n = q.n.unwrap_or(DEFAULT_UPCOMING).min(MAX_UPCOMING);
    Json(state.playout.snapshot().await.upcoming(n))
}

async fn history(State(state): State<AppState>) -> Json<Vec<ContentItem>> {
    Json(state.playout.snapshot().await.history)
}

async fn stats(State(state): State<AppState>) -> Json<PlaybackStats> {
    Json(state.playout.snapshot().await.stats)
}

async fn command(state: &AppState, cmd: PlayoutCommand) -> Result<Json<serde_json::Value>, StatusCode> {
    state.playout.send(cmd).await.map_err(|e| {
        warn!("{e}");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(json!({"ok": true})))
}

async fn transport_play(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    command(&state, PlayoutCommand::Play).await
}

async fn transport_pause(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    command(&state, PlayoutCommand::Pause).await
}

#[derive(Deserialize)]
struct VolumeRequest {
    percent: u32,
}

async fn set_volume(
    State(state): State<AppState>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if req.percent > 100 {
        return Err(StatusCode::BAD_REQUEST);
    }
    command(&state, PlayoutCommand::SetVolume(req.percent as u8)).await
}

#[derive(Deserialize)]
struct OutputReport {
    item_id: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn report(state: &AppState, event: OutputEvent) -> Result<Json<serde_json::Value>, StatusCode> {
    state.playout.report(event).await.map_err(|e| {
        warn!("{e}");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(json!({"ok": true})))
}

async fn output_ended(
    State(state): State<AppState>,
    Json(r): Json<OutputReport>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    report(&state, OutputEvent::Ended { item_id: r.item_id }).await
}

async fn output_error(
    State(state): State<AppState>,
    Json(r): Json<OutputReport>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let reason = r.reason.unwrap_or_else(|| "player reported an error".into());
    report(&state, OutputEvent::Errored { item_id: r.item_id, reason }).await
}

#[derive(Deserialize, Default)]
struct PingRequest {
    #[serde(default)]
    session_id: Option<String>,
}

/// Session ids are opaque; a client without one gets a fresh id to reuse.
fn new_session_id() -> String {
    let n: String = std::iter::repeat_with(fastrand::alphanumeric).take(12).collect();
    format!("session_{}", n.to_ascii_lowercase())
}

async fn listener_ping(
    State(state): State<AppState>,
    body: Option<Json<PingRequest>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(new_session_id);

    state.store.touch_listener(&session_id).await.map_err(store_failed)?;
    Ok(Json(json!({"ok": true, "session_id": session_id})))
}

#[derive(Deserialize)]
struct CatalogQuery {
    category: Option<String>,
}

async fn catalog_list(
    State(state): State<AppState>,
    Query(q): Query<CatalogQuery>,
) -> Result<Json<Vec<ContentItem>>, StatusCode> {
    let category = match q.category.as_deref().map(str::parse::<Category>) {
        None => None,
        Some(Ok(c)) => Some(c),
        Some(Err(_)) => return Err(StatusCode::BAD_REQUEST),
    };
    let items = state.store.list_items(category).await.map_err(store_failed)?;
    Ok(Json(items))
}

async fn catalog_add(
    State(state): State<AppState>,
    Json(new): Json<NewContentItem>,
) -> Result<(StatusCode, Json<ContentItem>), StatusCode> {
    if let Err(msg) = new.validate() {
        warn!("rejected catalog item: {msg}");
        return Err(StatusCode::BAD_REQUEST);
    }
    let item = state.store.add_item(new).await.map_err(store_failed)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn catalog_remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    if state.store.deactivate_item(&id).await.map_err(store_failed)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn catalog_summary(State(state): State<AppState>) -> Result<Json<CatalogSummary>, StatusCode> {
    let summary = state.store.summary().await.map_err(store_failed)?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
struct PlaysQuery {
    limit: Option<u32>,
}

async fn recent_plays(
    State(state): State<AppState>,
    Query(q): Query<PlaysQuery>,
) -> Result<Json<Vec<PlayRecord>>, StatusCode> {
    let limit = q.limit.unwrap_or(DEFAULT_PLAYS).min(MAX_PLAYS);
    let plays = state.store.recent_plays(limit).await.map_err(store_failed)?;
    Ok(Json(plays))
}
