use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::services::CommentaryEngine;

pub struct AppState {
    pub engine: Arc<CommentaryEngine>,
    pub audio_dir: PathBuf,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/events", get(events))
        .route("/status", get(status))
        .route("/watch", post(watch))
        .route("/stop", post(stop))
        .route("/audio/{file}", get(audio))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>, bind: &str) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("🌐 API Server listening on {}", bind);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| EngineError::Server(e.to_string()))
}

/// Server-sent events: one viewer connection per client, dropped with it
async fn events(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let viewer = state.engine.hub().connect();
    let stream = stream::unfold(viewer, |mut viewer| async move {
        let msg = viewer.recv().await?;
        let event = SseEvent::default().json_data(&msg).unwrap_or_else(|e| {
            warn!("⚠️ Could not encode broadcast: {}", e);
            SseEvent::default().comment("encode error")
        });
        Some((Ok(event), viewer))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.status())
}

#[derive(Deserialize)]
struct WatchRequest {
    asset: String,
}

async fn watch(State(state): State<Arc<AppState>>, Json(req): Json<WatchRequest>) -> impl IntoResponse {
    match state.engine.retarget(&req.asset).await {
        Ok(()) => Json(json!({"status": "watching", "asset": req.asset.trim()})).into_response(),
        Err(e @ EngineError::MissingAsset) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response()
        }
        Err(e) => {
            error!("❌ Retarget to {} failed: {}", req.asset.trim(), e);
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.stop().await {
        Ok(()) => Json(json!({"status": "stopped"})).into_response(),
        Err(e) => (StatusCode::CONFLICT, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

/// Only bare `.mp3` file names are served, nothing outside the audio dir
pub fn audio_file_name(raw: &str) -> Option<&str> {
    let plain = !raw.is_empty() && !raw.contains(['/', '\\']) && !raw.contains("..");
    (plain && raw.ends_with(".mp3")).then_some(raw)
}

async fn audio(State(state): State<Arc<AppState>>, Path(file): Path<String>) -> impl IntoResponse {
    let Some(name) = audio_file_name(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(state.audio_dir.join(name)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}
