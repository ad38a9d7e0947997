//! Route handlers.

use std::convert::Infallible;
use std::sync::Arc;
use std::thread;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::files::{content_type_for, resolve_recording};
use super::AppState;
use crate::recording::{format_duration, HistoryEntry, RecordingError};
use crate::stream::{ToggleOutcome, ToggleResult, CONTENT_TYPE};

/// Chunks buffered per feed client before the pull thread waits.
const FEED_BUFFER: usize = 2;

const INDEX_HTML: &str = include_str!("index.html");

/// Body of the control endpoint's response.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub history: Vec<HistoryEntry>,
}

/// GET / - the viewer page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /video_feed - endless multipart JPEG stream
///
/// Each client gets its own pull thread; it ends when the client goes away
/// or the server shuts down.
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(FEED_BUFFER);
    let coordinator = Arc::clone(&state.coordinator);
    let closed = tx.clone();

    let spawned = thread::Builder::new()
        .name("feed-client".into())
        .spawn(move || {
            let chunks = coordinator.chunks().cancel_when(move || closed.is_closed());
            for chunk in chunks {
                if tx.blocking_send(chunk).is_err() {
                    break;
                }
            }
            log::debug!("Feed client finished");
        });
    if let Err(e) = spawned {
        log::error!("Failed to start feed thread: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start stream").into_response();
    }

    let chunks = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<Bytes, Infallible>(chunk), rx))
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(chunks),
    )
        .into_response()
}

/// POST /record - start or stop recording
pub async fn record(State(state): State<Arc<AppState>>) -> Response {
    let coordinator = Arc::clone(&state.coordinator);
    match tokio::task::spawn_blocking(move || coordinator.toggle_recording()).await {
        Ok(outcome) => {
            let (status, body) = control_response(outcome);
            (status, Json(body)).into_response()
        }
        Err(e) => {
            log::error!("Recording toggle task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Recording toggle failed").into_response()
        }
    }
}

/// Map a toggle outcome to the control endpoint's status and body.
pub fn control_response(outcome: ToggleOutcome) -> (StatusCode, ControlResponse) {
    let ToggleOutcome { result, history } = outcome;
    match result {
        ToggleResult::Started { .. } => (
            StatusCode::OK,
            ControlResponse {
                status: "recording",
                video_path: None,
                duration: None,
                error: None,
                history,
            },
        ),
        ToggleResult::Stopped(report) => (
            StatusCode::OK,
            ControlResponse {
                status: "stopped",
                video_path: Some(report.filename),
                duration: Some(format_duration(report.duration)),
                error: None,
                history,
            },
        ),
        ToggleResult::Failed(e) => {
            let status = match e {
                RecordingError::NoFrameAvailable => StatusCode::BAD_REQUEST,
                RecordingError::AlreadyRecording | RecordingError::NotRecording => {
                    StatusCode::CONFLICT
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                ControlResponse {
                    status: "error",
                    video_path: None,
                    duration: None,
                    error: Some(e.to_string()),
                    history,
                },
            )
        }
    }
}

/// GET /recordings/*filename - serve a finished recording
pub async fn serve_recording(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    request: Request,
) -> Response {
    let path = match resolve_recording(&state.recordings_dir, &filename) {
        Some(path) => path,
        None => return (StatusCode::NOT_FOUND, "Video file not found.").into_response(),
    };

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&path)),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
}
