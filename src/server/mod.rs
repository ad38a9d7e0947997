//! HTTP server: axum router for the viewer page, live feed, recording control
//! and recorded file access.
//!
//! - `GET /` - viewer page
//! - `GET /video_feed` - multipart JPEG live feed
//! - `POST /record` - toggle recording
//! - `GET /recordings/*filename` - recorded videos, with range support

pub mod files;
mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

pub use handlers::{control_response, ControlResponse};

use crate::stream::StreamCoordinator;

/// Errors from running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Listen address settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let text = format!("{}:{}", self.host, self.port);
        text.parse().map_err(|_| ServerError::InvalidAddress(text))
    }
}

/// Shared state for the handlers.
pub struct AppState {
    pub coordinator: Arc<StreamCoordinator>,
    pub recordings_dir: PathBuf,
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/video_feed", get(handlers::video_feed))
        .route("/record", post(handlers::record))
        .route("/recordings/*filename", get(handlers::serve_recording))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// Open feed streams are ended once shutdown begins so the graceful drain
/// can complete.
pub async fn serve<F>(
    coordinator: Arc<StreamCoordinator>,
    settings: &ServerSettings,
    recordings_dir: PathBuf,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = settings.socket_addr()?;
    let state = Arc::new(AppState {
        coordinator: Arc::clone(&coordinator),
        recordings_dir,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    log::info!("Serving on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            log::info!("Shutting down");
            coordinator.begin_shutdown();
        })
        .await?;

    Ok(())
}
