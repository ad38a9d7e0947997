//! Optional per-frame overlay.
//!
//! An [`Overlay`] transforms each frame before it is encoded for the live
//! feed and handed to the recorder. [`InferenceClient`] is the HTTP-backed
//! implementation that draws detection boxes from a remote model.

mod client;
mod retry;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::camera::Frame;

pub use client::{draw_detections, Detection, InferenceClient};
pub use retry::{calculate_backoff, is_transient_network_error, is_transient_status};

/// A synchronous frame transformation. May block on network I/O.
pub trait Overlay: Send + Sync {
    fn apply(&self, frame: Frame) -> Result<Frame, OverlayError>;
}

/// Errors from applying an overlay.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("Overlay is enabled but no model address is configured")]
    MissingAddress,
    #[error("Failed to encode frame for inference: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Inference request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Inference model returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("{0}")]
    Other(String),
}

/// Settings for the inference overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub enabled: bool,
    /// Model endpoint URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Per-request timeout, in milliseconds
    pub timeout_ms: u64,
    /// Box outline thickness in pixels
    pub line_width: u32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            address: None,
            timeout_ms: 2000,
            line_width: 2,
        }
    }
}

impl OverlaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}
