//! InferenceClient - sends frames to a detection model over HTTP and draws
//! the returned boxes.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::retry::{
    calculate_backoff, is_transient_network_error, is_transient_status, DEFAULT_BACKOFF_BASE,
    DEFAULT_BACKOFF_MAX, DEFAULT_NETWORK_RETRIES,
};
use super::{Overlay, OverlayError, OverlaySettings};
use crate::camera::{draw_rect_outline, encode_jpeg, Frame};

/// JPEG quality of the image sent to the model.
const REQUEST_JPEG_QUALITY: u8 = 90;

/// Connection timeout for requests to the model.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Box outline color.
const BOX_COLOR: [u8; 3] = [0, 255, 0];

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    /// Base64-encoded JPEG
    image: &'a str,
    width: u32,
    height: u32,
}

/// One object found by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub score: f64,
    /// `[x1, y1, x2, y2]` in frame pixels
    pub bbox: [f64; 4],
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Blocking client for the inference model.
///
/// Must be built, used and dropped outside an async context.
pub struct InferenceClient {
    address: String,
    line_width: u32,
    max_retries: u32,
    http_client: reqwest::blocking::Client,
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("address", &self.address)
            .field("line_width", &self.line_width)
            .finish_non_exhaustive()
    }
}

impl InferenceClient {
    /// Create a client from overlay settings.
    ///
    /// # Errors
    ///
    /// Returns `OverlayError::MissingAddress` when no model address is set.
    pub fn new(settings: &OverlaySettings) -> Result<Self, OverlayError> {
        let address = settings
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(OverlayError::MissingAddress)?
            .to_string();

        let http_client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            address,
            line_width: settings.line_width,
            max_retries: DEFAULT_NETWORK_RETRIES,
            http_client,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Ask the model for detections in `frame`.
    ///
    /// Transient network failures are retried with a short backoff.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, OverlayError> {
        let jpeg = encode_jpeg(frame, REQUEST_JPEG_QUALITY)?;
        let image = STANDARD.encode(&jpeg);
        let body = InferenceRequest {
            image: &image,
            width: frame.width,
            height: frame.height,
        };

        let mut attempt = 0;
        loop {
            match self.send(&body) {
                Ok(detections) => return Ok(detections),
                Err(e) if attempt < self.max_retries && e.is_transient() => {
                    let delay = calculate_backoff(attempt, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX);
                    log::debug!("Inference request failed ({}), retrying in {:?}", e, delay);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send(&self, body: &InferenceRequest<'_>) -> Result<Vec<Detection>, OverlayError> {
        let response = self.http_client.post(&self.address).json(body).send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OverlayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: InferenceResponse = response.json()?;
        log::debug!("Model returned {} detection(s): {:?}", parsed.detections.len(), parsed.detections);
        Ok(parsed.detections)
    }
}

/// Draw each detection's box outline into the frame.
pub fn draw_detections(frame: &mut Frame, detections: &[Detection], line_width: u32) {
    for detection in detections {
        let [x1, y1, x2, y2] = detection.bbox;
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            continue;
        }
        draw_rect_outline(
            frame,
            (x1.round() as i64, y1.round() as i64),
            (x2.round() as i64, y2.round() as i64),
            BOX_COLOR,
            line_width,
        );
    }
}

impl Overlay for InferenceClient {
    fn apply(&self, mut frame: Frame) -> Result<Frame, OverlayError> {
        let detections = self.detect(&frame)?;
        draw_detections(&mut frame, &detections, self.line_width);
        Ok(frame)
    }
}

impl OverlayError {
    fn is_transient(&self) -> bool {
        match self {
            OverlayError::Http(e) => is_transient_network_error(e),
            OverlayError::Api { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}
