//! Core camera types: frames, resolutions, capture settings and errors.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Capture resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Low resolution (320x240)
    pub const LOW: Resolution = Resolution {
        width: 320,
        height: 240,
    };

    /// Medium resolution (640x480), the default
    pub const MEDIUM: Resolution = Resolution {
        width: 640,
        height: 480,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed RGB, 3 bytes per pixel
    Rgb,
}

impl FrameFormat {
    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Rgb => 3,
        }
    }

    /// Name of this layout as understood by ffmpeg's `-pix_fmt`.
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            FrameFormat::Rgb => "rgb24",
        }
    }
}

/// Dimensions of a frame: height, width and channel depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub height: u32,
    pub width: u32,
    pub channels: usize,
}

impl FrameShape {
    /// Size in bytes of one raw frame of this shape.
    pub fn byte_len(&self) -> usize {
        self.height as usize * self.width as usize * self.channels
    }
}

/// A captured frame.
///
/// Frames are handed off by value between the capture device, the stream
/// coordinator and the recording queue; they are never shared.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data, row-major, no padding
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: FrameFormat,
    /// When the frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Build an RGB frame, checking that `data` matches the dimensions.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CameraError> {
        let expected = FrameShape {
            height,
            width,
            channels: FrameFormat::Rgb.bytes_per_pixel(),
        }
        .byte_len();
        if data.len() != expected {
            return Err(CameraError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        })
    }

    /// Get the number of bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape {
            height: self.height,
            width: self.width,
            channels: self.bytes_per_pixel(),
        }
    }

    /// Raw bytes in the layout expected by a rawvideo consumer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Which capture implementation backs a [`FrameSource`](super::FrameSource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureBackend {
    /// Read rawvideo from an ffmpeg capture process
    #[default]
    Ffmpeg,
    /// Synthetic moving gradient, no hardware required
    TestPattern,
}

/// Settings for opening a capture device.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub backend: CaptureBackend,
    /// Device path or name (e.g. `/dev/video0`, `0` for avfoundation)
    pub device: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`)
    pub input_format: String,
    /// Output resolution; frames are scaled to this size
    pub resolution: Resolution,
    /// Requested device frame rate, if any
    pub framerate: Option<u32>,
    /// Mirror horizontally
    pub mirror: bool,
    /// FPS used until real intervals are measured, when the device reports none
    pub default_fps: f64,
    /// Number of inter-frame intervals averaged for the FPS estimate
    pub fps_window: usize,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::default(),
            device: default_device().to_string(),
            input_format: default_input_format().to_string(),
            resolution: Resolution::default(),
            framerate: None,
            mirror: false,
            default_fps: 30.0,
            fps_window: 30,
        }
    }
}

/// Default capture device for the current platform.
pub fn default_device() -> &'static str {
    if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        "video=Integrated Camera"
    } else {
        "/dev/video0"
    }
}

/// Default ffmpeg input format for the current platform.
pub fn default_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

/// Errors that can occur while opening or reading a capture device.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("FFmpeg not found. Install ffmpeg and make sure it is on PATH")]
    FfmpegNotFound,
    #[error("Failed to open camera '{device}': {message}")]
    OpenFailed { device: String, message: String },
    #[error("Invalid camera settings: {0}")]
    InvalidSettings(String),
    #[error("Frame buffer has {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
    #[error("Camera I/O error: {0}")]
    Io(#[from] std::io::Error),
}
