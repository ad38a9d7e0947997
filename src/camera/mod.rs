//! Camera capture: frames, capture devices and the shared frame source.
//!
//! - [`FrameSource`] owns a [`CaptureDevice`] and tracks a smoothed FPS
//! - [`FfmpegDevice`] reads rawvideo from an ffmpeg capture process
//! - [`TestPattern`] synthesizes frames without hardware

mod capture;
mod device;
mod fps;
mod frame_utils;
mod pattern;
mod types;

pub use capture::{CaptureDevice, FrameSource};
pub use device::{capture_args, FfmpegDevice};
pub use fps::FpsEstimator;
pub use frame_utils::{draw_rect_outline, encode_jpeg, mirror_horizontal, MAX_JPEG_QUALITY};
pub use pattern::TestPattern;
pub use types::{
    default_device, default_input_format, CameraError, CameraSettings, CaptureBackend, Frame,
    FrameFormat, FrameShape, Resolution,
};
