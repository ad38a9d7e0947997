//! Frame source: the capture device handle plus a smoothed FPS estimate.

use std::time::Instant;

use super::device::FfmpegDevice;
use super::fps::FpsEstimator;
use super::pattern::TestPattern;
use super::types::{CameraError, CameraSettings, CaptureBackend, Frame};

/// A device that yields one frame per call.
///
/// `read_frame` returning `None` is a transient failure, not end-of-stream.
pub trait CaptureDevice: Send {
    fn read_frame(&mut self) -> Option<Frame>;

    /// Frame rate the device advertises, if known.
    fn nominal_fps(&self) -> Option<f64>;

    /// Release the underlying device. Called at most once by [`FrameSource`].
    fn release(&mut self);

    /// Short description for log messages.
    fn describe(&self) -> String;
}

/// Owns a capture device and measures the rate frames arrive at.
///
/// The device is released by [`close`](FrameSource::close) or on drop,
/// exactly once.
pub struct FrameSource {
    device: Box<dyn CaptureDevice>,
    fps: FpsEstimator,
    closed: bool,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("device", &self.device.describe())
            .field("fps", &self.fps.fps())
            .field("closed", &self.closed)
            .finish()
    }
}

impl FrameSource {
    /// Open the device described by `settings`.
    ///
    /// # Errors
    /// * `CameraError::InvalidSettings` - zero resolution or non-positive default FPS
    /// * `CameraError::FfmpegNotFound` / `CameraError::OpenFailed` - the device can't be opened
    pub fn open(settings: &CameraSettings) -> Result<Self, CameraError> {
        if settings.resolution.width == 0 || settings.resolution.height == 0 {
            return Err(CameraError::InvalidSettings(format!(
                "resolution {} has a zero dimension",
                settings.resolution
            )));
        }
        if !(settings.default_fps.is_finite() && settings.default_fps > 0.0) {
            return Err(CameraError::InvalidSettings(format!(
                "default fps must be positive, got {}",
                settings.default_fps
            )));
        }

        let device: Box<dyn CaptureDevice> = match settings.backend {
            CaptureBackend::Ffmpeg => Box::new(FfmpegDevice::open(settings)?),
            CaptureBackend::TestPattern => {
                let fps = settings
                    .framerate
                    .unwrap_or(settings.default_fps.round() as u32);
                Box::new(TestPattern::new(settings.resolution, fps).with_mirror(settings.mirror))
            }
        };

        Ok(Self::from_device(device, settings.fps_window, settings.default_fps))
    }

    /// Wrap an already opened device.
    ///
    /// The initial estimate is the device's nominal rate, or `default_fps`
    /// when it reports none.
    pub fn from_device(device: Box<dyn CaptureDevice>, fps_window: usize, default_fps: f64) -> Self {
        let nominal = device
            .nominal_fps()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(default_fps);
        log::info!("Frame source {} (nominal {} fps)", device.describe(), nominal);
        Self {
            device,
            fps: FpsEstimator::new(fps_window, nominal, Instant::now()),
            closed: false,
        }
    }

    /// Read the next frame.
    ///
    /// `None` means this read failed; the caller may retry.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        let frame = self.device.read_frame();
        self.fps.tick(Instant::now());
        frame
    }

    /// Smoothed frames-per-second estimate.
    pub fn current_fps(&self) -> f64 {
        self.fps.fps()
    }

    pub fn estimator(&self) -> &FpsEstimator {
        &self.fps
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.device.release();
        log::info!("Released {}", self.device.describe());
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
