//! FFmpeg-backed capture device.
//!
//! Runs ffmpeg against a platform capture input (v4l2, avfoundation, dshow)
//! and reads fixed-size rawvideo frames from its stdout.

use std::io::Read;
use std::process::ChildStdout;

use super::types::{CameraError, CameraSettings, Frame, FrameFormat};
use super::CaptureDevice;
use crate::pipeline::{Pipeline, PipelineError};

/// Capture device reading rawvideo frames from an ffmpeg process.
pub struct FfmpegDevice {
    device: String,
    width: u32,
    height: u32,
    framerate: Option<u32>,
    pipeline: Option<Pipeline>,
    stdout: Option<ChildStdout>,
    /// Frame read while opening, returned by the first `read_frame`
    pending: Option<Frame>,
    read_failed: bool,
}

impl FfmpegDevice {
    /// Start the capture process and wait for its first frame.
    ///
    /// # Errors
    /// * `CameraError::FfmpegNotFound` - ffmpeg is not installed
    /// * `CameraError::OpenFailed` - the process exited without producing a frame
    pub fn open(settings: &CameraSettings) -> Result<Self, CameraError> {
        let args = capture_args(settings);
        let mut pipeline = Pipeline::spawn_reader("capture", "ffmpeg", &args).map_err(|e| match e {
            PipelineError::NotFound(_) => CameraError::FfmpegNotFound,
            other => CameraError::OpenFailed {
                device: settings.device.clone(),
                message: other.to_string(),
            },
        })?;

        let stdout = pipeline.take_stdout().ok_or_else(|| CameraError::OpenFailed {
            device: settings.device.clone(),
            message: "capture process has no stdout".to_string(),
        })?;

        let mut device = Self {
            device: settings.device.clone(),
            width: settings.resolution.width,
            height: settings.resolution.height,
            framerate: settings.framerate,
            pipeline: Some(pipeline),
            stdout: Some(stdout),
            pending: None,
            read_failed: false,
        };

        match device.read_raw() {
            Ok(frame) => {
                log::info!(
                    "Opened camera '{}' at {}x{}",
                    device.device,
                    device.width,
                    device.height
                );
                device.pending = Some(frame);
                Ok(device)
            }
            Err(e) => {
                let mut message = e.to_string();
                if let Some(mut pipeline) = device.pipeline.take() {
                    pipeline.kill();
                    let tail = pipeline.take_stderr_tail();
                    if !tail.is_empty() {
                        message = tail.join("\n");
                    }
                }
                device.stdout = None;
                Err(CameraError::OpenFailed {
                    device: settings.device.clone(),
                    message,
                })
            }
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * FrameFormat::Rgb.bytes_per_pixel()
    }

    fn read_raw(&mut self) -> Result<Frame, CameraError> {
        let len = self.frame_len();
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
        let mut data = vec![0u8; len];
        stdout.read_exact(&mut data)?;
        Frame::from_rgb(self.width, self.height, data)
    }
}

impl CaptureDevice for FfmpegDevice {
    fn read_frame(&mut self) -> Option<Frame> {
        if let Some(frame) = self.pending.take() {
            return Some(frame);
        }
        match self.read_raw() {
            Ok(frame) => {
                self.read_failed = false;
                Some(frame)
            }
            Err(e) => {
                if !self.read_failed {
                    log::warn!("Frame read from '{}' failed: {}", self.device, e);
                    self.read_failed = true;
                }
                None
            }
        }
    }

    fn nominal_fps(&self) -> Option<f64> {
        self.framerate.map(f64::from)
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.kill();
        }
    }

    fn describe(&self) -> String {
        format!("ffmpeg:{}", self.device)
    }
}

/// FFmpeg arguments for capturing `settings.device` as rawvideo on stdout.
pub fn capture_args(settings: &CameraSettings) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        settings.input_format.clone(),
    ];
    if let Some(fps) = settings.framerate {
        args.push("-framerate".to_string());
        args.push(fps.to_string());
    }
    args.push("-i".to_string());
    args.push(settings.device.clone());

    let mut filters = Vec::new();
    if settings.mirror {
        filters.push("hflip".to_string());
    }
    filters.push(format!(
        "scale={}:{}",
        settings.resolution.width, settings.resolution.height
    ));
    args.push("-vf".to_string());
    args.push(filters.join(","));

    args.extend(
        ["-f", "rawvideo", "-pix_fmt", FrameFormat::Rgb.ffmpeg_pix_fmt(), "-"]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}
