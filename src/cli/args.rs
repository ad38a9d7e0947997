//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::camera::{CaptureBackend, Resolution};
use crate::config::Config;

/// Serve a live MJPEG camera feed with on-demand recording
#[derive(Parser, Debug)]
#[command(name = "vision-stream")]
#[command(version, about = "Live camera feed over HTTP with on-demand recording", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Capture device (e.g. /dev/video0)
    #[arg(long, short)]
    pub device: Option<String>,

    /// Output resolution (WIDTHxHEIGHT)
    #[arg(long, value_parser = parse_resolution)]
    pub resolution: Option<Resolution>,

    /// Requested capture frame rate (1-120)
    #[arg(long, value_parser = parse_framerate)]
    pub framerate: Option<u32>,

    /// Mirror camera horizontally
    #[arg(long)]
    pub mirror: bool,

    /// Use a synthetic test pattern instead of a camera
    #[arg(long)]
    pub test_pattern: bool,

    /// Directory recordings are written to
    #[arg(long)]
    pub recordings_dir: Option<PathBuf>,

    /// JPEG quality for the live feed (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// Inference model endpoint; enables the detection overlay
    #[arg(long)]
    pub model_address: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Create default config file
    Init,
}

impl Args {
    /// Override file settings with the flags that were given.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(device) = &self.device {
            config.camera.device = device.clone();
        }
        if let Some(resolution) = self.resolution {
            config.camera.width = resolution.width;
            config.camera.height = resolution.height;
        }
        if let Some(framerate) = self.framerate {
            config.camera.framerate = Some(framerate);
        }
        if self.mirror {
            config.camera.mirror = true;
        }
        if self.test_pattern {
            config.camera.backend = CaptureBackend::TestPattern;
        }
        if let Some(dir) = &self.recordings_dir {
            config.recording.dir = dir.clone();
        }
        if let Some(quality) = self.jpeg_quality {
            config.stream.jpeg_quality = quality;
        }
        if let Some(address) = &self.model_address {
            config.overlay.address = Some(address.clone());
            config.overlay.enabled = true;
        }
    }
}

/// Parse and validate resolution (WIDTHxHEIGHT format)
pub fn parse_resolution(s: &str) -> Result<Resolution, String> {
    let (width, height) = s.split_once(['x', 'X']).ok_or_else(|| {
        format!(
            "Invalid resolution format '{}'. Use WIDTHxHEIGHT (e.g., 640x480)",
            s
        )
    })?;
    let width: u32 = width
        .parse()
        .map_err(|_| format!("Invalid width '{}' in resolution", width))?;
    let height: u32 = height
        .parse()
        .map_err(|_| format!("Invalid height '{}' in resolution", height))?;
    if width == 0 || height == 0 {
        return Err("Resolution width and height must be greater than 0".to_string());
    }
    if width > 7680 || height > 4320 {
        return Err("Resolution exceeds maximum supported (7680x4320)".to_string());
    }
    Ok(Resolution { width, height })
}

/// Parse and validate framerate (1-120 fps)
pub fn parse_framerate(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid framerate", s))?;
    if !(1..=120).contains(&fps) {
        return Err(format!(
            "Framerate must be between 1 and 120 fps, got {}",
            fps
        ));
    }
    Ok(fps)
}
