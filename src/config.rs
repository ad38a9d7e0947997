//! Configuration file handling for vision-stream.
//!
//! Loads configuration from `<config_dir>/vision-stream/config.toml` or a
//! custom path. Every key is optional; missing keys take their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::camera::{
    default_device, default_input_format, CameraSettings, CaptureBackend, Resolution,
    MAX_JPEG_QUALITY,
};
use crate::overlay::OverlaySettings;
use crate::recording::RecordingSettings;
use crate::server::ServerSettings;
use crate::stream::StreamSettings;

/// Configuration file structure for vision-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub recording: RecordingSettings,
    #[serde(default)]
    pub overlay: OverlaySettings,
}

/// `[camera]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: CaptureBackend,
    pub device: String,
    pub input_format: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
    pub mirror: bool,
    pub default_fps: f64,
    pub fps_window: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let resolution = Resolution::default();
        Self {
            backend: CaptureBackend::default(),
            device: default_device().to_string(),
            input_format: default_input_format().to_string(),
            width: resolution.width,
            height: resolution.height,
            framerate: None,
            mirror: false,
            default_fps: 30.0,
            fps_window: 30,
        }
    }
}

impl CameraConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    pub fn settings(&self) -> CameraSettings {
        CameraSettings {
            backend: self.backend,
            device: self.device.clone(),
            input_format: self.input_format.clone(),
            resolution: self.resolution(),
            framerate: self.framerate,
            mirror: self.mirror,
            default_fps: self.default_fps,
            fps_window: self.fps_window,
        }
    }
}

/// Commented default file written by `config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# vision-stream configuration

[server]
# Listen address
host = "0.0.0.0"
port = 5000

[camera]
# Capture backend: ffmpeg or test-pattern
backend = "ffmpeg"
# Capture device and ffmpeg input format (platform defaults if unset)
# device = "/dev/video0"
# input_format = "v4l2"
# Output size; frames are scaled to this
width = 640
height = 480
# Requested device frame rate
# framerate = 30
# Mirror horizontally
mirror = false
# FPS assumed until real frame intervals are measured
default_fps = 30.0
# Frame intervals averaged for the FPS estimate
fps_window = 30

[stream]
# JPEG quality for the live feed (1-100)
jpeg_quality = 100
# Pause after a failed frame read, in milliseconds
retry_backoff_ms = 10

[recording]
# Where recordings are written
dir = "recordings"
# Start/stop actions kept in the history
history_capacity = 10
# Frames buffered for the encoder before the oldest are dropped
queue_capacity = 256
writer_poll_ms = 1000
# Seconds a stalled writer is waited for on stop
join_timeout_secs = 5
# Seconds the encoder gets to finish the file before it is killed
exit_timeout_secs = 5

[recording.encoder]
program = "ffmpeg"
codec = "libx264"
preset = "ultrafast"
pix_fmt = "yuv420p"
container = "mp4"

[overlay]
# Draw detections from an inference model
enabled = false
# address = "http://localhost:8000/predict"
timeout_ms = 2000
line_width = 2
"#;

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Check values the types alone don't constrain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let quality = self.stream.jpeg_quality;
        if quality == 0 || quality > MAX_JPEG_QUALITY {
            return Err(ConfigError::Invalid(format!(
                "stream.jpeg_quality must be 1-100, got {}",
                quality
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera resolution {}x{} has a zero dimension",
                self.camera.width, self.camera.height
            )));
        }
        if !(self.camera.default_fps.is_finite() && self.camera.default_fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.default_fps must be positive, got {}",
                self.camera.default_fps
            )));
        }
        if self.camera.fps_window == 0 {
            return Err(ConfigError::Invalid("camera.fps_window must be at least 1".into()));
        }
        if self.recording.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "recording.history_capacity must be at least 1".into(),
            ));
        }
        if self.recording.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "recording.queue_capacity must be at least 1".into(),
            ));
        }
        if self.overlay.enabled && self.overlay.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "overlay.enabled requires overlay.address".into(),
            ));
        }
        Ok(())
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the commented default file to `path`, creating parent
    /// directories. Refuses to overwrite an existing file.
    pub fn init_file(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Config file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("vision-stream").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/vision-stream/config.toml")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.stream.jpeg_quality, 100);
        assert_eq!(config.recording.queue_capacity, 256);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 8080\n\n[camera]\nbackend = \"test-pattern\"\nwidth = 320\n\n[recording.encoder]\ncodec = \"libx265\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.camera.backend, CaptureBackend::TestPattern);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.recording.encoder.codec, "libx265");
        assert_eq!(config.recording.encoder.preset, "ultrafast");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_template_matches_defaults() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.stream.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.recording.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.default_fps = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.overlay.enabled = true;
        assert!(config.validate().is_err());
        config.overlay.address = Some("http://localhost:8000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = Config::default();
        config.overlay.address = Some("http://model".into());
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_init_file_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::init_file(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(
            Config::init_file(&path),
            Err(ConfigError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_camera_settings_mapping() {
        let config = CameraConfig {
            width: 1280,
            height: 720,
            mirror: true,
            framerate: Some(15),
            ..Default::default()
        };
        let settings = config.settings();
        assert_eq!(settings.resolution, Resolution { width: 1280, height: 720 });
        assert!(settings.mirror);
        assert_eq!(settings.framerate, Some(15));
    }
}
