//! FFmpeg process management.
//!
//! Spawns encoder and capture processes, drains their stderr into the log,
//! and shuts them down within a bounded time.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::camera::{FrameFormat, FrameShape};

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Interval between exit-status checks while waiting for a process.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors that can occur during pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("'{0}' not found. Install ffmpeg and make sure it is on PATH")]
    NotFound(String),
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },
    #[error("Process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder invocation settings for recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Encoder executable
    pub program: String,
    /// Output video codec
    pub codec: String,
    /// Codec preset
    pub preset: String,
    /// Output pixel format
    pub pix_fmt: String,
    /// Output container
    pub container: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            pix_fmt: "yuv420p".to_string(),
            container: "mp4".to_string(),
        }
    }
}

impl EncoderSettings {
    /// Arguments for an encoder reading raw frames of `shape` on stdin and
    /// writing the finished file to `output`.
    pub fn args(&self, shape: FrameShape, format: FrameFormat, fps: f64, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-vcodec".to_string(),
            "rawvideo".to_string(),
            "-s".to_string(),
            format!("{}x{}", shape.width, shape.height),
            "-pix_fmt".to_string(),
            format.ffmpeg_pix_fmt().to_string(),
            "-r".to_string(),
            format_fps(fps),
            "-i".to_string(),
            "-".to_string(),
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-pix_fmt".to_string(),
            self.pix_fmt.clone(),
            "-f".to_string(),
            self.container.clone(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// File extension for recordings produced with these settings.
    pub fn extension(&self) -> &str {
        match self.container.as_str() {
            "matroska" => "mkv",
            other => other,
        }
    }
}

/// Frame rate as passed to `-r`: up to three decimals, no trailing zeros.
fn format_fps(fps: f64) -> String {
    let text = format!("{:.3}", fps);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}

/// How a process ended after [`Pipeline::finish`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineExit {
    pub status: Option<ExitStatus>,
    /// The process had to be killed after the timeout
    pub forced: bool,
}

/// Represents a running FFmpeg process
pub struct Pipeline {
    label: &'static str,
    child: Child,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
}

impl Pipeline {
    /// Spawn a process that consumes data on its stdin.
    pub fn spawn_writer(label: &'static str, program: &str, args: &[String]) -> Result<Self, PipelineError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        Self::spawn(label, program, cmd)
    }

    /// Spawn a process that produces data on its stdout.
    pub fn spawn_reader(label: &'static str, program: &str, args: &[String]) -> Result<Self, PipelineError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Self::spawn(label, program, cmd)
    }

    fn spawn(label: &'static str, program: &str, mut cmd: Command) -> Result<Self, PipelineError> {
        log::debug!("Spawning {}: {:?}", label, cmd);
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::NotFound(program.to_string())
            } else {
                PipelineError::SpawnFailed {
                    program: program.to_string(),
                    source: e,
                }
            }
        })?;

        // An undrained stderr pipe would eventually block the child
        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            log::debug!("[{}] {}", label, l);
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(l);
                        }
                        Err(_) => break,
                    }
                }
                tail.into_iter().collect()
            })
        });

        Ok(Pipeline {
            label,
            child,
            stderr_thread,
        })
    }

    /// Take ownership of the process's stdin.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take ownership of the process's stdout.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait up to `timeout` for the process to exit, killing it afterwards.
    ///
    /// The caller is responsible for having signalled end-of-input (closing
    /// stdin) if the process needs that to finish.
    pub fn finish(&mut self, timeout: Duration) -> Result<PipelineExit, PipelineError> {
        let start = Instant::now();
        loop {
            match self.child.try_wait()? {
                Some(status) => {
                    return Ok(PipelineExit {
                        status: Some(status),
                        forced: false,
                    })
                }
                None if start.elapsed() >= timeout => {
                    log::warn!(
                        "{} (pid {}) did not exit within {:?}, killing it",
                        self.label,
                        self.pid(),
                        timeout
                    );
                    let _ = self.child.kill();
                    let status = self.child.wait().ok();
                    return Ok(PipelineExit {
                        status,
                        forced: true,
                    });
                }
                None => thread::sleep(EXIT_POLL_INTERVAL),
            }
        }
    }

    /// Kill the process and reap it.
    pub fn kill(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }

    /// Last lines the process wrote to stderr.
    ///
    /// Blocks until the stderr pipe closes, so call it after the process
    /// has exited.
    pub fn take_stderr_tail(&mut self) -> Vec<String> {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }

    /// Get the process ID.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_running() {
            log::debug!("Killing {} (pid {}) on drop", self.label, self.pid());
            self.kill();
        }
    }
}
