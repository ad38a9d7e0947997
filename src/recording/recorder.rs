//! Recording session state machine.
//!
//! `Idle -> Starting -> Recording -> Stopping -> Idle`. At most one session
//! exists at a time. Start and stop are serialized by a control lock; the
//! phase itself sits behind a separate short-lived lock so the stream loop
//! can keep enqueueing while a stop drains.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::history::{file_timestamp, HistoryEntry, HistoryLog, DEFAULT_HISTORY_CAPACITY};
use super::queue::{FrameQueue, PushOutcome};
use super::writer::{spawn_writer, WriterHandle, WriterOutcome, WriterWait};
use crate::camera::{Frame, FrameFormat, FrameShape};
use crate::pipeline::{EncoderSettings, Pipeline, PipelineError};

/// How often `stop` checks on a draining writer.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Log a queue-overflow warning on the first drop and every this many after.
const DROP_LOG_EVERY: u64 = 100;

/// Settings for recording sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory recordings are written to
    pub dir: PathBuf,
    /// Entries kept in the history log
    pub history_capacity: usize,
    /// Frames buffered between the stream loop and the encoder
    pub queue_capacity: usize,
    /// Writer wait per queue pop, in milliseconds
    pub writer_poll_ms: u64,
    /// How long a non-progressing writer is waited for on stop, in seconds
    pub join_timeout_secs: u64,
    /// How long the encoder gets to exit after end-of-input, in seconds
    pub exit_timeout_secs: u64,
    pub encoder: EncoderSettings,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("recordings"),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            queue_capacity: 256,
            writer_poll_ms: 1000,
            join_timeout_secs: 5,
            exit_timeout_secs: 5,
            encoder: EncoderSettings::default(),
        }
    }
}

impl RecordingSettings {
    pub fn writer_poll(&self) -> Duration {
        Duration::from_millis(self.writer_poll_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_timeout_secs)
    }
}

/// Observable recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Errors from recording start/stop.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("A recording is already in progress")]
    AlreadyRecording,
    #[error("No recording in progress")]
    NotRecording,
    #[error("No frame available.")]
    NoFrameAvailable,
    #[error("Invalid frame rate {0}")]
    InvalidFrameRate(f64),
    #[error("Failed to start encoder: {0}")]
    EncoderLaunch(#[from] PipelineError),
    #[error("Recording I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct StopReport {
    pub path: PathBuf,
    /// Base filename of `path`
    pub filename: String,
    pub duration: Duration,
    /// Frames accepted into the hand-off queue
    pub frames_queued: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    /// The writer was left behind instead of draining cleanly
    pub writer_abandoned: bool,
    /// The encoder had to be killed after the exit timeout
    pub encoder_killed: bool,
}

struct Session {
    path: PathBuf,
    filename: String,
    shape: FrameShape,
    started_at: Instant,
    encoder: Pipeline,
    writer: WriterHandle,
    queue: FrameQueue,
    shape_warned: AtomicBool,
    writer_warned: AtomicBool,
}

enum Phase {
    Idle,
    Starting,
    Recording(Box<Session>),
    Stopping,
}

impl Phase {
    fn state(&self) -> RecordingState {
        match self {
            Phase::Idle => RecordingState::Idle,
            Phase::Starting => RecordingState::Starting,
            Phase::Recording(_) => RecordingState::Recording,
            Phase::Stopping => RecordingState::Stopping,
        }
    }
}

/// Owns the lifecycle of recording sessions and their history.
pub struct Recorder {
    settings: RecordingSettings,
    history: Arc<HistoryLog>,
    phase: Mutex<Phase>,
    control: Mutex<()>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &self.state())
            .field("dir", &self.settings.dir)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        let history = Arc::new(HistoryLog::new(settings.history_capacity));
        Self {
            settings,
            history,
            phase: Mutex::new(Phase::Idle),
            control: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn state(&self) -> RecordingState {
        self.phase.lock().state()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Frames waiting in the active session's queue, if any.
    pub fn queue_depth(&self) -> Option<usize> {
        match &*self.phase.lock() {
            Phase::Recording(session) => Some(session.queue.len()),
            _ => None,
        }
    }

    /// Start a session for frames of `shape` at `fps`.
    ///
    /// Returns the output path. Fails without changing state or history if
    /// a session is already active or the encoder can't be launched.
    pub fn start(&self, shape: FrameShape, fps: f64) -> Result<PathBuf, RecordingError> {
        let _control = self.control.lock();
        {
            let mut phase = self.phase.lock();
            if !matches!(*phase, Phase::Idle) {
                return Err(RecordingError::AlreadyRecording);
            }
            *phase = Phase::Starting;
        }

        match self.launch(shape, fps) {
            Ok(session) => {
                let path = session.path.clone();
                log::info!(
                    "Recording started: {} ({}x{} @ {:.2} fps)",
                    path.display(),
                    shape.width,
                    shape.height,
                    fps
                );
                self.history
                    .append(HistoryEntry::started(session.filename.clone(), Local::now()));
                *self.phase.lock() = Phase::Recording(Box::new(session));
                Ok(path)
            }
            Err(e) => {
                log::error!("Failed to start recording: {}", e);
                *self.phase.lock() = Phase::Idle;
                Err(e)
            }
        }
    }

    fn launch(&self, shape: FrameShape, fps: f64) -> Result<Session, RecordingError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(RecordingError::InvalidFrameRate(fps));
        }

        let dir = &self.settings.dir;
        std::fs::create_dir_all(dir).map_err(|source| RecordingError::Io {
            path: dir.clone(),
            source,
        })?;

        let encoder_settings = &self.settings.encoder;
        let filename = unused_filename(
            dir,
            &format!("stream-{}", file_timestamp(Local::now())),
            encoder_settings.extension(),
        );
        let path = dir.join(&filename);
        let args = encoder_settings.args(shape, FrameFormat::Rgb, fps, &path);

        let mut encoder = Pipeline::spawn_writer("encoder", &encoder_settings.program, &args)?;
        let stdin = encoder.take_stdin().ok_or_else(|| {
            PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder has no stdin",
            ))
        })?;

        let (queue, frames) = FrameQueue::bounded(self.settings.queue_capacity);
        let writer = match spawn_writer(
            stdin,
            frames,
            queue.consumer_flag(),
            self.settings.writer_poll(),
        ) {
            Ok(writer) => writer,
            Err(source) => {
                encoder.kill();
                return Err(RecordingError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };

        Ok(Session {
            path,
            filename,
            shape,
            started_at: Instant::now(),
            encoder,
            writer,
            queue,
            shape_warned: AtomicBool::new(false),
            writer_warned: AtomicBool::new(false),
        })
    }

    /// Hand a frame to the active session.
    ///
    /// No-op unless recording. Returns whether the frame was queued.
    pub fn enqueue(&self, frame: Frame) -> bool {
        let phase = self.phase.lock();
        let Phase::Recording(session) = &*phase else {
            return false;
        };

        if frame.shape() != session.shape {
            if !session.shape_warned.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "Frame shape {}x{} doesn't match recording {}x{}, skipping",
                    frame.width,
                    frame.height,
                    session.shape.width,
                    session.shape.height
                );
            }
            return false;
        }

        match session.queue.push(frame) {
            PushOutcome::Queued => true,
            PushOutcome::QueuedAfterEviction => {
                let dropped = session.queue.dropped();
                if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
                    log::warn!(
                        "Recording queue full ({} frames), dropped {} frame(s) so far",
                        session.queue.capacity(),
                        dropped
                    );
                }
                true
            }
            PushOutcome::Rejected => {
                if !session.writer_warned.swap(true, Ordering::Relaxed) {
                    log::error!(
                        "Writer for {} has stopped; frames are discarded until the recording is stopped",
                        session.filename
                    );
                }
                false
            }
        }
    }

    /// Stop the active session and finalize the file.
    ///
    /// Drains pending frames, closes the encoder's input and waits for it to
    /// exit, killing it if it doesn't within the exit timeout.
    pub fn stop(&self) -> Result<StopReport, RecordingError> {
        let _control = self.control.lock();
        let session = {
            let mut phase = self.phase.lock();
            match std::mem::replace(&mut *phase, Phase::Stopping) {
                Phase::Recording(session) => session,
                other => {
                    *phase = other;
                    return Err(RecordingError::NotRecording);
                }
            }
        };

        let Session {
            path,
            filename,
            started_at,
            mut encoder,
            writer,
            queue,
            ..
        } = *session;

        log::info!(
            "Stopping recording {} ({} frames pending)",
            filename,
            queue.len()
        );
        let queue_dropped = queue.dropped();
        let frames_queued = queue.queued();
        // Last sender gone: the writer sees end-of-input once drained
        drop(queue);

        let (frames_written, writer_abandoned) =
            match writer.wait(self.settings.join_timeout(), DRAIN_POLL) {
                WriterWait::Finished(report) => {
                    if let WriterOutcome::Failed(reason) = &report.outcome {
                        log::warn!("Writer for {} had failed: {}", filename, reason);
                    }
                    (report.frames_written, false)
                }
                WriterWait::Abandoned { frames_written } => {
                    log::warn!(
                        "Writer for {} made no progress for {:?}, abandoning it",
                        filename,
                        self.settings.join_timeout()
                    );
                    (frames_written, true)
                }
            };

        let encoder_killed = match encoder.finish(self.settings.exit_timeout()) {
            Ok(exit) => {
                if let Some(status) = exit.status {
                    if !status.success() && !exit.forced {
                        let tail = encoder.take_stderr_tail();
                        log::warn!(
                            "Encoder exited with {} for {}: {}",
                            status,
                            filename,
                            tail.join(" | ")
                        );
                    }
                }
                exit.forced
            }
            Err(e) => {
                log::error!("Waiting for encoder failed: {}", e);
                encoder.kill();
                true
            }
        };

        let duration = started_at.elapsed();
        self.history
            .append(HistoryEntry::stopped(filename.clone(), Local::now(), duration));
        *self.phase.lock() = Phase::Idle;

        log::info!(
            "Recording stopped: {} ({:.2}s, {} of {} queued frames written, {} dropped)",
            path.display(),
            duration.as_secs_f64(),
            frames_written,
            frames_queued,
            queue_dropped
        );

        Ok(StopReport {
            path,
            filename,
            duration,
            frames_queued,
            frames_written,
            frames_dropped: queue_dropped,
            writer_abandoned,
            encoder_killed,
        })
    }
}

/// `<stem>.<ext>`, or `<stem>-<n>.<ext>` with the first `n` not yet taken in
/// `dir`. Callers hold the control lock, so no other session races for it.
fn unused_filename(dir: &Path, stem: &str, extension: &str) -> String {
    let mut filename = format!("{}.{}", stem, extension);
    let mut n = 1u32;
    while dir.join(&filename).exists() {
        filename = format!("{}-{}.{}", stem, n, extension);
        n += 1;
    }
    filename
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.is_recording() {
            log::info!("Finalizing active recording on shutdown");
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> FrameShape {
        FrameShape {
            height: 2,
            width: 2,
            channels: 3,
        }
    }

    fn settings_with_program(dir: &std::path::Path, program: &str) -> RecordingSettings {
        RecordingSettings {
            dir: dir.to_path_buf(),
            encoder: EncoderSettings {
                program: program.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_stop_while_idle_fails() {
        let recorder = Recorder::new(RecordingSettings::default());
        assert!(matches!(recorder.stop(), Err(RecordingError::NotRecording)));
        assert!(recorder.history().is_empty());
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn test_enqueue_while_idle_is_noop() {
        let recorder = Recorder::new(RecordingSettings::default());
        let frame = Frame::from_rgb(2, 2, vec![0; 12]).unwrap();
        assert!(!recorder.enqueue(frame));
        assert!(recorder.queue_depth().is_none());
    }

    #[test]
    fn test_launch_failure_leaves_idle() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::new(settings_with_program(
            dir.path(),
            "/nonexistent/vision-stream-encoder",
        ));
        let result = recorder.start(shape(), 30.0);
        assert!(matches!(
            result,
            Err(RecordingError::EncoderLaunch(PipelineError::NotFound(_)))
        ));
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert!(recorder.history().is_empty());
    }

    #[test]
    fn test_invalid_fps_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::new(settings_with_program(dir.path(), "ffmpeg"));
        assert!(matches!(
            recorder.start(shape(), 0.0),
            Err(RecordingError::InvalidFrameRate(_))
        ));
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn test_unused_filename_adds_suffix() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unused_filename(dir.path(), "stream-x", "mp4"), "stream-x.mp4");

        std::fs::write(dir.path().join("stream-x.mp4"), b"a").unwrap();
        assert_eq!(unused_filename(dir.path(), "stream-x", "mp4"), "stream-x-1.mp4");

        std::fs::write(dir.path().join("stream-x-1.mp4"), b"b").unwrap();
        assert_eq!(unused_filename(dir.path(), "stream-x", "mp4"), "stream-x-2.mp4");
        assert_eq!(unused_filename(dir.path(), "stream-x", "webm"), "stream-x.webm");
    }

    #[test]
    fn test_settings_durations() {
        let settings = RecordingSettings::default();
        assert_eq!(settings.writer_poll(), Duration::from_secs(1));
        assert_eq!(settings.join_timeout(), Duration::from_secs(5));
        assert_eq!(settings.exit_timeout(), Duration::from_secs(5));
        assert_eq!(settings.history_capacity, 10);
    }
}
