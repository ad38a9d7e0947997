//! StreamCoordinator - pulls frames, applies the overlay, encodes them for
//! the live feed and forwards them to the recorder.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::multipart::frame_chunk;
use crate::camera::{encode_jpeg, FrameSource, MAX_JPEG_QUALITY};
use crate::overlay::{Overlay, OverlayError};
use crate::recording::{HistoryEntry, Recorder, RecordingError, StopReport};

/// Log a failed stream iteration on the first failure and every this many after.
const FAILURE_LOG_EVERY: u64 = 100;

/// Errors from a single stream iteration.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Overlay failed: {0}")]
    Overlay(#[from] OverlayError),
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Live feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
    /// Pause after a failed read before retrying, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: MAX_JPEG_QUALITY,
            retry_backoff_ms: 10,
        }
    }
}

impl StreamSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// What a toggle did.
#[derive(Debug)]
pub enum ToggleResult {
    Started { path: PathBuf },
    Stopped(StopReport),
    Failed(RecordingError),
}

/// Toggle result plus the history as it stood afterwards.
#[derive(Debug)]
pub struct ToggleOutcome {
    pub result: ToggleResult,
    pub history: Vec<HistoryEntry>,
}

/// Central orchestrator shared by every streaming client and the control
/// endpoint.
pub struct StreamCoordinator {
    source: Arc<Mutex<FrameSource>>,
    overlay: Option<Arc<dyn Overlay>>,
    recorder: Arc<Recorder>,
    settings: StreamSettings,
    toggle: Mutex<()>,
    shutdown: AtomicBool,
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("overlay", &self.overlay.is_some())
            .field("recorder", &self.recorder)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl StreamCoordinator {
    pub fn new(source: FrameSource, recorder: Arc<Recorder>, settings: StreamSettings) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            overlay: None,
            recorder,
            settings,
            toggle: Mutex::new(()),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn Overlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn current_fps(&self) -> f64 {
        self.source.lock().current_fps()
    }

    /// One stream iteration.
    ///
    /// `Ok(None)` means the read failed and no chunk was produced.
    pub fn try_next_chunk(&self) -> Result<Option<Bytes>, StreamError> {
        let frame = match self.source.lock().next_frame() {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let frame = match &self.overlay {
            Some(overlay) => overlay.apply(frame)?,
            None => frame,
        };

        let jpeg = encode_jpeg(&frame, self.settings.jpeg_quality)?;
        // The recorder gets the same frame the feed shows
        self.recorder.enqueue(frame);

        Ok(Some(frame_chunk(&jpeg)))
    }

    /// A fresh chunk sequence for one client.
    ///
    /// Ends only on shutdown or when the cancel check set by
    /// [`ChunkStream::cancel_when`] returns true.
    pub fn chunks(self: &Arc<Self>) -> ChunkStream {
        ChunkStream {
            coordinator: Arc::clone(self),
            cancel: None,
            failures: 0,
        }
    }

    /// Start recording if idle, stop it if recording.
    pub fn toggle_recording(&self) -> ToggleOutcome {
        let _toggle = self.toggle.lock();

        let result = if self.recorder.is_recording() {
            match self.recorder.stop() {
                Ok(report) => ToggleResult::Stopped(report),
                Err(e) => ToggleResult::Failed(e),
            }
        } else {
            match self.start_recording() {
                Ok(path) => ToggleResult::Started { path },
                Err(e) => ToggleResult::Failed(e),
            }
        };

        ToggleOutcome {
            result,
            history: self.recorder.history().snapshot(),
        }
    }

    fn start_recording(&self) -> Result<PathBuf, RecordingError> {
        let (shape, fps) = {
            let mut source = self.source.lock();
            let frame = source.next_frame().ok_or(RecordingError::NoFrameAvailable)?;
            (frame.shape(), source.current_fps())
        };
        self.recorder.start(shape, fps)
    }

    /// Make every open chunk stream end at its next iteration.
    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// End streams, finalize an active recording and release the device.
    pub fn shutdown(&self) {
        self.begin_shutdown();
        let _toggle = self.toggle.lock();
        if self.recorder.is_recording() {
            match self.recorder.stop() {
                Ok(report) => log::info!("Finalized {} on shutdown", report.filename),
                Err(e) => log::warn!("Stopping recording on shutdown failed: {}", e),
            }
        }
        self.source.lock().close();
    }
}

/// Per-client chunk sequence. Transient failures are retried after a short
/// backoff and never end the sequence.
pub struct ChunkStream {
    coordinator: Arc<StreamCoordinator>,
    cancel: Option<Box<dyn Fn() -> bool + Send>>,
    failures: u64,
}

impl ChunkStream {
    pub fn cancel_when<F>(mut self, cancel: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.cancel = Some(Box::new(cancel));
        self
    }

    fn cancelled(&self) -> bool {
        self.coordinator.is_shutting_down() || self.cancel.as_ref().map_or(false, |cancel| cancel())
    }
}

impl Iterator for ChunkStream {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let backoff = self.coordinator.settings.retry_backoff();
        loop {
            if self.cancelled() {
                return None;
            }
            match self.coordinator.try_next_chunk() {
                Ok(Some(chunk)) => return Some(chunk),
                Ok(None) => {}
                Err(e) => {
                    self.failures += 1;
                    if self.failures == 1 || self.failures % FAILURE_LOG_EVERY == 0 {
                        log::warn!("Stream iteration failed ({} so far): {}", self.failures, e);
                    }
                }
            }
            std::thread::sleep(backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CaptureDevice, Frame};
    use crate::recording::RecordingSettings;
    use std::collections::VecDeque;

    struct Scripted {
        reads: VecDeque<Option<Frame>>,
    }

    impl CaptureDevice for Scripted {
        fn read_frame(&mut self) -> Option<Frame> {
            self.reads.pop_front().flatten()
        }
        fn nominal_fps(&self) -> Option<f64> {
            Some(25.0)
        }
        fn release(&mut self) {}
        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    struct FailingOverlay;

    impl Overlay for FailingOverlay {
        fn apply(&self, _frame: Frame) -> Result<Frame, OverlayError> {
            Err(OverlayError::Other("model offline".to_string()))
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(4, 4, vec![200; 48]).unwrap()
    }

    fn coordinator(reads: Vec<Option<Frame>>) -> StreamCoordinator {
        let source = FrameSource::from_device(
            Box::new(Scripted {
                reads: reads.into(),
            }),
            10,
            30.0,
        );
        let recorder = Arc::new(Recorder::new(RecordingSettings::default()));
        StreamCoordinator::new(source, recorder, StreamSettings::default())
    }

    #[test]
    fn test_failed_read_emits_nothing() {
        let coordinator = coordinator(vec![None, Some(frame())]);
        assert!(coordinator.try_next_chunk().unwrap().is_none());
        let chunk = coordinator.try_next_chunk().unwrap().unwrap();
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(chunk.ends_with(b"\r\n"));
    }

    #[test]
    fn test_chunk_stream_skips_failed_reads() {
        let coordinator = Arc::new(coordinator(vec![None, None, Some(frame()), Some(frame())]));
        let chunks: Vec<Bytes> = coordinator.chunks().take(2).collect();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_overlay_failure_is_a_failed_iteration() {
        let coordinator = coordinator(vec![Some(frame())]).with_overlay(Arc::new(FailingOverlay));
        assert!(matches!(
            coordinator.try_next_chunk(),
            Err(StreamError::Overlay(_))
        ));
    }

    #[test]
    fn test_toggle_without_frame_fails() {
        let coordinator = coordinator(vec![None]);
        let outcome = coordinator.toggle_recording();
        assert!(matches!(
            outcome.result,
            ToggleResult::Failed(RecordingError::NoFrameAvailable)
        ));
        assert!(outcome.history.is_empty());
        assert!(!coordinator.recorder().is_recording());
    }

    #[test]
    fn test_shutdown_ends_streams() {
        let coordinator = Arc::new(coordinator(vec![Some(frame()); 8]));
        let mut chunks = coordinator.chunks();
        assert!(chunks.next().is_some());
        coordinator.shutdown();
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_cancel_check_ends_stream() {
        let coordinator = Arc::new(coordinator(vec![Some(frame()); 4]));
        let mut chunks = coordinator.chunks().cancel_when(|| true);
        assert!(chunks.next().is_none());
    }
}
