//! Writer thread: drains the hand-off queue into the encoder's stdin.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::camera::Frame;

/// Why the writer thread stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterOutcome {
    /// The queue was closed and every pending frame was written
    Drained,
    /// A write to the sink failed; remaining frames were discarded
    Failed(String),
}

/// Final numbers reported by the writer thread.
#[derive(Debug, Clone)]
pub struct WriterReport {
    pub frames_written: u64,
    pub bytes_written: u64,
    pub outcome: WriterOutcome,
}

/// Result of waiting for the writer to finish.
#[derive(Debug, Clone)]
pub enum WriterWait {
    Finished(WriterReport),
    /// The writer stopped making progress and was left behind
    Abandoned { frames_written: u64 },
}

/// Handle to a running writer thread.
pub struct WriterHandle {
    done: Receiver<WriterReport>,
    thread: Option<JoinHandle<()>>,
    frames_written: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

/// Start a writer that moves frames from `frames` into `sink`.
///
/// The sink is dropped when the thread ends, which for a child's stdin is
/// the encoder's end-of-input. `alive` is cleared when the thread stops
/// consuming for any reason.
pub fn spawn_writer<W>(
    mut sink: W,
    frames: Receiver<Frame>,
    alive: Arc<AtomicBool>,
    poll: Duration,
) -> std::io::Result<WriterHandle>
where
    W: Write + Send + 'static,
{
    let (done_tx, done_rx) = bounded(1);
    let frames_written = Arc::new(AtomicU64::new(0));
    let progress = Arc::clone(&frames_written);
    let alive_flag = Arc::clone(&alive);

    let thread = thread::Builder::new()
        .name("recording-writer".into())
        .spawn(move || {
            let mut written = 0u64;
            let mut bytes = 0u64;

            let outcome = loop {
                match frames.recv_timeout(poll) {
                    Ok(frame) => match sink.write_all(frame.as_bytes()) {
                        Ok(()) => {
                            written += 1;
                            bytes += frame.as_bytes().len() as u64;
                            progress.store(written, Ordering::Release);
                        }
                        Err(e) => {
                            log::error!("Writing frame {} to encoder failed: {}", written + 1, e);
                            break WriterOutcome::Failed(e.to_string());
                        }
                    },
                    // Producer still open, nothing pending yet
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break WriterOutcome::Drained,
                }
            };

            alive_flag.store(false, Ordering::Release);
            if outcome == WriterOutcome::Drained {
                if let Err(e) = sink.flush() {
                    log::warn!("Flushing encoder input failed: {}", e);
                }
            }
            drop(sink);
            drop(frames);

            log::debug!("Writer finished: {} frames, {} bytes", written, bytes);
            let _ = done_tx.send(WriterReport {
                frames_written: written,
                bytes_written: bytes,
                outcome,
            });
        })?;

    Ok(WriterHandle {
        done: done_rx,
        thread: Some(thread),
        frames_written,
        alive,
    })
}

impl WriterHandle {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Acquire)
    }

    /// Wait for the writer to finish draining.
    ///
    /// There is no overall deadline while frames keep getting written; the
    /// writer is abandoned once it has made no progress for `stall_timeout`.
    /// The queue must already be closed or this only returns by abandoning.
    pub fn wait(mut self, stall_timeout: Duration, poll: Duration) -> WriterWait {
        let mut last_written = self.frames_written();
        let mut stalled_since = Instant::now();

        loop {
            match self.done.recv_timeout(poll) {
                Ok(report) => {
                    if let Some(thread) = self.thread.take() {
                        let _ = thread.join();
                    }
                    return WriterWait::Finished(report);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Thread ended without reporting, i.e. it panicked
                    self.alive.store(false, Ordering::Release);
                    if let Some(thread) = self.thread.take() {
                        let _ = thread.join();
                    }
                    return WriterWait::Finished(WriterReport {
                        frames_written: self.frames_written(),
                        bytes_written: 0,
                        outcome: WriterOutcome::Failed("writer thread panicked".to_string()),
                    });
                }
                Err(RecvTimeoutError::Timeout) => {
                    let written = self.frames_written();
                    if written != last_written {
                        last_written = written;
                        stalled_since = Instant::now();
                    } else if stalled_since.elapsed() >= stall_timeout {
                        // Detach: the thread exits on its own once its sink breaks
                        self.thread.take();
                        return WriterWait::Abandoned {
                            frames_written: written,
                        };
                    }
                }
            }
        }
    }
}
