//! Bounded hand-off queue between the stream loop and the writer thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::camera::Frame;

/// Result of offering a frame to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The queue was full; the oldest pending frame was discarded
    QueuedAfterEviction,
    /// The consumer is gone; the frame was discarded
    Rejected,
}

/// Producer side of the hand-off queue.
///
/// When full, the oldest pending frame is evicted so the newest one always
/// gets in. Every discarded frame is counted. Dropping the queue ends the
/// consumer's input once the remaining frames are drained.
pub struct FrameQueue {
    tx: Sender<Frame>,
    // Second receiver used only to evict from the front
    evict: Receiver<Frame>,
    consumer_alive: Arc<AtomicBool>,
    dropped: AtomicU64,
    queued: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames, and its consumer end.
    pub fn bounded(capacity: usize) -> (Self, Receiver<Frame>) {
        let (tx, rx) = bounded(capacity.max(1));
        let queue = Self {
            tx,
            evict: rx.clone(),
            consumer_alive: Arc::new(AtomicBool::new(true)),
            dropped: AtomicU64::new(0),
            queued: AtomicU64::new(0),
        };
        (queue, rx)
    }

    /// Flag the consumer clears when it stops reading.
    pub fn consumer_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.consumer_alive)
    }

    pub fn push(&self, frame: Frame) -> PushOutcome {
        if !self.consumer_alive.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Rejected;
        }

        match self.tx.try_send(frame) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Queued
            }
            Err(TrySendError::Full(frame)) => {
                if self.evict.try_recv().is_ok() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                match self.tx.try_send(frame) {
                    Ok(()) => {
                        self.queued.fetch_add(1, Ordering::Relaxed);
                        PushOutcome::QueuedAfterEviction
                    }
                    Err(_) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        PushOutcome::Rejected
                    }
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Rejected
            }
        }
    }

    /// Frames waiting for the consumer.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    /// Frames discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames accepted so far.
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }
}
