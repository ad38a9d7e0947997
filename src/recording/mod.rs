//! On-demand recording of the live feed.
//!
//! - [`Recorder`] runs the start/stop state machine and owns the history
//! - [`FrameQueue`] hands frames from the stream loop to the writer thread
//! - [`HistoryLog`] keeps the most recent start/stop actions

mod history;
mod queue;
mod recorder;
mod writer;

pub use history::{
    file_timestamp, format_duration, Action, HistoryEntry, HistoryLog, DEFAULT_HISTORY_CAPACITY,
};
pub use queue::{FrameQueue, PushOutcome};
pub use recorder::{Recorder, RecordingError, RecordingSettings, RecordingState, StopReport};
pub use writer::{spawn_writer, WriterHandle, WriterOutcome, WriterReport, WriterWait};
