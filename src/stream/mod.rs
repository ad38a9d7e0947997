//! Live feed: multipart framing and the stream coordinator.

mod coordinator;
mod multipart;

pub use coordinator::{
    ChunkStream, StreamCoordinator, StreamError, StreamSettings, ToggleOutcome, ToggleResult,
};
pub use multipart::{frame_chunk, BOUNDARY, CONTENT_TYPE};
