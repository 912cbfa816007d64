//! Client side of the system: capture source, chunk uploader, and the
//! recording state machine that owns them.

pub mod machine;
pub mod mic;
pub mod source;
pub mod uploader;

pub use machine::{CaptureError, CaptureMachine, CaptureOptions, CapturePhase, TickOutcome};
pub use mic::MicSource;
pub use source::{CaptureFormat, CaptureSource};
pub use uploader::{ChunkUploader, HttpSessionApi, PendingChunk, RpcError, SessionApi};
