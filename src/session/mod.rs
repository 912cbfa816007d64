//! Server side of the capture-session protocol: session records, the
//! per-session chunk spool, and finalization against the speech
//! collaborator.

pub mod artifact;
pub mod registry;
pub mod store;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::protocol::SessionMode;
use store::ChunkStore;

pub use registry::{SessionLimits, SessionRegistry, SessionSnapshot};

/// Server-side lifecycle of one recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Finalizing,
    Closed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(String),
    #[error("sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },
    #[error("unsupported audio mimetype: {0}")]
    UnsupportedType(String),
    #[error("upload exceeds the {limit}-byte limit")]
    TooLarge { limit: u64 },
    #[error("finalize failed: {0}")]
    FinalizeFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl SessionError {
    fn storage(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// One active recording session. Mutated only under its registry lock.
pub struct RecordingSession {
    pub id: String,
    pub state: SessionState,
    pub expected_seq: u64,
    pub chunk_count: u64,
    pub byte_count: u64,
    pub mime_hint: String,
    pub mode: SessionMode,
    pub language: Option<String>,
    pub target_language: Option<String>,
    pub last_activity: DateTime<Utc>,
    store: ChunkStore,
}

impl RecordingSession {
    fn new(
        id: String,
        mime_hint: String,
        mode: SessionMode,
        language: Option<String>,
        target_language: Option<String>,
        store: ChunkStore,
    ) -> Self {
        Self {
            id,
            state: SessionState::Open,
            expected_seq: 0,
            chunk_count: 0,
            byte_count: 0,
            mime_hint,
            mode,
            language,
            target_language,
            last_activity: Utc::now(),
            store,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
