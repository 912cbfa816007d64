//! Client recording state machine.
//!
//! One machine instance is the single authoritative owner of "what is
//! happening right now" on the client: the capture device, the session id,
//! the chunk sequence, and whatever failed last. Every external event —
//! operator start/stop, the emitter tick, retry, cancel, teardown — feeds
//! one transition method; there is no recording state anywhere else.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{FinalizeRequest, SessionMode, StartSessionRequest, TranscriptResult};

use super::source::CaptureSource;
use super::uploader::{ChunkUploader, PendingChunk, RpcError, SessionApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Preparing,
    Recording,
    Uploading,
    Processing,
    Done,
    Error,
}

impl CapturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Recording => "recording",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone access denied: {0}")]
    DeviceAccessDenied(String),
    #[error("could not allocate a recording session: {0}")]
    SessionAllocationFailed(String),
    #[error("chunk {seq} upload failed: {reason}")]
    ChunkUploadFailed { seq: u64, reason: String },
    #[error("server rejected chunk {seq}: {reason}")]
    SequenceRejected { seq: u64, reason: String },
    #[error("finalize failed: {0}")]
    FinalizeFailed(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub mode: SessionMode,
    pub language: Option<String>,
    pub target_language: Option<String>,
    /// Recording ceiling; reaching it stops the recording exactly as if
    /// the operator had asked.
    pub max_duration: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            mode: SessionMode::Transcribe,
            language: None,
            target_language: None,
            max_duration: Duration::from_secs(120),
        }
    }
}

/// What one emitter tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Nothing captured since the previous tick.
    Quiet,
    /// One chunk uploaded and acknowledged.
    Uploaded(u64),
    /// The recording ceiling was reached; stopped as if requested.
    AutoStopped(TranscriptResult),
}

/// Client-local view of the open server session.
struct ClientSession {
    session_id: String,
    next_seq: u64,
    /// Chunks awaiting acknowledgment, uploaded strictly front-first. At
    /// most two entries ever exist: a failed chunk awaiting retry, plus the
    /// final tail drained when capture halted.
    queued: VecDeque<PendingChunk>,
    finalize_pending: bool,
}

impl ClientSession {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            next_seq: 0,
            queued: VecDeque::new(),
            finalize_pending: false,
        }
    }

    fn enqueue(&mut self, bytes: Vec<u8>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued.push_back(PendingChunk { seq, bytes });
        seq
    }
}

pub struct CaptureMachine {
    source: Box<dyn CaptureSource>,
    uploader: ChunkUploader,
    options: CaptureOptions,
    phase: CapturePhase,
    session: Option<ClientSession>,
    started_at: Option<Instant>,
    last_error: Option<String>,
    transcript: Option<TranscriptResult>,
}

impl CaptureMachine {
    pub fn new(
        source: Box<dyn CaptureSource>,
        api: Arc<dyn SessionApi>,
        options: CaptureOptions,
    ) -> Self {
        Self {
            source,
            uploader: ChunkUploader::new(api),
            options,
            phase: CapturePhase::Idle,
            session: None,
            started_at: None,
            last_error: None,
            transcript: None,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transcript(&self) -> Option<&TranscriptResult> {
        self.transcript.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.session_id.as_str())
    }

    /// Chunks captured but not yet acknowledged by the server.
    pub fn pending_uploads(&self) -> usize {
        self.session
            .as_ref()
            .map(|session| session.queued.len())
            .unwrap_or(0)
    }

    /// Whether a finalize attempt has been issued for the open session.
    pub fn finalize_pending(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.finalize_pending)
            .unwrap_or(false)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Begin a new recording. Valid from idle, done or error only; a
    /// session left over from an errored attempt is abandoned first.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if !matches!(
            self.phase,
            CapturePhase::Idle | CapturePhase::Done | CapturePhase::Error
        ) {
            return Err(CaptureError::InvalidTransition(
                "a recording is already active",
            ));
        }
        if let Some(session) = self.session.take() {
            debug!("Discarding stale session {}", session.session_id);
            let _ = self.uploader.api().cancel(&session.session_id).await;
        }
        self.transcript = None;
        self.last_error = None;
        self.phase = CapturePhase::Preparing;

        // Device first: a denied microphone never touches the server.
        if let Err(err) = self.source.start() {
            return Err(self.fail(CaptureError::DeviceAccessDenied(err.to_string())));
        }

        let request = StartSessionRequest {
            mime_hint: Some(self.source.format().mime_hint()),
            mode: self.options.mode,
            language: self.options.language.clone(),
            target_language: self.options.target_language.clone(),
        };
        match self.uploader.api().start(&request).await {
            Ok(session_id) => {
                info!("Recording session {} started", session_id);
                self.session = Some(ClientSession::new(session_id));
                self.started_at = Some(Instant::now());
                self.phase = CapturePhase::Recording;
                Ok(())
            }
            Err(err) => {
                if let Err(stop_err) = self.source.stop() {
                    warn!("Failed to release capture source: {stop_err}");
                }
                Err(self.fail(CaptureError::SessionAllocationFailed(err.to_string())))
            }
        }
    }

    /// One emitter tick: slice everything captured since the previous tick
    /// into a chunk and upload it, waiting for the acknowledgment. Checks
    /// the recording ceiling first.
    pub async fn tick(&mut self) -> Result<TickOutcome, CaptureError> {
        if self.phase != CapturePhase::Recording {
            return Err(CaptureError::InvalidTransition(
                "tick is only valid while recording",
            ));
        }
        if self.elapsed() >= self.options.max_duration {
            info!(
                "Recording reached the {}s ceiling, stopping",
                self.options.max_duration.as_secs()
            );
            let result = self.stop().await?;
            return Ok(TickOutcome::AutoStopped(result));
        }

        let bytes = self.source.drain();
        if bytes.is_empty() {
            return Ok(TickOutcome::Quiet);
        }

        let seq = match self.session.as_mut() {
            Some(session) => session.enqueue(bytes),
            None => {
                return Err(self.fail(CaptureError::InvalidTransition("no active session")));
            }
        };

        if let Err(err) = self.flush_queued().await {
            self.halt_capture();
            return Err(self.fail(err));
        }
        Ok(TickOutcome::Uploaded(seq))
    }

    /// Stop recording: release the device, drain the remaining bytes as the
    /// final chunk, acknowledge everything outstanding, then finalize.
    pub async fn stop(&mut self) -> Result<TranscriptResult, CaptureError> {
        if self.phase != CapturePhase::Recording {
            return Err(CaptureError::InvalidTransition(
                "stop is only valid while recording",
            ));
        }

        self.halt_capture();
        self.phase = CapturePhase::Uploading;

        if let Err(err) = self.flush_queued().await {
            return Err(self.fail(err));
        }
        self.finalize_session().await
    }

    /// Resubmit exactly the unit that failed: the front queued chunk, or
    /// the finalize call itself. Valid only from the error state with a
    /// preserved session.
    pub async fn retry(&mut self) -> Result<TranscriptResult, CaptureError> {
        if self.phase != CapturePhase::Error {
            return Err(CaptureError::InvalidTransition(
                "retry is only valid after a failure",
            ));
        }
        if self.session.is_none() {
            return Err(CaptureError::InvalidTransition(
                "nothing to retry; start a new recording",
            ));
        }
        self.last_error = None;

        let has_queued = self
            .session
            .as_ref()
            .map(|session| !session.queued.is_empty())
            .unwrap_or(false);
        if has_queued {
            self.phase = CapturePhase::Uploading;
            if let Err(err) = self.flush_queued().await {
                return Err(self.fail(err));
            }
        }
        self.finalize_session().await
    }

    /// Abandon the failed attempt: tell the server to discard the session
    /// and reset to idle. Local state is dropped even if the server never
    /// hears the cancel.
    pub async fn cancel(&mut self) -> Result<(), CaptureError> {
        if self.phase != CapturePhase::Error {
            return Err(CaptureError::InvalidTransition(
                "cancel is only valid after a failure",
            ));
        }
        if let Some(session) = self.session.take() {
            if let Err(err) = self.uploader.api().cancel(&session.session_id).await {
                debug!(
                    "Cancel for session {} not acknowledged: {}",
                    session.session_id, err
                );
            }
        }
        self.last_error = None;
        self.phase = CapturePhase::Idle;
        Ok(())
    }

    /// Best-effort cancel for process teardown. Releases the device, fires
    /// the cancel without waiting for it, and resets to idle. No retry is
    /// ever attempted for this path.
    pub fn abandon(&mut self) -> Option<JoinHandle<()>> {
        if self.source.is_active() {
            if let Err(err) = self.source.stop() {
                warn!("Failed to release capture source: {err}");
            }
        }
        self.phase = CapturePhase::Idle;
        let session = self.session.take()?;
        info!("Abandoning session {}", session.session_id);
        let api = self.uploader.api_handle();
        Some(tokio::spawn(async move {
            let _ = api.cancel(&session.session_id).await;
        }))
    }

    /// Upload queued chunks front-first, one acknowledgment at a time. On
    /// failure the offending chunk stays at the front of the queue.
    async fn flush_queued(&mut self) -> Result<(), CaptureError> {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Ok(()),
        };
        while let Some(chunk) = session.queued.front() {
            match self.uploader.upload(&session.session_id, chunk).await {
                Ok(()) => {
                    session.queued.pop_front();
                }
                Err(err) => return Err(classify_chunk_error(chunk.seq, err)),
            }
        }
        Ok(())
    }

    async fn finalize_session(&mut self) -> Result<TranscriptResult, CaptureError> {
        self.phase = CapturePhase::Processing;
        let session_id = match self.session.as_mut() {
            Some(session) => {
                session.finalize_pending = true;
                session.session_id.clone()
            }
            None => {
                return Err(self.fail(CaptureError::InvalidTransition("no active session")));
            }
        };
        let request = FinalizeRequest {
            mode: self.options.mode,
            language: self.options.language.clone(),
            target_language: self.options.target_language.clone(),
        };

        match self.uploader.api().finalize(&session_id, &request).await {
            Ok(result) => {
                info!(
                    "Session {} finalized ({} chars)",
                    session_id,
                    result.text.len()
                );
                self.session = None;
                self.transcript = Some(result.clone());
                self.phase = CapturePhase::Done;
                Ok(result)
            }
            Err(err) => {
                let err = match err {
                    RpcError::UnknownSession(message) => CaptureError::UnknownSession(message),
                    other => CaptureError::FinalizeFailed(other.to_string()),
                };
                Err(self.fail(err))
            }
        }
    }

    /// Release the device and keep whatever it still held as the final
    /// queued chunk.
    fn halt_capture(&mut self) {
        let tail = match self.source.stop() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Capture source stop reported: {err}");
                Vec::new()
            }
        };
        if tail.is_empty() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            let seq = session.enqueue(tail);
            debug!("Queued final chunk {}", seq);
        }
    }

    fn fail(&mut self, err: CaptureError) -> CaptureError {
        // An unknown session is unrecoverable: nothing server-side is left
        // to retry against or cancel.
        if matches!(err, CaptureError::UnknownSession(_)) {
            self.session = None;
        }
        self.phase = CapturePhase::Error;
        self.last_error = Some(err.to_string());
        err
    }
}

fn classify_chunk_error(seq: u64, err: RpcError) -> CaptureError {
    match err {
        RpcError::UnknownSession(message) => CaptureError::UnknownSession(message),
        RpcError::SequenceMismatch(message) => CaptureError::SequenceRejected {
            seq,
            reason: message,
        },
        RpcError::Api(message) | RpcError::Transport(message) => CaptureError::ChunkUploadFailed {
            seq,
            reason: message,
        },
    }
}
