//! Owns every active recording session and serializes all protocol
//! operations against them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{SessionMode, StartSessionRequest, TranscriptResult};
use crate::speech::{languages, SpeechProvider};

use super::artifact;
use super::store::ChunkStore;
use super::{RecordingSession, SessionError, SessionState};

#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_chunk_bytes: u64,
    pub max_session_bytes: u64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 1024 * 1024,
            max_session_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Point-in-time view of one session, for logging and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub expected_seq: u64,
    pub chunk_count: u64,
    pub byte_count: u64,
}

type SessionHandle = Arc<Mutex<RecordingSession>>;

pub struct SessionRegistry {
    spool_dir: PathBuf,
    limits: SessionLimits,
    speech: Arc<dyn SpeechProvider>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    /// Open a registry over the given spool directory. Spool files left
    /// behind by a previous process are reclaimed here; sessions never
    /// survive a restart.
    pub fn open(
        spool_dir: PathBuf,
        speech: Arc<dyn SpeechProvider>,
        limits: SessionLimits,
    ) -> Result<Self> {
        std::fs::create_dir_all(&spool_dir).context("Failed to create spool directory")?;
        let orphans = clear_stale_spools(&spool_dir)?;
        if orphans > 0 {
            info!("Reclaimed {} orphaned spool file(s)", orphans);
        }
        Ok(Self {
            spool_dir,
            limits,
            speech,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Allocate a fresh session and its empty backing spool.
    pub async fn start(&self, request: &StartSessionRequest) -> Result<String, SessionError> {
        let mime_hint = artifact::normalize_mime_hint(request.mime_hint.as_deref())?;
        let id = Uuid::new_v4().to_string();
        let store = ChunkStore::create(&self.spool_dir, &id)
            .await
            .map_err(SessionError::storage)?;
        let session = RecordingSession::new(
            id.clone(),
            mime_hint,
            request.mode,
            request.language.clone(),
            request.target_language.clone(),
            store,
        );

        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));

        info!(
            "Session {} started (mode={}, mime={})",
            id,
            request.mode.as_str(),
            request.mime_hint.as_deref().unwrap_or("-")
        );
        Ok(id)
    }

    /// Append one chunk. Rejections are fully inert: a chunk with the wrong
    /// sequence number, or one that busts a size limit, mutates nothing.
    pub async fn append(
        &self,
        session_id: &str,
        seq: u64,
        bytes: &[u8],
    ) -> Result<(), SessionError> {
        if bytes.len() as u64 > self.limits.max_chunk_bytes {
            return Err(SessionError::TooLarge {
                limit: self.limits.max_chunk_bytes,
            });
        }

        let handle = self.lookup(session_id).await?;
        let mut session = handle.lock().await;

        if session.state != SessionState::Open {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }
        if seq != session.expected_seq {
            return Err(SessionError::SequenceMismatch {
                expected: session.expected_seq,
                got: seq,
            });
        }
        if session.byte_count + bytes.len() as u64 > self.limits.max_session_bytes {
            return Err(SessionError::TooLarge {
                limit: self.limits.max_session_bytes,
            });
        }

        session
            .store
            .append(bytes)
            .await
            .map_err(SessionError::storage)?;
        session.expected_seq += 1;
        session.chunk_count += 1;
        session.byte_count += bytes.len() as u64;
        session.touch();

        debug!(
            "Session {} accepted chunk {} ({} bytes, total {})",
            session_id,
            seq,
            bytes.len(),
            session.byte_count
        );
        Ok(())
    }

    /// Close the session and hand the assembled artifact to the speech
    /// collaborator, using the mode and languages fixed at start. On a
    /// downstream failure the session rolls back to open with its bytes
    /// untouched, so the exact same call can be retried without
    /// re-uploading a single chunk.
    pub async fn finalize(&self, session_id: &str) -> Result<TranscriptResult, SessionError> {
        let handle = self.lookup(session_id).await?;

        let (bytes, mime_hint, mode, language, target_language) = {
            let mut session = handle.lock().await;
            if session.state != SessionState::Open {
                return Err(SessionError::UnknownSession(session_id.to_string()));
            }
            session.state = SessionState::Finalizing;
            session.touch();
            let bytes = match session.store.assembled().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    session.state = SessionState::Open;
                    return Err(SessionError::storage(err));
                }
            };
            (
                bytes,
                session.mime_hint.clone(),
                session.mode,
                session.language.clone(),
                session.target_language.clone(),
            )
        };

        info!(
            "Finalizing session {} ({} bytes, mode={})",
            session_id,
            bytes.len(),
            mode.as_str()
        );

        // The collaborator call runs with no lock held; appends arriving in
        // the meantime are turned away by the finalizing state.
        let outcome = self
            .run_collaborator(
                bytes,
                &mime_hint,
                mode,
                language.as_deref(),
                target_language.as_deref(),
            )
            .await;

        let mut session = handle.lock().await;
        if session.state == SessionState::Cancelled {
            // Cancelled mid-flight: the attempt ran to completion on its
            // own, its result is discarded.
            debug!("Session {} was cancelled during finalize", session_id);
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }

        match outcome {
            Ok(result) => {
                session.state = SessionState::Closed;
                if let Err(err) = session.store.remove().await {
                    warn!("Failed to remove spool for session {}: {}", session_id, err);
                }
                drop(session);
                self.sessions.write().await.remove(session_id);
                info!("Session {} closed", session_id);
                Ok(result)
            }
            Err(err) => {
                session.state = SessionState::Open;
                warn!("Finalize failed for session {}: {}", session_id, err);
                Err(SessionError::FinalizeFailed(err.to_string()))
            }
        }
    }

    /// Discard a session and its spool. Idempotent: cancelling an unknown
    /// or already-cancelled id is a no-op.
    pub async fn cancel(&self, session_id: &str) {
        let removed = { self.sessions.write().await.remove(session_id) };
        match removed {
            Some(handle) => {
                let mut session = handle.lock().await;
                session.state = SessionState::Cancelled;
                if let Err(err) = session.store.remove().await {
                    warn!("Failed to remove spool for session {}: {}", session_id, err);
                }
                info!("Session {} cancelled", session_id);
            }
            None => {
                debug!("Cancel for unknown session {} ignored", session_id);
            }
        }
    }

    /// Reclaim sessions with no activity for longer than `max_idle`.
    /// Returns how many were swept. Finalizing sessions are left alone:
    /// they have work in flight.
    pub async fn sweep(&self, max_idle: std::time::Duration) -> usize {
        let max_idle = ChronoDuration::from_std(max_idle).unwrap_or(ChronoDuration::zero());
        let cutoff = Utc::now() - max_idle;

        let candidates: Vec<(String, SessionHandle)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
                .collect()
        };

        let mut swept = 0;
        for (id, handle) in candidates {
            let stale = {
                let session = handle.lock().await;
                session.state == SessionState::Open && session.last_activity < cutoff
            };
            if stale {
                info!("Sweeping idle session {}", id);
                self.cancel(&id).await;
                swept += 1;
            }
        }
        swept
    }

    /// Number of currently tracked sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let handle = { self.sessions.read().await.get(session_id).cloned() }?;
        let session = handle.lock().await;
        Some(SessionSnapshot {
            state: session.state,
            expected_seq: session.expected_seq,
            chunk_count: session.chunk_count,
            byte_count: session.byte_count,
        })
    }

    pub fn spool_path(&self, session_id: &str) -> PathBuf {
        ChunkStore::spool_path(&self.spool_dir, session_id)
    }

    async fn lookup(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    async fn run_collaborator(
        &self,
        bytes: Vec<u8>,
        mime_hint: &str,
        mode: SessionMode,
        language: Option<&str>,
        target_language: Option<&str>,
    ) -> Result<TranscriptResult> {
        let artifact = artifact::prepare(bytes, mime_hint)?;
        let language = languages::normalize_code(language);

        let text = self
            .speech
            .transcribe(&artifact.bytes, &artifact.mimetype, language.as_deref())
            .await?;

        let translated_text = match (mode, target_language) {
            (SessionMode::Translate, Some(target)) if !target.is_empty() => {
                let target_name = languages::language_name(target);
                Some(self.speech.translate(&text, target_name).await?)
            }
            _ => None,
        };

        Ok(TranscriptResult {
            text,
            translated_text,
        })
    }
}

fn clear_stale_spools(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir).context("Failed to read spool directory")? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("spool") {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("Failed to remove stale spool {:?}: {}", path, err);
            } else {
                removed += 1;
            }
        }
    }
    Ok(removed)
}
