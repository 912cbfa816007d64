// Integration tests for the server side of the capture-session protocol:
// ordering, rejection inertness, idempotent cancel, and finalize retry.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use tempfile::TempDir;

use voxnote::protocol::{SessionMode, StartSessionRequest};
use voxnote::session::{SessionError, SessionLimits, SessionRegistry, SessionState};
use voxnote::speech::SpeechProvider;

/// Collaborator double: deterministic output, scripted failures, and a
/// record of the exact audio bytes it was handed.
struct ScriptedSpeech {
    failures: AtomicUsize,
    transcribe_calls: AtomicUsize,
    last_audio: Mutex<Vec<u8>>,
}

impl ScriptedSpeech {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
            last_audio: Mutex::new(Vec::new()),
        })
    }

    fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl SpeechProvider for ScriptedSpeech {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn transcribe<'a>(
        &'a self,
        audio: &'a [u8],
        _mimetype: &'a str,
        _language: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
            let should_fail = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                bail!("scripted transcription outage");
            }
            *self.last_audio.lock().unwrap() = audio.to_vec();
            Ok(format!("transcript of {} bytes", audio.len()))
        })
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(format!("{text} [{target_language}]")) })
    }
}

fn open_registry(speech: Arc<ScriptedSpeech>) -> (TempDir, SessionRegistry) {
    let dir = TempDir::new().unwrap();
    let registry = SessionRegistry::open(
        dir.path().to_path_buf(),
        speech,
        SessionLimits::default(),
    )
    .unwrap();
    (dir, registry)
}

fn start_request(mode: SessionMode, target_language: Option<&str>) -> StartSessionRequest {
    StartSessionRequest {
        mime_hint: Some("audio/wav".to_string()),
        mode,
        language: Some("en".to_string()),
        target_language: target_language.map(str::to_string),
    }
}

#[tokio::test]
async fn test_transcribe_session_end_to_end() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(Arc::clone(&speech));

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();

    for seq in 0..3u64 {
        registry.append(&id, seq, &[seq as u8; 100]).await.unwrap();
    }

    let snapshot = registry.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.state, SessionState::Open);
    assert_eq!(snapshot.chunk_count, 3);
    assert_eq!(snapshot.byte_count, 300);
    assert_eq!(snapshot.expected_seq, 3);

    let result = registry.finalize(&id).await.unwrap();
    assert!(!result.text.is_empty());
    assert!(result.translated_text.is_none());

    // Closed sessions leave nothing behind.
    assert_eq!(registry.active_count().await, 0);
    assert!(!registry.spool_path(&id).exists());
}

#[tokio::test]
async fn test_translate_session_returns_both_texts() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Translate, Some("es")))
        .await
        .unwrap();
    registry.append(&id, 0, b"audio bytes").await.unwrap();

    let result = registry.finalize(&id).await.unwrap();
    assert!(!result.text.is_empty());
    let translated = result.translated_text.unwrap();
    // The translation prompt names the language, not the bare code.
    assert!(translated.contains("Español"), "got: {translated}");
}

#[tokio::test]
async fn test_assembled_bytes_equal_concatenation_in_seq_order() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(Arc::clone(&speech));

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    registry.append(&id, 0, b"first-").await.unwrap();
    registry.append(&id, 1, b"second-").await.unwrap();
    registry.append(&id, 2, b"third").await.unwrap();

    registry.finalize(&id).await.unwrap();

    assert_eq!(
        speech.last_audio.lock().unwrap().as_slice(),
        b"first-second-third"
    );
}

#[tokio::test]
async fn test_sequence_gap_is_rejected_inertly() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    registry.append(&id, 0, &[1; 10]).await.unwrap();

    // Skipping seq 1 is a protocol violation.
    let err = registry.append(&id, 2, &[2; 10]).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::SequenceMismatch { expected: 1, got: 2 }
    ));

    // The rejection mutated nothing.
    let snapshot = registry.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.expected_seq, 1);
    assert_eq!(snapshot.byte_count, 10);
    assert_eq!(snapshot.chunk_count, 1);

    // A corrected append sequence goes through.
    registry.append(&id, 1, &[2; 10]).await.unwrap();
    registry.append(&id, 2, &[3; 10]).await.unwrap();
    let snapshot = registry.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.byte_count, 30);
}

#[tokio::test]
async fn test_duplicate_resend_is_rejected() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    registry.append(&id, 0, &[1; 10]).await.unwrap();

    let err = registry.append(&id, 0, &[1; 10]).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::SequenceMismatch { expected: 1, got: 0 }
    ));
    let snapshot = registry.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.byte_count, 10);
}

#[tokio::test]
async fn test_append_after_cancel_reports_unknown_session() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    registry.append(&id, 0, &[0; 50]).await.unwrap();

    registry.cancel(&id).await;
    assert!(!registry.spool_path(&id).exists());

    let err = registry.append(&id, 1, &[0; 50]).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownSession(_)));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();

    registry.cancel(&id).await;
    registry.cancel(&id).await;
    registry.cancel("never-existed").await;

    assert_eq!(registry.active_count().await, 0);
    assert!(!registry.spool_path(&id).exists());
}

#[tokio::test]
async fn test_failed_finalize_keeps_session_open_for_retry() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(Arc::clone(&speech));

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    registry.append(&id, 0, &[7; 120]).await.unwrap();

    speech.fail_next(1);
    let err = registry.finalize(&id).await.unwrap_err();
    assert!(matches!(err, SessionError::FinalizeFailed(_)));

    // Uploaded bytes survive a downstream failure.
    let snapshot = registry.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.state, SessionState::Open);
    assert_eq!(snapshot.byte_count, 120);
    assert!(registry.spool_path(&id).exists());

    // The identical call succeeds with no further appends.
    let result = registry.finalize(&id).await.unwrap();
    assert_eq!(result.text, "transcript of 120 bytes");
    assert_eq!(speech.transcribe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_double_finalize_after_close_reports_unknown_session() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    registry.append(&id, 0, &[0; 10]).await.unwrap();
    registry.finalize(&id).await.unwrap();

    let err = registry.finalize(&id).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownSession(_)));
}

#[tokio::test]
async fn test_oversized_chunk_is_rejected_inertly() {
    let speech = ScriptedSpeech::new();
    let dir = TempDir::new().unwrap();
    let registry = SessionRegistry::open(
        dir.path().to_path_buf(),
        speech,
        SessionLimits {
            max_chunk_bytes: 16,
            max_session_bytes: 64,
        },
    )
    .unwrap();

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();

    let err = registry.append(&id, 0, &[0; 17]).await.unwrap_err();
    assert!(matches!(err, SessionError::TooLarge { limit: 16 }));

    let snapshot = registry.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.expected_seq, 0);
    assert_eq!(snapshot.byte_count, 0);

    // The session cap counts the running total.
    for seq in 0..4u64 {
        registry.append(&id, seq, &[0; 16]).await.unwrap();
    }
    let err = registry.append(&id, 4, &[0; 16]).await.unwrap_err();
    assert!(matches!(err, SessionError::TooLarge { limit: 64 }));
    assert_eq!(registry.snapshot(&id).await.unwrap().byte_count, 64);
}

#[tokio::test]
async fn test_unknown_mime_hint_rejected_at_start() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let err = registry
        .start(&StartSessionRequest {
            mime_hint: Some("video/mp4".to_string()),
            mode: SessionMode::Transcribe,
            language: None,
            target_language: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedType(_)));
    assert_eq!(registry.active_count().await, 0);
}

#[tokio::test]
async fn test_sweep_reclaims_idle_sessions() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    registry.append(&id, 0, &[0; 10]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let swept = registry.sweep(Duration::from_millis(1)).await;

    assert_eq!(swept, 1);
    assert_eq!(registry.active_count().await, 0);
    assert!(!registry.spool_path(&id).exists());

    let err = registry.append(&id, 1, &[0; 10]).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownSession(_)));
}

#[tokio::test]
async fn test_fresh_sessions_survive_the_sweep() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let id = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();

    let swept = registry.sweep(Duration::from_secs(600)).await;
    assert_eq!(swept, 0);
    assert!(registry.snapshot(&id).await.is_some());
}

#[tokio::test]
async fn test_session_ids_are_unique() {
    let speech = ScriptedSpeech::new();
    let (_dir, registry) = open_registry(speech);

    let first = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();
    let second = registry
        .start(&start_request(SessionMode::Transcribe, None))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(registry.active_count().await, 2);
}
