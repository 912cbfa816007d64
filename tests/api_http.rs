// Integration tests for the HTTP boundary: request/response shapes and
// the error envelope carried by failing operations.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use voxnote::api::routes::sessions::{router, SessionsState};
use voxnote::session::{SessionLimits, SessionRegistry};
use voxnote::speech::SpeechProvider;

struct EchoSpeech;

impl SpeechProvider for EchoSpeech {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn transcribe<'a>(
        &'a self,
        audio: &'a [u8],
        _mimetype: &'a str,
        _language: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(format!("heard {} bytes", audio.len())) })
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(format!("{text} in {target_language}")) })
    }
}

fn test_router() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let registry = SessionRegistry::open(
        dir.path().to_path_buf(),
        Arc::new(EchoSpeech),
        SessionLimits::default(),
    )
    .unwrap();
    let app = router(SessionsState {
        registry: Arc::new(registry),
    });
    (dir, app)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_full_session_over_http() {
    let (_dir, app) = test_router();

    let (status, body) = post_json(
        &app,
        "/api/sessions",
        json!({ "mimeHint": "audio/wav", "mode": "translate", "targetLanguage": "es" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    for (seq, payload) in [b"abc".as_slice(), b"defg".as_slice()].iter().enumerate() {
        let (status, _) = post_json(
            &app,
            &format!("/api/sessions/{session_id}/chunks"),
            json!({ "seq": seq, "chunk": BASE64.encode(payload) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = post_json(
        &app,
        &format!("/api/sessions/{session_id}/finalize"),
        json!({ "mode": "translate", "targetLanguage": "es" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "heard 7 bytes");
    // The prompt names the target language rather than the bare code.
    assert_eq!(body["translatedText"], "heard 7 bytes in Español (Spanish)");
}

#[tokio::test]
async fn test_sequence_mismatch_carries_the_error_envelope() {
    let (_dir, app) = test_router();

    let (_, body) = post_json(&app, "/api/sessions", json!({ "mode": "transcribe" })).await;
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        &format!("/api/sessions/{session_id}/chunks"),
        json!({ "seq": 3, "chunk": BASE64.encode(b"late") }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "sequence_mismatch");
    assert!(body["error"]["message"].as_str().unwrap().contains("expected 0"));
}

#[tokio::test]
async fn test_unknown_session_maps_to_not_found() {
    let (_dir, app) = test_router();

    let (status, body) = post_json(
        &app,
        "/api/sessions/no-such-id/chunks",
        json!({ "seq": 0, "chunk": BASE64.encode(b"x") }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "unknown_session");
}

#[tokio::test]
async fn test_invalid_base64_is_a_bad_request() {
    let (_dir, app) = test_router();

    let (_, body) = post_json(&app, "/api/sessions", json!({ "mode": "transcribe" })).await;
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        &format!("/api/sessions/{session_id}/chunks"),
        json!({ "seq": 0, "chunk": "%%not-base64%%" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_cancel_succeeds_for_unknown_ids() {
    let (_dir, app) = test_router();

    let (status, _) = post_json(&app, "/api/sessions/ghost/cancel", json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bad_mime_hint_is_rejected_at_start() {
    let (_dir, app) = test_router();

    let (status, body) = post_json(
        &app,
        "/api/sessions",
        json!({ "mimeHint": "application/zip", "mode": "transcribe" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "unsupported_type");
}
