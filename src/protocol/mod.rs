//! Wire types for the capture-session protocol.
//!
//! Four operations travel as JSON over HTTP: start, append, finalize and
//! cancel. Binary chunk payloads are base64-encoded so the channel stays
//! textual. Request shapes are fixed per operation; a missing required field
//! is a protocol error, never a silent default.

use serde::{Deserialize, Serialize};

/// What the session should produce: a transcript, or a transcript plus a
/// translation into the target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Transcribe,
    Translate,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_hint: Option<String>,
    pub mode: SessionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: String,
}

/// One ordered slice of captured audio. `chunk` is the base64 encoding of
/// the raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendChunkRequest {
    pub seq: u64,
    pub chunk: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub mode: SessionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

/// Produced once per successful finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
}

/// Error envelope used by every failing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Stable error codes carried in [`ErrorBody::code`].
pub mod codes {
    pub const UNKNOWN_SESSION: &str = "unknown_session";
    pub const SEQUENCE_MISMATCH: &str = "sequence_mismatch";
    pub const UNSUPPORTED_TYPE: &str = "unsupported_type";
    pub const TOO_LARGE: &str = "too_large";
    pub const FINALIZE_FAILED: &str = "finalize_failed";
    pub const STORAGE: &str = "storage";
    pub const BAD_REQUEST: &str = "bad_request";
}
