//! Capture-session protocol endpoints.
//!
//! Four operations, one route each:
//! - POST /api/sessions                 — allocate a session
//! - POST /api/sessions/:id/chunks     — append one ordered chunk
//! - POST /api/sessions/:id/finalize   — assemble, transcribe, close
//! - POST /api/sessions/:id/cancel     — discard (idempotent)

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};

use crate::protocol::{
    AppendChunkRequest, FinalizeRequest, StartSessionRequest, StartSessionResponse,
    TranscriptResult,
};
use crate::session::SessionRegistry;

use super::super::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct SessionsState {
    pub registry: Arc<SessionRegistry>,
}

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/:id/chunks", post(append_chunk))
        .route("/api/sessions/:id/finalize", post(finalize_session))
        .route("/api/sessions/:id/cancel", post(cancel_session))
        .with_state(state)
}

async fn start_session(
    State(state): State<SessionsState>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<Json<StartSessionResponse>> {
    let session_id = state.registry.start(&request).await?;
    Ok(Json(StartSessionResponse { session_id }))
}

async fn append_chunk(
    State(state): State<SessionsState>,
    Path(session_id): Path<String>,
    Json(request): Json<AppendChunkRequest>,
) -> ApiResult<Json<Value>> {
    let bytes = BASE64
        .decode(request.chunk.as_bytes())
        .map_err(|err| ApiError::bad_request(format!("chunk is not valid base64: {err}")))?;
    state.registry.append(&session_id, request.seq, &bytes).await?;
    Ok(Json(json!({})))
}

async fn finalize_session(
    State(state): State<SessionsState>,
    Path(session_id): Path<String>,
    // The body must match the fixed request shape, but the mode and
    // languages fixed at start are authoritative.
    Json(_request): Json<FinalizeRequest>,
) -> ApiResult<Json<TranscriptResult>> {
    let result = state.registry.finalize(&session_id).await?;
    Ok(Json(result))
}

async fn cancel_session(
    State(state): State<SessionsState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    state.registry.cancel(&session_id).await;
    Json(json!({}))
}
