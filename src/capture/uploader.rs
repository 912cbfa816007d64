//! Client side of the session protocol: the RPC surface and the chunk
//! uploader that keeps at most one chunk in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;
use tracing::debug;

use crate::protocol::{
    codes, AppendChunkRequest, ErrorEnvelope, FinalizeRequest, StartSessionRequest,
    StartSessionResponse, TranscriptResult,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Failure of one protocol round trip, as seen by the client.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("{0}")]
    SequenceMismatch(String),
    #[error("{0}")]
    Api(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// The four request/response operations of the capture-session protocol.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn start(&self, request: &StartSessionRequest) -> Result<String, RpcError>;

    async fn append(&self, session_id: &str, seq: u64, chunk: &[u8]) -> Result<(), RpcError>;

    async fn finalize(
        &self,
        session_id: &str,
        request: &FinalizeRequest,
    ) -> Result<TranscriptResult, RpcError>;

    async fn cancel(&self, session_id: &str) -> Result<(), RpcError>;
}

/// One ordered chunk awaiting acknowledgment.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub seq: u64,
    pub bytes: Vec<u8>,
}

/// Sends chunks strictly one at a time; the next chunk is not sent until
/// the previous one is acknowledged.
pub struct ChunkUploader {
    api: Arc<dyn SessionApi>,
    in_flight: AtomicBool,
}

impl ChunkUploader {
    pub fn new(api: Arc<dyn SessionApi>) -> Self {
        Self {
            api,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> &dyn SessionApi {
        self.api.as_ref()
    }

    pub fn api_handle(&self) -> Arc<dyn SessionApi> {
        Arc::clone(&self.api)
    }

    pub async fn upload(&self, session_id: &str, chunk: &PendingChunk) -> Result<(), RpcError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(RpcError::Api(
                "a chunk upload is already in flight".to_string(),
            ));
        }
        debug!(
            "Uploading chunk {} ({} bytes) for session {}",
            chunk.seq,
            chunk.bytes.len(),
            session_id
        );
        let result = self.api.append(session_id, chunk.seq, &chunk.bytes).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }
}

/// JSON-over-HTTP implementation of [`SessionApi`].
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to initialise HTTP client")?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn start(&self, request: &StartSessionRequest) -> Result<String, RpcError> {
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let payload: StartSessionResponse = parse_response(response).await?;
        Ok(payload.session_id)
    }

    async fn append(&self, session_id: &str, seq: u64, chunk: &[u8]) -> Result<(), RpcError> {
        let request = AppendChunkRequest {
            seq,
            chunk: BASE64.encode(chunk),
        };
        let response = self
            .client
            .post(self.url(&format!("/api/sessions/{session_id}/chunks")))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let _: serde_json::Value = parse_response(response).await?;
        Ok(())
    }

    async fn finalize(
        &self,
        session_id: &str,
        request: &FinalizeRequest,
    ) -> Result<TranscriptResult, RpcError> {
        let response = self
            .client
            .post(self.url(&format!("/api/sessions/{session_id}/finalize")))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        parse_response(response).await
    }

    async fn cancel(&self, session_id: &str) -> Result<(), RpcError> {
        let response = self
            .client
            .post(self.url(&format!("/api/sessions/{session_id}/cancel")))
            .send()
            .await
            .map_err(transport)?;
        let _: serde_json::Value = parse_response(response).await?;
        Ok(())
    }
}

fn transport(err: reqwest::Error) -> RpcError {
    RpcError::Transport(err.to_string())
}

async fn parse_response<T>(response: reqwest::Response) -> Result<T, RpcError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| RpcError::Transport(format!("Failed decoding response: {err}")));
    }

    let body = response.text().await.unwrap_or_default();
    let error = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => match envelope.error.code.as_str() {
            codes::UNKNOWN_SESSION => RpcError::UnknownSession(envelope.error.message),
            codes::SEQUENCE_MISMATCH => RpcError::SequenceMismatch(envelope.error.message),
            _ => RpcError::Api(envelope.error.message),
        },
        Err(_) if body.trim().is_empty() => RpcError::Api(format!("HTTP {status}")),
        Err(_) => RpcError::Api(format!("HTTP {status}: {body}")),
    };
    Err(error)
}
