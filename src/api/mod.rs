//! HTTP server for the capture-session protocol.
//!
//! Exposes the four protocol operations plus service-info and health
//! endpoints, and runs the idle-session sweep in the background.

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::session::SessionRegistry;

use routes::sessions::SessionsState;

pub struct ApiServer {
    port: u16,
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl ApiServer {
    pub fn new(registry: Arc<SessionRegistry>, config: &ServerConfig, port: Option<u16>) -> Self {
        Self {
            port: port.unwrap_or(config.port),
            registry,
            idle_timeout: Duration::from_secs(config.session_idle_timeout_seconds),
            sweep_interval: Duration::from_secs(config.sweep_interval_seconds),
        }
    }

    pub async fn start(self) -> Result<()> {
        spawn_sweeper(
            Arc::clone(&self.registry),
            self.sweep_interval,
            self.idle_timeout,
        );

        let state = SessionsState {
            registry: self.registry,
        };
        let app = Router::new()
            .route("/", get(status))
            .route("/api/health", get(health))
            .merge(routes::sessions::router(state))
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                            - Service info");
        info!("  GET  /api/health                  - Health check");
        info!("  POST /api/sessions                - Start a capture session");
        info!("  POST /api/sessions/:id/chunks     - Append an ordered chunk");
        info!("  POST /api/sessions/:id/finalize   - Finalize and transcribe");
        info!("  POST /api/sessions/:id/cancel     - Cancel a session");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

fn spawn_sweeper(registry: Arc<SessionRegistry>, interval: Duration, idle_timeout: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let swept = registry.sweep(idle_timeout).await;
            if swept > 0 {
                info!("Sweeper reclaimed {} idle session(s)", swept);
            } else {
                debug!("Sweeper found nothing to reclaim");
            }
        }
    });
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "voxnote",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}
