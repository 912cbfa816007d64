use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::api::ApiServer;
use crate::config::Config;
use crate::global;
use crate::session::{SessionLimits, SessionRegistry};
use crate::speech;

use super::ServeCliArgs;

pub async fn handle_serve_command(args: ServeCliArgs) -> Result<()> {
    info!("Starting voxnote server");

    let config = Config::load()?;

    let speech_provider = speech::build_provider(&config.speech)?;

    let spool_dir = match &config.server.spool_dir {
        Some(dir) => dir.clone(),
        None => global::spool_dir()?,
    };
    let limits = SessionLimits {
        max_chunk_bytes: config.server.max_chunk_bytes,
        max_session_bytes: config.server.max_session_bytes,
    };
    let registry = Arc::new(SessionRegistry::open(spool_dir, speech_provider, limits)?);

    let server = ApiServer::new(registry, &config.server, args.port);
    server.start().await
}
