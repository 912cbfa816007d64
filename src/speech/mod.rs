//! Speech collaborator boundary: provider trait, provider selection, and
//! the language table used by translation prompts.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::SpeechConfig;

pub mod languages;
pub mod providers;

pub use providers::{OpenAiProvider, SpeechProvider};

/// Build the configured speech provider. The API key may come from config
/// or the `OPENAI_API_KEY` environment variable.
pub fn build_provider(config: &SpeechConfig) -> Result<Arc<dyn SpeechProvider>> {
    let provider_name = config.provider.as_deref().unwrap_or("openai-api");
    let provider: Arc<dyn SpeechProvider> = match provider_name {
        "openai-api" => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .context("api_key is required for the OpenAI provider (config or OPENAI_API_KEY)")?;
            Arc::new(OpenAiProvider::new(
                api_key,
                config.api_endpoint.clone(),
                config.transcribe_model.clone(),
                config.translate_model.clone(),
            )?)
        }
        other => bail!(
            "Unknown speech provider '{}'. Supported providers: openai-api",
            other
        ),
    };

    info!("Using {} for speech", provider.name());
    Ok(provider)
}
