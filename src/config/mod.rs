use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub speech: SpeechConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Override for the spool directory; defaults to the data dir.
    pub spool_dir: Option<PathBuf>,
    /// Largest single chunk accepted by append, in bytes.
    pub max_chunk_bytes: u64,
    /// Largest total session size accepted, in bytes.
    pub max_session_bytes: u64,
    /// Sessions idle longer than this are reclaimed by the sweep.
    pub session_idle_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    pub transcribe_model: Option<String>,
    pub translate_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub server_url: String,
    /// How often the emitter slices the live stream into a chunk.
    pub chunk_interval_ms: u64,
    /// Recording ceiling; reaching it stops the recording as if the
    /// operator had asked.
    pub max_duration_seconds: u64,
    pub language: Option<String>,
    pub translate_by_default: bool,
    pub target_language: Option<String>,
    pub copy_to_clipboard: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3747,
            spool_dir: None,
            max_chunk_bytes: 1024 * 1024,
            max_session_bytes: 20 * 1024 * 1024,
            session_idle_timeout_seconds: 600,
            sweep_interval_seconds: 60,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: Some("openai-api".to_string()),
            api_key: None,
            api_endpoint: None,
            transcribe_model: None,
            translate_model: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3747".to_string(),
            chunk_interval_ms: 1000,
            max_duration_seconds: 120,
            language: None,
            translate_by_default: false,
            target_language: Some("en".to_string()),
            copy_to_clipboard: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3747);
        assert_eq!(config.capture.max_duration_seconds, 120);
        assert_eq!(config.capture.target_language.as_deref(), Some("en"));
        assert!(!config.capture.translate_by_default);
        assert_eq!(config.speech.provider.as_deref(), Some("openai-api"));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_session_bytes, 20 * 1024 * 1024);
        assert_eq!(config.capture.chunk_interval_ms, 1000);
    }
}
