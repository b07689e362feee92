//! Runtime configuration for chat-relay.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! The provider API key is deliberately not part of the file: it is read from
//! the `OPENAI_API_KEY` environment variable at startup.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-relay", about = "HTTP/WebSocket relay for conversational LLM completions")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Upstream provider settings.
    pub provider: ProviderConfig,

    /// Streaming session tuning.
    pub session: SessionConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Timeout for plain HTTP requests in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Upstream provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// Model identifier for chat completions.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum tokens per completion.
    pub max_tokens: u32,

    /// Default assistant id for `/ws/assistant/*` sessions. Requests may
    /// override it per connection.
    pub assistant_id: Option<String>,

    /// Timeout for a single provider HTTP request in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 250,
            assistant_id: None,
            request_timeout_secs: 60,
        }
    }
}

/// Streaming session tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between run status polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// Maximum number of polls before the run is declared timed out.
    pub max_poll_attempts: usize,

    /// Maximum seconds to wait for a client tool-call result.
    pub tool_call_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_poll_attempts: 600, // 60s at the 100ms poll interval
            tool_call_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.session.poll_interval_ms, 100);
        assert_eq!(cfg.provider.max_tokens, 250);
        assert!(cfg.provider.assistant_id.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{"provider": {"model": "gpt-4"}, "session": {"max_poll_attempts": 50}}"#,
        )
        .unwrap();
        assert_eq!(cfg.provider.model, "gpt-4");
        assert_eq!(cfg.provider.temperature, 0.7);
        assert_eq!(cfg.session.max_poll_attempts, 50);
        assert_eq!(cfg.session.poll_interval_ms, 100);
    }
}
