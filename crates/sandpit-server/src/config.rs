//! Server and suggestion settings
//!
//! These live in the `[server]` and `[suggest]` sections of the same TOML
//! file the sandbox reads, and take the same `SANDPIT__*` overrides.

use std::net::SocketAddr;
use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};
use sandpit::config::{ConfigError, EXAMPLE_CONFIG, environment};
use sandpit::types::ResourceLimits;
use serde::{Deserialize, Serialize};

/// Settings for the HTTP server and its collaborators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub suggest: SuggestConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: SocketAddr,

    /// Mount `POST /api/internal/shell`, which runs any command on the host
    pub expose_trusted_shell: bool,

    /// Limits for `POST /api/run`
    pub run_limits: Option<ResourceLimits>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            expose_trusted_shell: false,
            run_limits: Some(ResourceLimits::unset().with_wall_time_limit(10.0)),
        }
    }
}

/// Settings for the chat-completions client behind `POST /api/suggest`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    pub model: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_owned(),
            model: "llama3-70b-8192".to_owned(),
            api_key_env: "GROQ_API_KEY".to_owned(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from a file (or the embedded example) with environment
    /// overrides applied
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => ConfigBuilder::builder().add_source(File::from(path)),
            None => ConfigBuilder::builder()
                .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml)),
        };
        let settings = builder.add_source(environment()).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parse settings from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let settings = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
