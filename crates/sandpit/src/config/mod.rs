use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{
    DEFAULT_SANDBOX_PATH, FileExtension, InterpreterConfig, JavaScriptConfig, Language,
    SOURCE_PLACEHOLDER,
};
use crate::config::language::default_sandbox_path;
pub use crate::config::loader::environment;
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../sandpit.example.toml");

/// Prefix of environment variables layered over the config file
pub const ENV_PREFIX: &str = "SANDPIT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Sandpit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for request-scoped scratch files (system temp dir if not specified).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Largest accepted source text in bytes.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,

    /// Default resource limits applied to all executions.
    /// Per-path limits and request limits override these field by field.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// In-process JavaScript isolate settings
    #[serde(default)]
    pub javascript: JavaScriptConfig,

    /// External Python interpreter settings
    #[serde(default)]
    pub python: InterpreterConfig,

    /// Shell gateway settings
    #[serde(default)]
    pub shell: ShellConfig,
}

/// Configuration for the shell gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell binary (host default if not specified)
    pub program: Option<PathBuf>,

    /// Commands accepted in restricted mode, each matching exactly or
    /// followed by a space and arguments
    pub allow_list: Vec<String>,

    /// PATH environment variable for shell children
    pub path: String,

    /// Limits for trusted (unrestricted) commands
    pub trusted_limits: Option<ResourceLimits>,

    /// Limits for allow-listed commands
    pub restricted_limits: Option<ResourceLimits>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: None,
            allow_list: default_allow_list(),
            path: default_sandbox_path(),
            trusted_limits: None,
            restricted_limits: None,
        }
    }
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from built-in defaults only
    pub fn empty() -> Self {
        Self {
            scratch_dir: None,
            max_source_bytes: default_max_source_bytes(),
            default_limits: ResourceLimits::default(),
            javascript: JavaScriptConfig::default(),
            python: InterpreterConfig::default(),
            shell: ShellConfig::default(),
        }
    }

    /// Directory where scratch files are created
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Merge resource limits: defaults, then per-path limits, then request overrides
    pub fn effective_limits(
        &self,
        path_limits: Option<&ResourceLimits>,
        overrides: Option<&ResourceLimits>,
    ) -> ResourceLimits {
        self.default_limits.merged(path_limits).merged(overrides)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_max_source_bytes() -> usize {
    64 * 1024
}

fn default_allow_list() -> Vec<String> {
    [
        "ls",
        "pwd",
        "echo",
        "date",
        "whoami",
        "uname",
        "node -v",
        "npm -v",
        "python --version",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}
