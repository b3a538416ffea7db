//! Code runner for Sandpit
//!
//! Provides the high-level [`Sandbox`] API that validates a request and hands
//! it to the matching execution strategy.

use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(feature = "javascript")]
pub use crate::runner::javascript::JavaScriptSandbox;
pub use crate::runner::shell::{AllowList, AllowRule, SHELL_CONTROL_CHARS, ShellGateway};
pub use crate::runner::subprocess::SubprocessSandbox;

#[cfg(feature = "javascript")]
mod javascript;
mod shell;
mod subprocess;

use crate::{
    classifier::{Dispatch, ExecutionRequest, classify},
    config::Config,
    process::ProcessError,
    types::{ExecutionResult, ResourceLimits, TrustMode},
};

/// Whether JavaScript runs in this build
///
/// Without the `javascript` feature, JavaScript requests get the
/// unsupported-language result.
pub const JAVASCRIPT_ENABLED: bool = cfg!(feature = "javascript");

/// Errors that prevent an execution from producing a result
///
/// Failures of the executed code itself (exceptions, non-zero exits,
/// timeouts, rejected commands) are not errors; they are reported through
/// [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to start interpreter: {0}")]
    Spawn(#[source] ProcessError),

    #[error("scratch file error: {0}")]
    Scratch(#[source] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    /// Whether the caller sent a malformed request
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SandboxError::InvalidInput(_))
    }
}

impl From<ProcessError> for SandboxError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::ScratchCreate { .. } | ProcessError::ScratchRemove { .. } => {
                SandboxError::Scratch(err)
            }
            ProcessError::EmptyCommand | ProcessError::Spawn(_) | ProcessError::Wait(_) => {
                SandboxError::Spawn(err)
            }
        }
    }
}

/// High-level entry point for running code and commands
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: Config,
    subprocess: SubprocessSandbox,
    shell: ShellGateway,
}

impl Sandbox {
    /// Create a new sandbox with the given configuration
    pub fn new(config: Config) -> Self {
        let subprocess = SubprocessSandbox::from_config(&config);
        let shell = ShellGateway::from_config(&config.shell);
        Self {
            config,
            subprocess,
            shell,
        }
    }

    /// Create a new sandbox with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate and run a request
    ///
    /// `limits` override the configured limits field by field.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::InvalidInput`] for malformed requests, and
    /// another variant when the host could not run the request at all.
    #[instrument(skip(self, request, limits))]
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, SandboxError> {
        let dispatch = classify(request, self.config.max_source_bytes)?;
        debug!(?dispatch, "classified request");

        match dispatch {
            Dispatch::Interpreted(source) => {
                let limits = self
                    .config
                    .effective_limits(self.config.javascript.limits.as_ref(), limits);
                self.run_javascript(source, &limits).await
            }
            Dispatch::Subprocess(source) => {
                let limits = self
                    .config
                    .effective_limits(self.config.python.limits.as_ref(), limits);
                self.subprocess.run(&source, &limits).await
            }
            Dispatch::Shell { command, mode } => {
                let path_limits = match mode {
                    TrustMode::Trusted => self.config.shell.trusted_limits.as_ref(),
                    TrustMode::Restricted => self.config.shell.restricted_limits.as_ref(),
                };
                let limits = self.config.effective_limits(path_limits, limits);
                Ok(self.shell.run(&command, mode, &limits).await)
            }
            Dispatch::Unsupported(language) => Ok(ExecutionResult::unsupported(&language)),
        }
    }

    /// Run source text in the language named by `language_id`
    pub async fn run_code(
        &self,
        language_id: &str,
        source: impl Into<String>,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, SandboxError> {
        self.execute(ExecutionRequest::code(language_id, source), limits)
            .await
    }

    /// Run a shell command line
    pub async fn run_command(
        &self,
        command: impl Into<String>,
        mode: TrustMode,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, SandboxError> {
        self.execute(ExecutionRequest::command(command, mode), limits)
            .await
    }

    #[cfg(feature = "javascript")]
    async fn run_javascript(
        &self,
        source: String,
        limits: &ResourceLimits,
    ) -> Result<ExecutionResult, SandboxError> {
        JavaScriptSandbox::new().run(source, limits).await
    }

    #[cfg(not(feature = "javascript"))]
    async fn run_javascript(
        &self,
        _source: String,
        _limits: &ResourceLimits,
    ) -> Result<ExecutionResult, SandboxError> {
        Ok(ExecutionResult::unsupported("javascript"))
    }
}
