//! Request validation and dispatch selection
//!
//! Every request passes through [`classify`] before anything is executed, so
//! malformed input is rejected without side effects.

use crate::config::Language;
use crate::runner::SandboxError;
use crate::types::TrustMode;

/// An incoming execution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionRequest {
    /// Source text in a given language
    Code { language: Language, source: String },

    /// A literal shell command line
    Command { command: String, mode: TrustMode },
}

impl ExecutionRequest {
    /// Code request with a language id as sent by clients
    pub fn code(language_id: &str, source: impl Into<String>) -> Self {
        ExecutionRequest::Code {
            language: Language::from_id(language_id),
            source: source.into(),
        }
    }

    pub fn command(command: impl Into<String>, mode: TrustMode) -> Self {
        ExecutionRequest::Command {
            command: command.into(),
            mode,
        }
    }
}

/// Execution strategy selected for a validated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Run in the in-process JavaScript isolate
    Interpreted(String),

    /// Run through the external interpreter against a scratch file
    Subprocess(String),

    /// Run through the shell gateway
    Shell { command: String, mode: TrustMode },

    /// No strategy exists for this language id
    Unsupported(String),
}

/// Validate `request` and pick its execution strategy
pub fn classify(
    request: ExecutionRequest,
    max_source_bytes: usize,
) -> Result<Dispatch, SandboxError> {
    match request {
        ExecutionRequest::Code { language, source } => {
            if source.is_empty() {
                return Err(SandboxError::InvalidInput("code is required".to_owned()));
            }
            if source.len() > max_source_bytes {
                return Err(SandboxError::InvalidInput(format!(
                    "code is {} bytes, limit is {max_source_bytes}",
                    source.len()
                )));
            }
            Ok(match language {
                Language::JavaScript => Dispatch::Interpreted(source),
                Language::Python => Dispatch::Subprocess(source),
                Language::Unsupported(id) => Dispatch::Unsupported(id),
            })
        }
        ExecutionRequest::Command { command, mode } => {
            if command.trim().is_empty() {
                return Err(SandboxError::InvalidInput(
                    "command is required".to_owned(),
                ));
            }
            Ok(Dispatch::Shell { command, mode })
        }
    }
}
