//! Child process plumbing
//!
//! This module owns everything that touches the host OS on behalf of the
//! sandboxes: request-scoped scratch files, spawning children under wall
//! clock and output limits, and picking the host shell.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::process::capture::{CaptureLimits, CapturedOutput, Termination, run_captured};
pub use crate::process::platform::HostShell;
pub use crate::process::scratch::ScratchFile;

mod capture;
mod platform;
mod scratch;

/// Errors that occur while preparing or running a child process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to write scratch file {path}: {source}")]
    ScratchCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove scratch file {path}: {source}")]
    ScratchRemove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
