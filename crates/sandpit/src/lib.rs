//! A library for sandboxed multi-language code execution.
//!
//! Sandpit accepts source text plus a language selector, or a literal shell
//! command, and runs it under wall clock and output limits, returning a
//! normalized [`ExecutionResult`].
//!
//! # Features
//!
//! - **JavaScript** runs in a fresh in-process V8 isolate with only a
//!   recording `console` injected (cargo feature `javascript`, on by default).
//! - **Python** runs through an external interpreter against a request-scoped
//!   scratch file that is always removed.
//! - **Shell commands** run through the host shell, either trusted or
//!   restricted to an allow-list.
//! - **TOML configuration** with environment overrides.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> Result<(), sandpit::SandboxError> {
//! let sandbox = sandpit::Sandbox::with_defaults();
//! let result = sandbox.run_code("python", "print('hi')", None).await?;
//! assert_eq!(result.output, "hi");
//! # Ok(())
//! # }
//! ```

pub use classifier::{Dispatch, ExecutionRequest, classify};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use process::{HostShell, ProcessError, ScratchFile};
#[cfg(feature = "javascript")]
pub use runner::JavaScriptSandbox;
pub use runner::{
    AllowList, AllowRule, JAVASCRIPT_ENABLED, Sandbox, SandboxError, ShellGateway,
    SubprocessSandbox,
};
pub use types::{ExecutionResult, ExitReason, LimitExceeded, ResourceLimits, TrustMode};

pub mod classifier;
pub mod config;
pub mod process;
pub mod runner;
pub mod types;
