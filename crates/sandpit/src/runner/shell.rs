//! Shell command gateway
//!
//! Restricted mode only spawns commands matching the allow-list and free of
//! shell control characters. Trusted mode runs anything the host shell
//! accepts.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::ShellConfig;
use crate::process::{CaptureLimits, CapturedOutput, HostShell, Termination, run_captured};
use crate::types::{ExecutionResult, LimitExceeded, ResourceLimits, TrustMode};

/// Characters that let one command line start or redirect another
pub const SHELL_CONTROL_CHARS: [char; 11] = [';', '&', '|', '<', '>', '$', '`', '(', ')', '\n', '\r'];

/// A single allow-list rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowRule {
    /// The command must equal this string
    Exact(String),

    /// The command must start with this string
    Prefix(String),
}

impl AllowRule {
    pub fn matches(&self, command: &str) -> bool {
        match self {
            AllowRule::Exact(exact) => command == exact,
            AllowRule::Prefix(prefix) => command.starts_with(prefix.as_str()),
        }
    }
}

/// Ordered set of commands accepted in restricted mode
///
/// Each entry `e` allows the command `e` itself and `e` followed by a space
/// and arguments. Nothing else matches: `lsblk` is not allowed by `ls`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowList {
    rules: Vec<AllowRule>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = entries
            .into_iter()
            .flat_map(|entry| {
                let entry = entry.as_ref();
                [
                    AllowRule::Exact(entry.to_owned()),
                    AllowRule::Prefix(format!("{entry} ")),
                ]
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[AllowRule] {
        &self.rules
    }

    /// Whether any rule matches `command`
    pub fn permits(&self, command: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(command))
    }
}

/// Whether `command` contains a character that chains or redirects commands
pub fn has_shell_control(command: &str) -> bool {
    command.contains(SHELL_CONTROL_CHARS)
}

/// Runs literal command lines through the host shell
#[derive(Debug, Clone)]
pub struct ShellGateway {
    shell: HostShell,
    allow_list: Arc<AllowList>,
    path: String,
}

impl ShellGateway {
    pub fn new(shell: HostShell, allow_list: AllowList, path: impl Into<String>) -> Self {
        Self {
            shell,
            allow_list: Arc::new(allow_list),
            path: path.into(),
        }
    }

    pub fn from_config(config: &ShellConfig) -> Self {
        let shell = match &config.program {
            Some(program) => HostShell::with_program(program),
            None => HostShell::detect(),
        };
        Self::new(shell, AllowList::new(&config.allow_list), &config.path)
    }

    /// Whether `command` may run in restricted mode
    pub fn is_allowed(&self, command: &str) -> bool {
        !has_shell_control(command) && self.allow_list.permits(command)
    }

    /// Run `command` and report how it went
    ///
    /// Never fails: rejected commands, spawn failures, non-zero exits and
    /// timeouts are all described by the returned result.
    ///
    /// Restricted commands run with a cleared environment (only `PATH`);
    /// trusted commands inherit the server's environment.
    #[instrument(skip(self, limits))]
    pub async fn run(
        &self,
        command: &str,
        mode: TrustMode,
        limits: &ResourceLimits,
    ) -> ExecutionResult {
        if mode == TrustMode::Restricted && !self.is_allowed(command) {
            debug!("command rejected by allow-list");
            return ExecutionResult::disallowed(command);
        }

        let mut child = self.shell.command(command);
        match mode {
            TrustMode::Restricted => {
                child.env_clear().env("PATH", &self.path);
            }
            TrustMode::Trusted => {
                child.env("PATH", &self.path);
            }
        }

        let capture = CaptureLimits::from(limits);
        match run_captured(child, &capture).await {
            Ok(captured) => interpret(captured, capture),
            Err(e) => {
                warn!(error = %e, "shell command could not be started");
                ExecutionResult::runtime_error(format!("Error: {e}"))
            }
        }
    }
}

fn interpret(captured: CapturedOutput, capture: CaptureLimits) -> ExecutionResult {
    let stdout = captured.stdout_lossy();
    let stderr = captured.stderr_lossy();
    let stdout = stdout.trim_end();
    let stderr = stderr.trim_end();

    let result = match captured.termination {
        Termination::TimedOut => {
            warn!(limit = ?capture.wall_time, "shell command timed out");
            ExecutionResult::timeout(capture.wall_time)
        }
        Termination::OutputExceeded => ExecutionResult {
            limit_exceeded: LimitExceeded::Output,
            ..ExecutionResult::runtime_error(if stdout.is_empty() { stderr } else { stdout })
        },
        Termination::Exited(status) if status.success() => {
            if stdout.is_empty() {
                ExecutionResult::completed("Command executed successfully")
            } else {
                ExecutionResult::completed(stdout)
            }
        }
        Termination::Exited(status) => {
            let output = if !stderr.is_empty() {
                stderr.to_owned()
            } else if !stdout.is_empty() {
                stdout.to_owned()
            } else {
                match status.code() {
                    Some(code) => format!("Error: command exited with status {code}"),
                    None => "Error: command was terminated by a signal".to_owned(),
                }
            };
            ExecutionResult::runtime_error(output)
        }
    };

    ExecutionResult {
        exit_code: captured.exit_code(),
        ..result
    }
    .with_wall_time(captured.elapsed)
}
