use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock time limit in seconds
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// Maximum output size in kilobytes (applied per stream)
    #[serde(default)]
    pub max_output: Option<u64>,

    /// Memory limit in kilobytes (heap cap for the JavaScript isolate)
    #[serde(default)]
    pub memory_limit: Option<u64>,
}

impl ResourceLimits {
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;

    /// Create new resource limits with all fields set to their defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource limits with every field unset, useful as an override base
    pub fn unset() -> Self {
        Self {
            wall_time_limit: None,
            max_output: None,
            memory_limit: None,
        }
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the maximum output size in kilobytes
    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// Set the memory limit in kilobytes
    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            max_output: overrides.max_output.or(self.max_output),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
        }
    }

    /// Apply an optional override
    pub fn merged(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        match overrides {
            Some(limits) => self.with_overrides(limits),
            None => self.clone(),
        }
    }

    /// Wall clock limit as a duration, falling back to the default limit
    ///
    /// Negative and NaN values are clamped to zero.
    pub fn wall_time(&self) -> Duration {
        let seconds = self
            .wall_time_limit
            .unwrap_or(DEFAULT_WALL_TIME_LIMIT)
            .max(0.0);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Output cap in bytes, falling back to the default cap
    pub fn max_output_bytes(&self) -> usize {
        let kb = self.max_output.unwrap_or(DEFAULT_MAX_OUTPUT_KB);
        usize::try_from(kb.saturating_mul(1024)).unwrap_or(usize::MAX)
    }

    /// Memory cap in bytes, falling back to the default cap
    pub fn memory_bytes(&self) -> usize {
        let kb = self.memory_limit.unwrap_or(DEFAULT_MEMORY_LIMIT_KB);
        usize::try_from(kb.saturating_mul(1024)).unwrap_or(usize::MAX)
    }
}

const DEFAULT_WALL_TIME_LIMIT: f64 = 5.0;
const DEFAULT_MAX_OUTPUT_KB: u64 = 1024; // 1 MB
const DEFAULT_MEMORY_LIMIT_KB: u64 = 65536; // 64 MB

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(DEFAULT_WALL_TIME_LIMIT),
            max_output: Some(DEFAULT_MAX_OUTPUT_KB),
            memory_limit: Some(DEFAULT_MEMORY_LIMIT_KB),
        }
    }
}

/// Normalized result of an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Text shown to the caller
    pub output: String,

    /// Whether the executed code or command signaled failure
    pub is_error: bool,

    /// Why the execution ended
    pub exit_reason: ExitReason,

    /// Secondary status indicating which limit was exceeded (if any)
    #[serde(default)]
    pub limit_exceeded: LimitExceeded,

    /// Exit code if a child process exited normally
    #[serde(default)]
    pub exit_code: Option<i32>,

    /// Wall clock time used in seconds
    #[serde(default)]
    pub wall_time: f64,
}

impl ExecutionResult {
    /// A successful execution with the given output
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    /// The executed code failed on its own terms
    pub fn runtime_error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
            exit_reason: ExitReason::RuntimeError,
            ..Default::default()
        }
    }

    /// The wall clock limit was hit and the execution was stopped
    pub fn timeout(limit: std::time::Duration) -> Self {
        Self {
            output: format!("Execution timed out after {}s", limit.as_secs_f64()),
            is_error: true,
            exit_reason: ExitReason::Timeout,
            limit_exceeded: LimitExceeded::WallTime,
            wall_time: limit.as_secs_f64(),
            ..Default::default()
        }
    }

    /// The shell command was rejected before anything was spawned
    pub fn disallowed(command: &str) -> Self {
        Self {
            output: format!("Command not allowed: {command}"),
            is_error: false,
            exit_reason: ExitReason::Disallowed,
            ..Default::default()
        }
    }

    /// The requested language has no execution strategy
    pub fn unsupported(language: &str) -> Self {
        Self::completed(format!(
            "Code execution for {language} is not supported yet."
        ))
    }

    /// Check if the execution completed without error
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.exit_reason, ExitReason::Completed) && !self.is_error
    }

    pub(crate) fn with_wall_time(mut self, elapsed: std::time::Duration) -> Self {
        self.wall_time = elapsed.as_secs_f64();
        self
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            output: String::new(),
            is_error: false,
            exit_reason: ExitReason::Completed,
            limit_exceeded: LimitExceeded::NotExceeded,
            exit_code: None,
            wall_time: 0.0,
        }
    }
}

/// Why an execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Ran to completion (possibly with a non-error "unsupported" message)
    Completed,

    /// Wall clock limit exceeded, execution forcibly stopped
    Timeout,

    /// The code itself failed (exception, non-zero exit, limit hit)
    RuntimeError,

    /// Shell command rejected by the allow-list
    Disallowed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::Completed => "completed",
            ExitReason::Timeout => "timeout",
            ExitReason::RuntimeError => "runtime_error",
            ExitReason::Disallowed => "disallowed",
        };
        f.write_str(name)
    }
}

/// Secondary status indicating which resource limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LimitExceeded {
    /// No limit was exceeded
    #[default]
    #[serde(rename = "none")]
    NotExceeded,

    /// Wall clock time limit exceeded
    #[serde(rename = "wall_time")]
    WallTime,

    /// Output limit exceeded
    #[serde(rename = "output")]
    Output,

    /// Memory (heap) limit exceeded
    #[serde(rename = "memory")]
    Memory,
}

impl LimitExceeded {
    /// Check if any limit was exceeded
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        !matches!(self, LimitExceeded::NotExceeded)
    }
}

/// Trust level of a shell command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustMode {
    /// Any command runs; only for controlled deployments
    Trusted,

    /// Only allow-listed commands run
    Restricted,
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn with_overrides_identity(
            wall_time in proptest::option::of(0.0f64..1000.0),
            output in proptest::option::of(0u64..1_000_000),
            memory in proptest::option::of(0u64..1_000_000),
        ) {
            let base = ResourceLimits {
                wall_time_limit: wall_time,
                max_output: output,
                memory_limit: memory,
            };

            let result = base.with_overrides(&ResourceLimits::unset());
            prop_assert_eq!(result, base);
        }

        #[test]
        fn with_overrides_full_override(
            base_time in proptest::option::of(0.0f64..1000.0),
            override_time in 0.0f64..1000.0,
        ) {
            let base = ResourceLimits {
                wall_time_limit: base_time,
                ..Default::default()
            };
            let overrides = ResourceLimits::unset().with_wall_time_limit(override_time);

            let result = base.with_overrides(&overrides);
            prop_assert_eq!(result.wall_time_limit, Some(override_time));
        }

        #[test]
        fn wall_time_never_panics(seconds in proptest::num::f64::ANY) {
            let _ = ResourceLimits::unset().with_wall_time_limit(seconds).wall_time();
        }
    }
}
