//! Interpreted languages run as child processes
//!
//! The source is written to a request-scoped scratch file and the configured
//! interpreter is started on it with a cleared environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::{Config, InterpreterConfig};
use crate::process::{
    CaptureLimits, CapturedOutput, ProcessError, ScratchFile, Termination, run_captured,
};
use crate::runner::SandboxError;
use crate::types::{ExecutionResult, LimitExceeded, ResourceLimits};

/// Runs source text through an external interpreter
///
/// Each run writes the source to its own [`ScratchFile`], spawns the
/// interpreter against it and removes the file once the child is gone.
#[derive(Debug, Clone)]
pub struct SubprocessSandbox {
    interpreter: InterpreterConfig,
    scratch_dir: PathBuf,
}

impl SubprocessSandbox {
    pub fn new(interpreter: InterpreterConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Python interpreter and scratch directory from `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.python.clone(), config.scratch_dir())
    }

    /// Run `source` under `limits`
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Scratch`] when the scratch file cannot be
    /// written or removed and [`SandboxError::Spawn`] when the interpreter
    /// cannot be started. The scratch file is gone in every case.
    #[instrument(skip(self, source, limits), fields(interpreter = %self.interpreter.name))]
    pub async fn run(
        &self,
        source: &str,
        limits: &ResourceLimits,
    ) -> Result<ExecutionResult, SandboxError> {
        let scratch = ScratchFile::create(
            &self.scratch_dir,
            &self.interpreter.extension,
            source.as_bytes(),
        )
        .await?;

        let capture = CaptureLimits::from(limits);
        let outcome = match self.command(scratch.path()) {
            Ok(command) => run_captured(command, &capture).await,
            Err(e) => Err(e),
        };

        let captured = match outcome {
            Ok(captured) => captured,
            Err(e) => {
                if let Err(cleanup) = scratch.remove().await {
                    warn!(error = %cleanup, "scratch cleanup failed after spawn failure");
                }
                return Err(e.into());
            }
        };
        scratch.remove().await?;

        Ok(interpret(captured, capture.wall_time))
    }

    fn command(&self, source: &Path) -> Result<Command, ProcessError> {
        let args = self.interpreter.expand_command(source);
        let (program, rest) = args.split_first().ok_or(ProcessError::EmptyCommand)?;
        debug!(?args, "running interpreter");

        let mut command = Command::new(program);
        command
            .args(rest)
            .env_clear()
            .env("PATH", &self.interpreter.path)
            .envs(&self.interpreter.env)
            .current_dir(&self.scratch_dir);
        Ok(command)
    }
}

/// Turn a finished child into a caller-facing result
fn interpret(captured: CapturedOutput, wall_limit: Duration) -> ExecutionResult {
    let stdout = captured.stdout_lossy();
    let stderr = captured.stderr_lossy();

    let result = match captured.termination {
        Termination::TimedOut => {
            warn!(limit = ?wall_limit, "interpreter timed out");
            ExecutionResult::timeout(wall_limit)
        }
        Termination::OutputExceeded => ExecutionResult {
            limit_exceeded: LimitExceeded::Output,
            ..ExecutionResult::runtime_error(first_non_empty(&stdout, &stderr))
        },
        Termination::Exited(status) if status.success() => {
            ExecutionResult::completed(first_non_empty(&stdout, &stderr))
        }
        Termination::Exited(_) => ExecutionResult::runtime_error(first_non_empty(&stderr, &stdout)),
    };

    ExecutionResult {
        exit_code: captured.exit_code(),
        ..result
    }
    .with_wall_time(captured.elapsed)
}

fn first_non_empty(primary: &str, fallback: &str) -> String {
    let primary = primary.trim();
    if primary.is_empty() {
        fallback.trim().to_owned()
    } else {
        primary.to_owned()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::FileExtension;
    use crate::types::ExitReason;

    /// `sh` stands in for the interpreter so these run on any POSIX host
    fn sh_sandbox(dir: &Path) -> SubprocessSandbox {
        let interpreter = InterpreterConfig {
            name: "sh".to_owned(),
            extension: FileExtension::new("sh").unwrap(),
            command: vec!["sh".to_owned(), "{source}".to_owned()],
            ..Default::default()
        };
        SubprocessSandbox::new(interpreter, dir)
    }

    fn limits() -> ResourceLimits {
        ResourceLimits::unset().with_wall_time_limit(5.0)
    }

    fn leftover_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn success_returns_trimmed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let result = sh_sandbox(dir.path())
            .run("echo '  hi  '", &limits())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.output, "hi");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn success_falls_back_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let result = sh_sandbox(dir.path())
            .run("echo warning >&2", &limits())
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.output, "warning");
    }

    #[tokio::test]
    async fn failure_prefers_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let result = sh_sandbox(dir.path())
            .run("echo partial; echo boom >&2; exit 2", &limits())
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(result.exit_reason, ExitReason::RuntimeError);
        assert_eq!(result.output, "boom");
        assert_eq!(result.exit_code, Some(2));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn timeout_kills_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let limits = ResourceLimits::unset().with_wall_time_limit(0.3);
        let result = sh_sandbox(dir.path())
            .run("while true; do :; done", &limits)
            .await
            .unwrap();

        assert_eq!(result.exit_reason, ExitReason::Timeout);
        assert_eq!(result.limit_exceeded, LimitExceeded::WallTime);
        assert_eq!(result.output, "Execution timed out after 0.3s");
        assert!(result.wall_time < 3.0);
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn output_overflow_is_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        let limits = ResourceLimits::unset()
            .with_wall_time_limit(10.0)
            .with_max_output(1);
        let result = sh_sandbox(dir.path())
            .run("while true; do echo xxxxxxxx; done", &limits)
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(result.limit_exceeded, LimitExceeded::Output);
        assert!(result.output.len() <= 1024);
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let result = sh_sandbox(dir.path())
            .run("echo \"[$HOME]\"", &limits())
            .await
            .unwrap();
        assert_eq!(result.output, "[]");
    }

    #[tokio::test]
    async fn configured_env_is_passed() {
        let dir = tempfile::tempdir().unwrap();
        let mut sandbox = sh_sandbox(dir.path());
        sandbox
            .interpreter
            .env
            .insert("GREETING".to_owned(), "hola".to_owned());
        let result = sandbox.run("echo $GREETING", &limits()).await.unwrap();
        assert_eq!(result.output, "hola");
    }

    #[tokio::test]
    async fn missing_interpreter_is_spawn_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = InterpreterConfig {
            command: vec![
                "/nonexistent/interpreter".to_owned(),
                "{source}".to_owned(),
            ],
            ..Default::default()
        };
        let sandbox = SubprocessSandbox::new(interpreter, dir.path());

        let err = sandbox.run("print(1)", &limits()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(_)));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn empty_command_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = InterpreterConfig {
            command: Vec::new(),
            ..Default::default()
        };
        let err = SubprocessSandbox::new(interpreter, dir.path())
            .run("x", &limits())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(ProcessError::EmptyCommand)));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn concurrent_identical_sources_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sh_sandbox(dir.path());
        let start = std::time::Instant::now();

        // `$0` is the scratch file the interpreter was started on
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sandbox = sandbox.clone();
                tokio::spawn(async move { sandbox.run("sleep 0.3; echo \"$0\"", &limits()).await })
            })
            .collect();

        let mut paths = std::collections::HashSet::new();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert!(result.is_success(), "unexpected result: {result:?}");
            assert!(Path::new(&result.output).starts_with(dir.path()));
            paths.insert(result.output);
        }

        assert_eq!(paths.len(), 8);
        // Sequential runs would take at least 8 * 0.3s
        assert!(start.elapsed() < Duration::from_millis(2000));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn first_non_empty_trims() {
        assert_eq!(first_non_empty("  a \n", "b"), "a");
        assert_eq!(first_non_empty(" \n", " b "), "b");
        assert_eq!(first_non_empty("", ""), "");
    }
}
