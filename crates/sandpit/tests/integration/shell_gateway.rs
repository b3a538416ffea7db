use std::time::{Duration, Instant};

use sandpit::runner::Sandbox;
use sandpit::types::{ExitReason, ResourceLimits, TrustMode};

use super::test_config;

#[tokio::test]
async fn test_restricted_rejects_destructive_command() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    std::fs::write(&marker, b"keep").unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let command = format!("rm -f {}", marker.display());
    let result = sandbox
        .run_command(command.clone(), TrustMode::Restricted, None)
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_reason, ExitReason::Disallowed);
    assert_eq!(result.output, format!("Command not allowed: {command}"));
    assert!(!result.is_error);
    assert!(marker.exists());
}

#[tokio::test]
async fn test_restricted_rejects_chained_command() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    std::fs::write(&marker, b"keep").unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let command = format!("echo hi; rm -f {}", marker.display());
    let result = sandbox
        .run_command(command, TrustMode::Restricted, None)
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_reason, ExitReason::Disallowed);
    assert!(marker.exists());
}

#[tokio::test]
async fn test_restricted_runs_allowed_command() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_command("pwd", TrustMode::Restricted, None)
        .await
        .expect("Execution failed");

    assert!(result.is_success());
    assert!(result.output.starts_with('/'));
}

#[tokio::test]
async fn test_trusted_runs_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_command("printf 'b\\na\\n' | sort", TrustMode::Trusted, None)
        .await
        .expect("Execution failed");

    assert_eq!(result.output, "a\nb");
}

#[tokio::test]
async fn test_trusted_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));
    let limits = ResourceLimits::unset().with_wall_time_limit(0.5);

    let start = Instant::now();
    let result = sandbox
        .run_command("sleep 30", TrustMode::Trusted, Some(&limits))
        .await
        .expect("Execution failed");

    assert!(result.is_error);
    assert_eq!(result.exit_reason, ExitReason::Timeout);
    assert!(start.elapsed() < Duration::from_secs(3));
}
