use std::time::{Duration, Instant};

use sandpit::runner::Sandbox;
use sandpit::types::{ExitReason, LimitExceeded, ResourceLimits};

use super::{fixture_source, leftover_files, test_config};

#[tokio::test]
async fn test_print_hello() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_code("python", fixture_source("hello.py"), None)
        .await
        .expect("Execution failed");

    assert!(result.is_success());
    assert_eq!(result.output, "hi");
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let start = Instant::now();
    let result = sandbox
        .run_code("python", fixture_source("infinite_loop.py"), None)
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_reason, ExitReason::Timeout);
    assert_eq!(result.limit_exceeded, LimitExceeded::WallTime);
    assert_eq!(result.output, "Execution timed out after 5s");
    assert!(start.elapsed() < Duration::from_millis(6500));
    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_request_limits_override_config() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));
    let limits = ResourceLimits::unset().with_wall_time_limit(0.5);

    let start = Instant::now();
    let result = sandbox
        .run_code("python", fixture_source("infinite_loop.py"), Some(&limits))
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_reason, ExitReason::Timeout);
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_exception_reports_traceback() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_code("python", fixture_source("raises.py"), None)
        .await
        .expect("Execution failed");

    assert!(result.is_error);
    assert_eq!(result.exit_reason, ExitReason::RuntimeError);
    assert!(result.output.contains("ZeroDivisionError"));
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_timeout_kills_grandchildren() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));
    let limits = ResourceLimits::unset().with_wall_time_limit(1.0);

    let start = Instant::now();
    let result = sandbox
        .run_code("python", fixture_source("spawns_child.py"), Some(&limits))
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_reason, ExitReason::Timeout);
    // A surviving `sleep 30` would keep the pipes open well past this
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_output_limit() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));
    let limits = ResourceLimits::unset()
        .with_wall_time_limit(10.0)
        .with_max_output(16);

    let result = sandbox
        .run_code("python", fixture_source("noisy.py"), Some(&limits))
        .await
        .expect("Execution failed");

    assert!(result.is_error);
    assert_eq!(result.limit_exceeded, LimitExceeded::Output);
    assert!(result.output.len() <= 16 * 1024);
    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_sandbox_cannot_read_host_environment() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_code(
            "python",
            "import os\nprint(sorted(k for k in os.environ if k not in ('PATH', 'PYTHONDONTWRITEBYTECODE', 'PYTHONUNBUFFERED', 'LC_CTYPE')))",
            None,
        )
        .await
        .expect("Execution failed");

    assert_eq!(result.output, "[]");
}

#[tokio::test]
async fn test_background_child_does_not_outlive_run() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let start = Instant::now();
    let result = sandbox
        .run_code(
            "python",
            "import subprocess\nsubprocess.Popen(['sleep', '30'])\nprint('hi', flush=True)",
            None,
        )
        .await
        .expect("Execution failed");

    assert!(result.is_success());
    assert_eq!(result.output, "hi");
    // The orphaned `sleep` holds the output pipes until its group is killed
    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(leftover_files(dir.path()), 0);
}
