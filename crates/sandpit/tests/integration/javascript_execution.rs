use std::sync::Arc;

use sandpit::runner::Sandbox;
use sandpit::types::{ExitReason, LimitExceeded};

use super::{fixture_source, test_config};

#[tokio::test]
async fn test_console_output() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_code("javascript", fixture_source("hello.js"), None)
        .await
        .expect("Execution failed");

    assert!(result.is_success());
    assert_eq!(result.output, "hello, sandpit");
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_code("js", "for (;;) {}", None)
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_reason, ExitReason::Timeout);
    assert_eq!(result.limit_exceeded, LimitExceeded::WallTime);
}

#[tokio::test]
async fn test_concurrent_isolates_share_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Arc::new(Sandbox::new(test_config(dir.path())));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let sandbox = sandbox.clone();
            tokio::spawn(async move {
                let source = format!(
                    "if (typeof shared !== 'undefined') throw new Error('leak'); \
                     globalThis.shared = {i}; console.log(shared)"
                );
                sandbox.run_code("javascript", source, None).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().expect("Execution failed");
        assert_eq!(result.output, i.to_string());
    }
}

#[tokio::test]
async fn test_no_filesystem_capability() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_code(
            "javascript",
            "typeof Deno === 'undefined' && typeof require === 'undefined' && typeof fetch === 'undefined'",
            None,
        )
        .await
        .expect("Execution failed");

    assert_eq!(result.output, "true");
}
