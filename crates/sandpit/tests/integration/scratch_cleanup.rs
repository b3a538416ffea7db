use std::sync::Arc;

use sandpit::runner::Sandbox;

use super::{leftover_files, test_config};

#[tokio::test]
async fn test_concurrent_identical_sources() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Arc::new(Sandbox::new(test_config(dir.path())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sandbox = sandbox.clone();
            tokio::spawn(async move {
                sandbox
                    .run_code("python", "import os, time\ntime.sleep(0.2)\nprint(len(os.listdir('.')) >= 1)", None)
                    .await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().expect("Execution failed");
        assert!(result.is_success(), "unexpected result: {result:?}");
        assert_eq!(result.output, "True");
    }

    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_cleanup_after_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.python.command = vec!["/nonexistent/python".to_owned(), "{source}".to_owned()];
    let sandbox = Sandbox::new(config);

    let err = sandbox
        .run_code("python", "print(1)", None)
        .await
        .unwrap_err();

    assert!(matches!(err, sandpit::SandboxError::Spawn(_)));
    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_scratch_file_is_visible_to_interpreter() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(test_config(dir.path()));

    let result = sandbox
        .run_code(
            "python",
            "import os, sys\nname = os.path.basename(sys.argv[0])\nprint(name.startswith('code_') and name.endswith('.py'))",
            None,
        )
        .await
        .expect("Execution failed");

    assert_eq!(result.output, "True");
}
