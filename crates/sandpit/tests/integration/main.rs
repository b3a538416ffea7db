//! Integration tests for sandpit
//!
//! These tests require a `python3` interpreter on PATH and a POSIX shell.
//! Run with: cargo test -p sandpit --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;
use std::path::Path;

use sandpit::config::Config;

mod config_loading;
#[cfg(feature = "javascript")]
mod javascript_execution;
mod python_execution;
mod scratch_cleanup;
mod shell_gateway;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default config with scratch files redirected to `scratch_dir`
pub(crate) fn test_config(scratch_dir: &Path) -> Config {
    Config {
        scratch_dir: Some(scratch_dir.to_path_buf()),
        ..Config::default()
    }
}

/// Number of entries left in `dir`
pub(crate) fn leftover_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
