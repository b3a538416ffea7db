use std::path::PathBuf;

use sandpit::config::Config;

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.scratch_dir(), PathBuf::from("/tmp/sandpit-fixture"));
    assert_eq!(config.max_source_bytes, 4096);
    assert_eq!(config.default_limits.wall_time_limit, Some(2.0));
    assert_eq!(config.python.command, vec!["python3", "-I", "{source}"]);
    assert_eq!(config.shell.allow_list, vec!["ls", "echo"]);
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.python.name, "Python 3");
    assert_eq!(
        config.python.limits.and_then(|l| l.wall_time_limit),
        Some(1.0)
    );
}

#[test]
fn test_load_invalid_empty_command() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_command.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_missing_placeholder() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_missing_placeholder.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_extension() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_extension.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_allow_list() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_allow_list.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_nonexistent_file() {
    assert!(Config::from_file("/nonexistent/sandpit.toml").is_err());
}
