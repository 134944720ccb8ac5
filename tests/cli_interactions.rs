//! CLI behaviour tests
//!
//! These run the `nst` binary and cover everything that finishes before any
//! network traffic: help, version, argument errors and configuration errors
//! from flags, environment variables and `.env` files.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const CONFIG_VARS: [&str; 12] = [
    "DL_URL",
    "UL_URL",
    "LATENCY_URL",
    "MAX",
    "TIMEOUT",
    "THREADS",
    "LATENCY_COUNT",
    "SPEEDTEST_LANG",
    "LC_ALL",
    "LC_MESSAGES",
    "LANGUAGE",
    "LANG",
];

/// Command with a clean configuration environment, run from an empty directory
fn create_test_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nst").unwrap();
    cmd.current_dir(dir.path());
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Directory holding a `.env` file with `content`
fn create_temp_env(content: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(".env"), content).unwrap();
    temp_dir
}

#[test]
fn test_help_flag_prints_usage() {
    let dir = TempDir::new().unwrap();
    for flag in ["--help", "-h", "help"] {
        create_test_cmd(&dir)
            .arg(flag)
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage:"))
            .stdout(predicate::str::contains("--latency-count N"));
    }
}

#[test]
fn test_help_follows_language() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--lang", "zh", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("用法:"));

    create_test_cmd(&dir)
        .env("SPEEDTEST_LANG", "zh_CN.UTF-8")
        .arg("help")
        .assert()
        .success()
        .stdout(predicate::str::contains("用法:"));
}

#[test]
fn test_version_variants() {
    let dir = TempDir::new().unwrap();
    for flag in ["-v", "--version", "version"] {
        create_test_cmd(&dir)
            .arg(flag)
            .assert()
            .success()
            .stdout(predicate::str::starts_with(format!("nst {} (commit ", env!("CARGO_PKG_VERSION"))))
            .stdout(predicate::str::contains(", built "));
    }
}

#[test]
fn test_unknown_flag_is_config_error() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .arg("--bogus")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[✗]"))
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_unexpected_word_is_config_error() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["run", "fast"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unexpected argument(s): run fast"));
}

#[test]
fn test_invalid_flag_values() {
    let dir = TempDir::new().unwrap();
    let cases: [(&[&str], &str); 5] = [
        (&["--threads", "0"], "THREADS must be > 0"),
        (&["--threads", "65"], "THREADS must be <= 64"),
        (&["--timeout", "121"], "TIMEOUT must be <= 120"),
        (&["--max", "12XB"], "invalid MAX"),
        (&["--dl-url", "ftp://example.com/file"], "DL_URL must start with http(s)://"),
    ];

    for (args, message) in cases {
        create_test_cmd(&dir)
            .args(args)
            .assert()
            .code(1)
            .stderr(predicate::str::contains(message))
            .stderr(predicate::str::contains("Usage:"));
    }
}

#[test]
fn test_non_numeric_flag_rejected_by_parser() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--threads", "many"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[✗]"));
}

#[test]
fn test_environment_values_are_validated() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .env("LATENCY_COUNT", "101")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("LATENCY_COUNT must be <= 100"));

    create_test_cmd(&dir)
        .env("TIMEOUT", "-5")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("TIMEOUT must be > 0"));
}

#[test]
fn test_dotenv_file_is_loaded() {
    let dir = create_temp_env("THREADS=0\n");
    create_test_cmd(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("THREADS must be > 0"));
}

#[test]
fn test_flag_overrides_dotenv() {
    let dir = create_temp_env("MAX=0\nTHREADS=100\n");
    create_test_cmd(&dir)
        .args(["--max", "1M"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("THREADS must be <= 64"))
        .stderr(predicate::str::contains("MAX must be > 0").not());
}

#[test]
fn test_config_errors_are_localized() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--lang", "zh", "--threads", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("THREADS 必须大于 0"))
        .stderr(predicate::str::contains("用法:"));
}
