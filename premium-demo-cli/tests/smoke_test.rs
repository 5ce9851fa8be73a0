//! Smoke tests for premium-demo-cli
//!
//! These tests run the built binary against a scratch storage directory and
//! the simulated backends; no network access is needed.

use std::process::{Command, Output};
use tempfile::TempDir;

fn premium_demo(storage: &TempDir, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_premium-demo"))
        .args(args)
        .env("PREMIUM_DEMO_DIR", storage.path())
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute command");

    // Print output for debugging if test fails
    if !output.status.success() {
        eprintln!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Test that the CLI can show help
#[test]
fn test_cli_help() {
    let storage = TempDir::new().unwrap();
    let output = premium_demo(&storage, &["--help"]);

    assert!(output.status.success());
    let help = stdout(&output);
    for command in ["login", "plans", "buy", "status"] {
        assert!(help.contains(command), "Help should mention '{}'", command);
    }
}

/// Test that version is shown
#[test]
fn test_cli_version() {
    let storage = TempDir::new().unwrap();
    let output = premium_demo(&storage, &["--version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

/// Buying requires a wallet
#[test]
fn test_buy_without_wallet_fails() {
    let storage = TempDir::new().unwrap();
    let output = premium_demo(&storage, &["buy", "crypto.monthly"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("login"));
}

/// The default (desktop) catalog is the crypto one
#[test]
fn test_plans_on_desktop() {
    let storage = TempDir::new().unwrap();
    let output = premium_demo(&storage, &["plans"]);

    assert!(output.status.success());
    let listing = stdout(&output);
    assert!(listing.contains("crypto.monthly"));
    assert!(listing.contains("5 TON"));
}

/// A crypto purchase settles within one poll on a fast simulation
#[test]
fn test_buy_crypto_until_active() {
    let storage = TempDir::new().unwrap();
    let config = storage.path().join("demo.json");
    std::fs::write(
        &config,
        r#"{"reconciler": {"poll_interval_secs": 1}, "simulation": {"confirm_after_secs": 0}}"#,
    )
    .unwrap();
    let config = config.to_string_lossy().into_owned();

    assert!(premium_demo(&storage, &["login", "UQ-smoke"]).status.success());

    let output = premium_demo(
        &storage,
        &["--config", &config, "buy", "crypto.monthly", "--wait", "10"],
    );
    assert!(output.status.success());
    assert!(stdout(&output).contains("active"));

    let output = premium_demo(&storage, &["--config", &config, "status"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("active"));
}

/// Store billing is not offered outside mobile
#[test]
fn test_iap_unavailable_on_desktop() {
    let storage = TempDir::new().unwrap();
    assert!(premium_demo(&storage, &["login", "UQ-smoke"]).status.success());

    let output = premium_demo(&storage, &["buy", "pro.monthly", "--source", "mobile_iap"]);
    assert!(!output.status.success());
}
