//! Smoke tests for the command line surface.
//!
//! These only exercise commands that need neither a model endpoint nor a
//! terminal.

use std::process::Command;

fn parley(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .arg("run")
        .arg("--quiet")
        .arg("--")
        .args(args)
        .output()
        .expect("Failed to run command")
}

#[test]
fn test_version() {
    let output = parley(&["version"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Parley "));
}

#[test]
fn test_personas_lists_moderator() {
    let output = parley(&["personas"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[moderator]"));
}

#[test]
fn test_config_path() {
    let output = parley(&["config", "path"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim().ends_with("config.toml"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let output = parley(&["adjourn"]);
    assert!(!output.status.success());
}
