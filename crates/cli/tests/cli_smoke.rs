//! CLI smoke tests for kiln.
//!
//! These tests verify that the commands which do not touch the system run
//! without panicking and return the documented exit codes.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn kiln_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("kiln");
  cmd.env_remove("KILN_MANIFEST");
  cmd.env_remove("RUST_LOG");
  cmd
}

fn fixture(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

fn stdout_of(cmd: &mut Command) -> String {
  let output = cmd.assert().success().get_output().stdout.clone();
  String::from_utf8(output).unwrap()
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  kiln_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  kiln_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("kiln"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["release", "plan", "render", "provision", "verify", "context", "info"] {
    kiln_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn unknown_phase_is_rejected() {
  kiln_cmd()
    .args(["provision", "--phase", "bootstrap"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown phase 'bootstrap'"));
}

#[test]
fn info_works() {
  kiln_cmd()
    .arg("info")
    .assert()
    .success()
    .stdout(predicate::str::contains("State dir"));
}

// =============================================================================
// Plan & Render
// =============================================================================

#[test]
fn plan_lists_phases_in_order() {
  let stdout = stdout_of(kiln_cmd().args(["plan", "--manifest"]).arg(fixture("centos7.toml")));

  let refresh = stdout.find("refresh:").unwrap();
  let prerequisites = stdout.find("prerequisites:").unwrap();
  let compilers = stdout.find("compilers:").unwrap();
  let toolchains = stdout.find("toolchains:").unwrap();
  assert!(refresh < prerequisites && prerequisites < compilers && compilers < toolchains);
  assert!(stdout.contains("yum -y install epel-release-7-11 centos-release-scl-2-3.el7.centos git-1.8.3.1"));
}

#[test]
fn plan_warns_about_floating_channel() {
  kiln_cmd()
    .args(["plan", "--manifest"])
    .arg(fixture("centos7.toml"))
    .assert()
    .success()
    .stderr(predicate::str::contains("channel nightly (floating)"));
}

#[test]
fn plan_json_is_stable() {
  let run = || {
    let stdout = stdout_of(kiln_cmd().args(["plan", "--json", "--manifest"]).arg(fixture("centos7.toml")));
    serde_json::from_str::<serde_json::Value>(&stdout).unwrap()
  };

  let first = run();
  assert_eq!(first, run());
  assert_eq!(first["steps"].as_array().unwrap().len(), 4);
  assert_eq!(first["steps"][3]["id"], "toolchain:rust");
  assert_eq!(first["floating"][0]["name"], "rust");
}

#[test]
fn manifest_from_environment() {
  kiln_cmd()
    .arg("plan")
    .env("KILN_MANIFEST", fixture("centos7.toml"))
    .assert()
    .success()
    .stdout(predicate::str::contains("toolchain:rust"));
}

#[test]
fn unacknowledged_floating_channel_is_rejected() {
  kiln_cmd()
    .args(["plan", "--manifest"])
    .arg(fixture("unacknowledged_floating.toml"))
    .assert()
    .code(1)
    .stderr(predicate::str::contains("allow_floating"));
}

#[test]
fn missing_manifest_fails() {
  let temp = TempDir::new().unwrap();
  kiln_cmd()
    .current_dir(temp.path())
    .arg("plan")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("kiln.toml"));
}

#[test]
fn render_emits_containerfile() {
  kiln_cmd()
    .args(["render", "--manifest"])
    .arg(fixture("centos7.toml"))
    .assert()
    .success()
    .stdout(predicate::str::starts_with("# Generated by kiln"))
    .stdout(predicate::str::contains("FROM centos:7"))
    .stdout(predicate::str::contains("COPY centos7.toml /etc/kiln/toolchain.toml"))
    .stdout(predicate::str::contains(r#"LABEL "kiln.floating.rust"="channel nightly (floating)""#))
    .stdout(predicate::str::contains("WORKDIR /tikv"))
    .stdout(predicate::str::contains(r#"ENTRYPOINT ["/usr/local/bin/kiln"]"#));
}

#[test]
fn render_to_file() {
  let temp = TempDir::new().unwrap();
  let out = temp.path().join("Containerfile");
  kiln_cmd()
    .args(["render", "--manifest"])
    .arg(fixture("centos7.toml"))
    .arg("--output")
    .arg(&out)
    .assert()
    .success();
  assert!(std::fs::read_to_string(out).unwrap().contains("FROM centos:7"));
}

// =============================================================================
// Driver
// =============================================================================

#[test]
fn release_without_project_fails_with_exit_code_1() {
  let temp = TempDir::new().unwrap();
  kiln_cmd()
    .current_dir(temp.path())
    .env("KILN_TARGETS", "x86_64-unknown-linux-gnu")
    .env("KILN_CACHE_DIR", temp.path().join("cache"))
    .env_remove("KILN_PUBLISH_URL")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Cargo.toml not found"));
}

#[test]
fn invalid_configuration_fails() {
  let temp = TempDir::new().unwrap();
  kiln_cmd()
    .current_dir(temp.path())
    .env("KILN_VERSION", "not-a-version")
    .env("KILN_TARGETS", "x86_64-unknown-linux-gnu")
    .arg("release")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Invalid release configuration"));
}

#[test]
fn context_redacts_credentials() {
  let temp = TempDir::new().unwrap();
  let stdout = stdout_of(
    kiln_cmd()
      .current_dir(temp.path())
      .env("KILN_TARGETS", "x86_64-unknown-linux-gnu")
      .env("KILN_PUBLISH_TOKEN", "hunter2")
      .args(["context", "--json"]),
  );

  let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
  assert_eq!(value["invocation"]["env"]["KILN_PUBLISH_TOKEN"], "<redacted>");
  assert_eq!(value["config"]["targets"][0], "x86_64-unknown-linux-gnu");
  assert!(!stdout.contains("hunter2"));
}
