//! Provision command integration tests.
//!
//! The fixture manifests use a custom package manager that only appends to a
//! log file, so the tests see what would have been installed and in which order.

#![cfg(unix)]

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn provision_runs_phases_in_order() {
  let env = TestEnv::from_fixture("custom_pm.toml");

  env
    .kiln_cmd()
    .arg("provision")
    .assert()
    .success()
    .stdout(predicate::str::contains("Provisioned all phases"))
    .stdout(predicate::str::contains("Completed: 3"));

  assert_eq!(
    env.log_lines(),
    vec!["refresh", "install make=4.2", "install python3=3.6"]
  );
}

#[test]
fn provision_single_phase() {
  let env = TestEnv::from_fixture("custom_pm.toml");

  env
    .kiln_cmd()
    .args(["provision", "--phase", "compilers"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Provisioned compilers"));

  assert_eq!(env.log_lines(), vec!["install python3=3.6"]);
}

#[test]
fn provision_is_idempotent() {
  let env = TestEnv::from_fixture("custom_pm.toml");

  env.kiln_cmd().arg("provision").assert().success();

  env
    .kiln_cmd()
    .arg("provision")
    .assert()
    .success()
    .stdout(predicate::str::contains("Completed: 0"))
    .stdout(predicate::str::contains("Skipped: 3"));

  assert_eq!(env.log_lines().len(), 3);
}

#[test]
fn provision_force_reruns_stamped_steps() {
  let env = TestEnv::from_fixture("custom_pm.toml");

  env.kiln_cmd().arg("provision").assert().success();
  env
    .kiln_cmd()
    .args(["provision", "--force", "--phase", "refresh"])
    .assert()
    .success();

  assert_eq!(
    env.log_lines(),
    vec!["refresh", "install make=4.2", "install python3=3.6", "refresh"]
  );
}

#[test]
fn provision_writes_stamps_to_state_dir() {
  let env = TestEnv::from_fixture("custom_pm.toml");

  env.kiln_cmd().arg("provision").assert().success();

  let stamps = std::fs::read_dir(env.state_path().join("stamps")).unwrap().count();
  assert_eq!(stamps, 3);
}

#[test]
fn provision_aborts_on_first_failure() {
  let env = TestEnv::from_fixture("failing_pm.toml");

  env
    .kiln_cmd()
    .arg("provision")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("step packages:prerequisites failed"))
    .stderr(predicate::str::contains("exit code Some(3)"));

  // The compilers phase never ran.
  assert_eq!(env.log_lines(), vec!["refresh", "install make=4.2"]);

  // The failed step is retried on the next run, the refresh is not.
  env.kiln_cmd().arg("provision").assert().code(1);
  assert_eq!(
    env.log_lines(),
    vec!["refresh", "install make=4.2", "install make=4.2"]
  );
}

#[test]
fn provision_rejects_unpinned_manifest() {
  let env = TestEnv::from_fixture("unpinned_package.toml");

  env
    .kiln_cmd()
    .arg("provision")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("'latest' is not a pin"));

  assert!(!env.state_path().join("stamps").exists());
}

#[test]
fn verify_reports_missing_binaries() {
  let env = TestEnv::from_fixture("centos7.toml");

  env
    .kiln_cmd()
    .args(["verify", "--json"])
    .env("PATH", env.temp.path())
    .assert()
    .code(1)
    .stdout(predicate::str::contains("\"binaries\""))
    .stderr(predicate::str::contains("Verification failed"));
}
