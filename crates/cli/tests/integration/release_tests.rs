//! Release driver integration tests.
//!
//! `KILN_CARGO` points at a shell script standing in for cargo: it writes a
//! small text file for every requested binary where cargo would put it.

#![cfg(unix)]

use predicates::prelude::*;

use super::common::{TestEnv, archive_entries};

const FAKE_CARGO: &str = r#"
profile=release
while [ $# -gt 0 ]; do
  case "$1" in
    --profile) profile="$2"; shift 2 ;;
    --target) target="$2"; shift 2 ;;
    --bin) bins="$bins $2"; shift 2 ;;
    *) shift ;;
  esac
done
dir="${CARGO_TARGET_DIR:-target}/$target/$profile"
mkdir -p "$dir"
for bin in $bins; do
  printf 'binary %s for %s\n' "$bin" "$target" > "$dir/$bin"
done
"#;

const FAILING_CARGO: &str = "echo 'error: could not compile `tikv`' >&2\nexit 101\n";

fn release_env(cargo: &str) -> TestEnv {
  let env = TestEnv::empty();
  env.write_file(
    "project/Cargo.toml",
    "[package]\nname = \"tikv\"\nversion = \"5.0.1\"\n\n[[bin]]\nname = \"tikv-server\"\n\n[[bin]]\nname = \"tikv-ctl\"\n",
  );
  env.write_file("project/LICENSE", "Apache-2.0\n");
  env.write_file("project/kiln-release.toml", "include = [\"LICENSE\"]\nlocked = false\n");
  env.write_script("bin/cargo", cargo);
  env
}

fn driver(env: &TestEnv) -> assert_cmd::Command {
  let mut cmd = env.driver_cmd();
  cmd.env("KILN_CARGO", env.temp.path().join("bin/cargo"));
  cmd.env("KILN_TARGETS", "x86_64-unknown-linux-gnu");
  cmd.env("SOURCE_DATE_EPOCH", "1600000000");
  cmd
}

#[test]
fn release_without_arguments_packages_the_project() {
  let env = release_env(FAKE_CARGO);

  driver(&env)
    .assert()
    .success()
    .stdout(predicate::str::contains("Released tikv 5.0.1"))
    .stdout(predicate::str::contains("tikv-5.0.1-x86_64-unknown-linux-gnu.tar.gz"));

  let dist = env.project_path().join("dist");
  let archive = dist.join("tikv-5.0.1-x86_64-unknown-linux-gnu.tar.gz");
  assert_eq!(
    archive_entries(&archive),
    vec![
      "tikv-5.0.1-x86_64-unknown-linux-gnu/LICENSE",
      "tikv-5.0.1-x86_64-unknown-linux-gnu/tikv-ctl",
      "tikv-5.0.1-x86_64-unknown-linux-gnu/tikv-server",
    ]
  );

  let sums = std::fs::read_to_string(dist.join("SHA256SUMS")).unwrap();
  assert!(sums.ends_with("  tikv-5.0.1-x86_64-unknown-linux-gnu.tar.gz\n"));

  let manifest: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(dist.join("release.json")).unwrap()).unwrap();
  assert_eq!(manifest["version"], "5.0.1");
  assert_eq!(manifest["source_date_epoch"], 1600000000);
}

#[test]
fn release_is_reproducible() {
  let env = release_env(FAKE_CARGO);
  let sums = env.project_path().join("dist").join("SHA256SUMS");

  driver(&env).arg("release").assert().success();
  let first = std::fs::read_to_string(&sums).unwrap();

  driver(&env).arg("release").assert().success();
  assert_eq!(first, std::fs::read_to_string(&sums).unwrap());
}

#[test]
fn environment_overrides_config_file() {
  let env = release_env(FAKE_CARGO);

  driver(&env)
    .env("KILN_VERSION", "5.0.2")
    .env("KILN_OUTPUT_DIR", "out")
    .assert()
    .success();

  assert!(
    env
      .project_path()
      .join("out")
      .join("tikv-5.0.2-x86_64-unknown-linux-gnu.tar.gz")
      .exists()
  );
}

#[test]
fn build_failure_exits_with_1() {
  let env = release_env(FAILING_CARGO);

  driver(&env)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("could not compile"))
    .stderr(predicate::str::contains("build for x86_64-unknown-linux-gnu failed"));

  assert!(!env.project_path().join("dist").join("SHA256SUMS").exists());
}

#[test]
fn release_publishes_artifacts() {
  let env = release_env(FAKE_CARGO);
  let mut server = mockito::Server::new();
  let mock = server
    .mock("PUT", mockito::Matcher::Regex(r"^/releases/5\.0\.1/".to_string()))
    .match_header("authorization", "Bearer s3cret")
    .with_status(201)
    .expect(3)
    .create();

  driver(&env)
    .env("KILN_PUBLISH_URL", format!("{}/releases", server.url()))
    .env("KILN_PUBLISH_TOKEN", "s3cret")
    .assert()
    .success()
    .stdout(predicate::str::contains("/releases/5.0.1/SHA256SUMS"));

  mock.assert();
}

#[test]
fn no_publish_skips_upload() {
  let env = release_env(FAKE_CARGO);
  let mut server = mockito::Server::new();
  let mock = server.mock("PUT", mockito::Matcher::Any).expect(0).create();

  driver(&env)
    .env("KILN_PUBLISH_URL", server.url())
    .env("KILN_PUBLISH_TOKEN", "s3cret")
    .args(["release", "--no-publish"])
    .assert()
    .success();

  mock.assert();
}

#[test]
fn missing_publish_token_fails_before_building() {
  let env = release_env(FAKE_CARGO);

  driver(&env)
    .env("KILN_PUBLISH_URL", "http://127.0.0.1:1/releases")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("KILN_PUBLISH_TOKEN"));

  assert!(!env.project_path().join("target").exists());
}
