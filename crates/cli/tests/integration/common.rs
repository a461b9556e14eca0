//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Placeholder in fixtures replaced by the per-test log file.
pub const LOG_PLACEHOLDER: &str = "@LOG@";

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory with isolated state, cache and
/// project paths.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Create from a manifest fixture.
  ///
  /// Copies the fixture to `kiln.toml`, pointing `@LOG@` at [`TestEnv::log_path`].
  pub fn from_fixture(name: &str) -> Self {
    let env = Self::empty();
    let content = fixture_content(name).replace(LOG_PLACEHOLDER, &env.log_path().display().to_string());
    std::fs::write(&env.manifest_path, content).unwrap();
    env
  }

  /// Create an empty test environment.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("kiln.toml");
    Self { temp, manifest_path }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Write an executable shell script relative to the temp directory.
  #[cfg(unix)]
  pub fn write_script(&self, relative_path: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = self.write_file(relative_path, &format!("#!/bin/sh\n{}", body));
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Provisioning state (stamps and lock file).
  pub fn state_path(&self) -> PathBuf {
    self.dir("state")
  }

  /// Download cache.
  pub fn cache_path(&self) -> PathBuf {
    self.dir("cache")
  }

  /// Project root the release driver runs in.
  pub fn project_path(&self) -> PathBuf {
    self.dir("project")
  }

  /// Log file written by the fixture package managers.
  pub fn log_path(&self) -> PathBuf {
    self.temp.path().join("pm.log")
  }

  /// Lines appended to the log file so far.
  pub fn log_lines(&self) -> Vec<String> {
    std::fs::read_to_string(self.log_path())
      .unwrap_or_default()
      .lines()
      .map(str::to_string)
      .collect()
  }

  /// Get a pre-configured Command for the kiln binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `KILN_STATE_DIR`: Isolated stamp and lock directory
  /// - `KILN_CACHE_DIR`: Isolated download and source cache
  /// - `KILN_MANIFEST`: The manifest written by [`TestEnv::from_fixture`]
  ///
  /// Any driver variable inherited from the outer environment is removed.
  pub fn kiln_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("kiln");
    for (key, _) in std::env::vars() {
      if key.starts_with("KILN_") {
        cmd.env_remove(&key);
      }
    }
    cmd.env_remove("CARGO_TARGET_DIR");
    cmd.env_remove("RUST_LOG");
    cmd.env("KILN_STATE_DIR", self.state_path());
    cmd.env("KILN_CACHE_DIR", self.cache_path());
    cmd.env("KILN_MANIFEST", &self.manifest_path);
    cmd
  }

  /// A `kiln` command running as the release driver inside the project root.
  pub fn driver_cmd(&self) -> Command {
    let mut cmd = self.kiln_cmd();
    cmd.current_dir(self.project_path());
    cmd
  }
}

/// List the entry names of a `.tar.gz` archive.
pub fn archive_entries(path: &Path) -> Vec<String> {
  let file = std::fs::File::open(path).unwrap();
  let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
  archive
    .entries()
    .unwrap()
    .map(|entry| entry.unwrap().path().unwrap().display().to_string())
    .collect()
}
