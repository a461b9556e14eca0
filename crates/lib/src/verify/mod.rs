//! Post-provisioning verification.
//!
//! Run as the last build step of the image: every binary the manifest says a
//! tool provides must resolve on `PATH`, every declared check command must
//! succeed, and the driver entry point must be launchable.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::execute::{ExecuteConfig, OutputMode, execute_cmd};
use crate::manifest::ToolchainSpec;

/// Why the container entry point cannot be launched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
  #[error("entry point {0} does not exist")]
  Missing(PathBuf),

  #[error("entry point {0} is not a regular file")]
  NotAFile(PathBuf),

  #[error("entry point {path} is not executable (mode {mode:o})")]
  NotExecutable { path: PathBuf, mode: u32 },
}

/// Check that `path` exists, is a regular file and has its executable bits set.
pub fn check_entrypoint(path: &Path) -> Result<(), LaunchError> {
  let metadata = std::fs::metadata(path).map_err(|_| LaunchError::Missing(path.to_path_buf()))?;
  if !metadata.is_file() {
    return Err(LaunchError::NotAFile(path.to_path_buf()));
  }

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    let mode = metadata.permissions().mode() & 0o7777;
    if mode & 0o111 != 0o111 {
      return Err(LaunchError::NotExecutable {
        path: path.to_path_buf(),
        mode,
      });
    }
  }

  Ok(())
}

/// Look `name` up in a colon-separated search path.
pub fn find_executable(name: &str, search_path: &str) -> Option<PathBuf> {
  search_path
    .split(':')
    .filter(|dir| !dir.is_empty())
    .map(|dir| Path::new(dir).join(name))
    .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
  let Ok(metadata) = std::fs::metadata(path) else {
    return false;
  };
  if !metadata.is_file() {
    return false;
  }
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
  }
  #[cfg(not(unix))]
  {
    true
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryCheck {
  pub tool: String,
  pub binary: String,
  pub found: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandCheck {
  pub tool: String,
  pub cmd: String,
  pub passed: bool,
  /// Trimmed stdout on success, the error on failure.
  pub output: String,
}

/// Everything `kiln verify` looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
  pub binaries: Vec<BinaryCheck>,
  pub checks: Vec<CommandCheck>,
  pub entrypoint: PathBuf,
  /// `None` when the entry point is launchable.
  pub entrypoint_error: Option<String>,
}

impl VerifyReport {
  pub fn is_ok(&self) -> bool {
    self.entrypoint_error.is_none()
      && self.binaries.iter().all(|b| b.found.is_some())
      && self.checks.iter().all(|c| c.passed)
  }

  /// One line per failed check.
  pub fn failures(&self) -> Vec<String> {
    let mut failures = Vec::new();
    for binary in self.binaries.iter().filter(|b| b.found.is_none()) {
      failures.push(format!("{}: `{}` not found on PATH", binary.tool, binary.binary));
    }
    for check in self.checks.iter().filter(|c| !c.passed) {
      failures.push(format!("{}: check `{}` failed: {}", check.tool, check.cmd, check.output));
    }
    if let Some(err) = &self.entrypoint_error {
      failures.push(err.clone());
    }
    failures
  }
}

/// Verify a provisioned environment against `spec`.
///
/// Binaries are looked up on the process `PATH` with the manifest's exported
/// directories in front, which is what the image's `ENV PATH` amounts to.
pub async fn verify(spec: &ToolchainSpec, config: &ExecuteConfig) -> VerifyReport {
  let exports = spec.exports();
  let process_path = std::env::var("PATH").unwrap_or_else(|_| config.base_path.clone());
  let search_path = exports.path_with(&process_path);
  debug!(path = %search_path, "verifying provisioned tools");

  let tools = spec
    .packages
    .iter()
    .map(|p| (&p.name, &p.provides, &p.check))
    .chain(spec.toolchains.iter().map(|t| (&t.name, &t.provides, &t.check)));

  let check_config = ExecuteConfig {
    output: OutputMode::Capture,
    ..config.clone()
  };

  let tmp_dir = std::env::temp_dir().join(format!("kiln-verify-{}", std::process::id()));
  let mut binaries = Vec::new();
  let mut checks = Vec::new();

  for (tool, provides, check) in tools {
    for binary in provides {
      let found = find_executable(binary, &search_path);
      if found.is_none() {
        warn!(tool = %tool, binary = %binary, "binary not found on PATH");
      }
      binaries.push(BinaryCheck {
        tool: tool.clone(),
        binary: binary.clone(),
        found,
      });
    }

    if let Some(cmd) = check {
      let result = execute_cmd(cmd, &exports, None, Path::new("/"), &tmp_dir, &check_config).await;
      let (passed, output) = match result {
        Ok(stdout) => (true, stdout),
        Err(err) => {
          warn!(tool = %tool, cmd = %cmd, error = %err, "check failed");
          (false, err.to_string())
        }
      };
      checks.push(CommandCheck {
        tool: tool.clone(),
        cmd: cmd.clone(),
        passed,
        output,
      });
    }
  }

  let _ = std::fs::remove_dir_all(&tmp_dir);

  let entrypoint = spec.driver.path.clone();
  let entrypoint_error = check_entrypoint(&entrypoint).err().map(|e| e.to_string());

  let report = VerifyReport {
    binaries,
    checks,
    entrypoint,
    entrypoint_error,
  };
  info!(ok = report.is_ok(), "verification finished");
  report
}
