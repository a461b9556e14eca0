//! Invoking the project's build tool.
//!
//! The driver does not know how the project compiles; it runs `cargo build`
//! once per target and picks the declared binaries out of cargo's output
//! directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::driver::ReleaseError;
use crate::driver::config::{ProjectInfo, ReleaseConfig};

/// Arguments passed to cargo for one target.
pub fn cargo_args(config: &ReleaseConfig, project: &ProjectInfo, target: &str) -> Vec<String> {
  let mut args = vec![
    "build".to_string(),
    "--profile".to_string(),
    config.profile.clone(),
    "--target".to_string(),
    target.to_string(),
  ];
  if config.locked {
    args.push("--locked".to_string());
  }
  if !config.features.is_empty() {
    args.push("--features".to_string());
    args.push(config.features.join(","));
  }
  for binary in &project.binaries {
    args.push("--bin".to_string());
    args.push(binary.clone());
  }
  args
}

/// Build `project` for `target`. Output is streamed to the console.
pub async fn build_target(config: &ReleaseConfig, project: &ProjectInfo, target: &str) -> Result<(), ReleaseError> {
  let args = cargo_args(config, project, target);
  info!(target = %target, cargo = %config.cargo, "building");
  debug!(args = ?args, root = %project.root.display(), "spawning cargo");

  let status = Command::new(&config.cargo)
    .args(&args)
    .current_dir(&project.root)
    .env("SOURCE_DATE_EPOCH", config.source_date_epoch.to_string())
    .stdin(Stdio::null())
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit())
    .status()
    .await
    .map_err(|source| ReleaseError::Spawn {
      program: config.cargo.clone(),
      source,
    })?;

  if !status.success() {
    return Err(ReleaseError::Build {
      target: target.to_string(),
      code: status.code(),
    });
  }
  Ok(())
}

/// cargo's target directory for `root`, honoring `CARGO_TARGET_DIR`.
fn target_dir(root: &Path) -> PathBuf {
  match std::env::var_os("CARGO_TARGET_DIR") {
    Some(dir) => root.join(dir),
    None => root.join("target"),
  }
}

/// Paths of the built binaries for `target`, in the order they were declared.
pub fn collect_binaries(
  config: &ReleaseConfig,
  project: &ProjectInfo,
  target: &str,
) -> Result<Vec<PathBuf>, ReleaseError> {
  let dir = target_dir(&project.root).join(target).join(config.profile_dir());
  let suffix = if target.contains("windows") { ".exe" } else { "" };

  project
    .binaries
    .iter()
    .map(|name| {
      let path = dir.join(format!("{}{}", name, suffix));
      if path.is_file() {
        Ok(path)
      } else {
        Err(ReleaseError::MissingBinary {
          target: target.to_string(),
          path,
        })
      }
    })
    .collect()
}
