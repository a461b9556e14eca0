//! Types shared by the execution actions.

use std::path::PathBuf;

use thiserror::Error;

use crate::consts::{BASE_PATH, DEFAULT_SOURCE_DATE_EPOCH};
use crate::platform::paths::downloads_dir;

/// Errors that can occur while running a single action.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// HTTP request failed.
  #[error("fetch failed for {url}: {message}")]
  FetchFailed { url: String, message: String },

  /// The published checksum could not be retrieved or parsed.
  #[error("checksum unavailable from {url}: {message}")]
  ChecksumUnavailable { url: String, message: String },

  /// SHA256 hash mismatch after download.
  #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  /// Command exited unsuccessfully. `output` holds captured stderr, if any.
  #[error("command failed with exit code {code:?}: {cmd}{}", format_output(.output))]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    output: String,
  },

  #[error("unsupported archive format: {0}")]
  UnsupportedArchive(PathBuf),

  /// Archive entry escaping the destination directory.
  #[error("refusing to unpack entry outside destination: {0}")]
  UnsafeArchiveEntry(PathBuf),

  #[error("invalid SOURCE_DATE_EPOCH '{0}': expected seconds since the epoch")]
  InvalidSourceDateEpoch(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn format_output(output: &str) -> String {
  if output.is_empty() {
    String::new()
  } else {
    format!("\n{}", output.trim_end())
  }
}

/// Where command output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
  /// Stream to the parent's stdout/stderr, as an image build log expects.
  #[default]
  Inherit,
  /// Capture output; stdout is returned, stderr is attached to failures.
  Capture,
}

/// Configuration for action execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Shell override. Defaults to `/bin/sh -c`.
  pub shell: Option<String>,

  pub output: OutputMode,

  /// `PATH` before any step exports are prepended.
  pub base_path: String,

  /// Cache for downloaded archives.
  pub downloads_dir: PathBuf,

  /// Value of `SOURCE_DATE_EPOCH` handed to commands.
  pub source_date_epoch: u64,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      shell: None,
      output: OutputMode::default(),
      base_path: BASE_PATH.to_string(),
      downloads_dir: downloads_dir(),
      source_date_epoch: DEFAULT_SOURCE_DATE_EPOCH,
    }
  }
}

impl ExecuteConfig {
  /// Defaults, with `SOURCE_DATE_EPOCH` taken from the environment.
  pub fn from_env() -> Result<Self, ExecuteError> {
    Ok(Self {
      source_date_epoch: source_date_epoch()?,
      ..Self::default()
    })
  }
}

pub fn parse_source_date_epoch(value: &str) -> Option<u64> {
  value.trim().parse().ok()
}

/// `SOURCE_DATE_EPOCH` from the environment, or the ZIP epoch when unset.
pub fn source_date_epoch() -> Result<u64, ExecuteError> {
  match std::env::var("SOURCE_DATE_EPOCH") {
    Ok(value) => parse_source_date_epoch(&value).ok_or(ExecuteError::InvalidSourceDateEpoch(value)),
    Err(_) => Ok(DEFAULT_SOURCE_DATE_EPOCH),
  }
}
