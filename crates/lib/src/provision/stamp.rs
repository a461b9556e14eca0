//! Completion stamps for plan steps.
//!
//! A stamp records that the step with a given content hash finished. Any
//! change to a step (a pin, a URL, a command) changes its hash, so a stale
//! stamp never suppresses work that still has to happen.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::util::hash::ObjectHash;

const STAMPS_DIR: &str = "stamps";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
  pub step: String,
  pub hash: ObjectHash,
  pub completed_at_unix: u64,
}

#[derive(Debug, Clone)]
pub struct StampStore {
  dir: PathBuf,
}

impl StampStore {
  pub fn new(state_dir: &Path) -> Self {
    Self {
      dir: state_dir.join(STAMPS_DIR),
    }
  }

  fn path(&self, hash: &ObjectHash) -> PathBuf {
    self.dir.join(format!("{}.json", hash))
  }

  /// The stamp for `hash`, if one was written and is readable.
  pub fn get(&self, hash: &ObjectHash) -> Option<Stamp> {
    let content = fs::read_to_string(self.path(hash)).ok()?;
    serde_json::from_str(&content).ok()
  }

  pub fn contains(&self, hash: &ObjectHash) -> bool {
    self.get(hash).is_some_and(|stamp| stamp.hash == *hash)
  }

  /// Record completion of `step`. Written to a temp file and renamed into place.
  pub fn record(&self, step: &str, hash: &ObjectHash) -> io::Result<Stamp> {
    fs::create_dir_all(&self.dir)?;

    let stamp = Stamp {
      step: step.to_string(),
      hash: hash.clone(),
      completed_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    };

    let path = self.path(hash);
    let temp_path = self.dir.join(format!("{}.json.tmp", hash));
    let content = serde_json::to_string_pretty(&stamp).map_err(io::Error::other)?;
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, &path)?;

    Ok(stamp)
  }
}
