//! Exclusive lock on the provisioning state directory.
//!
//! Two provisioning runs against the same state directory would race on
//! stamps and on the package manager's own database, so a run holds an
//! exclusive `flock` for its whole duration.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "state directory is locked by another provisioning run: {command} (PID {pid}, started at unix time {started_at_unix})\n\
     if no kiln process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "state directory is locked (could not read lock metadata)\n\
     if no kiln process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to prepare lock file {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held for as long as the value lives; released on drop.
#[derive(Debug)]
pub struct StateLock {
  file: File,
  lock_path: PathBuf,
}

impl StateLock {
  /// Take the exclusive lock in `state_dir`, failing immediately if it is held.
  pub fn acquire(state_dir: &Path, command: &str) -> Result<Self, LockError> {
    let lock_path = state_dir.join(LOCK_FILENAME);
    let open_err = |source| LockError::Open {
      path: lock_path.clone(),
      source,
    };

    std::fs::create_dir_all(state_dir).map_err(open_err)?;
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(open_err)?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(contention_error(&lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    write_metadata(&file, command).map_err(open_err)?;

    Ok(Self { file, lock_path })
  }

  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str) -> io::Result<()> {
  let metadata = LockMetadata {
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
  };

  file.set_len(0)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(io::Error::other)?;
  writer.flush()
}

fn contention_error(lock_path: &Path) -> LockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return LockError::Contention {
        command: metadata.command,
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  LockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn acquire_writes_metadata() {
    let temp = TempDir::new().unwrap();
    let lock = StateLock::acquire(temp.path(), "provision --phase toolchains").unwrap();
    assert!(lock.lock_path().exists());

    let metadata = lock.read_metadata().unwrap();
    assert_eq!(metadata.command, "provision --phase toolchains");
    assert_eq!(metadata.pid, std::process::id());
  }

  #[cfg(unix)]
  #[test]
  fn second_acquire_is_contention() {
    let temp = TempDir::new().unwrap();
    let _held = StateLock::acquire(temp.path(), "provision").unwrap();

    match StateLock::acquire(temp.path(), "provision") {
      Err(LockError::Contention { command, pid, .. }) => {
        assert_eq!(command, "provision");
        assert_eq!(pid, std::process::id());
      }
      other => panic!("expected contention, got {:?}", other),
    }
  }

  #[test]
  fn released_on_drop() {
    let temp = TempDir::new().unwrap();
    {
      let _lock = StateLock::acquire(temp.path(), "first").unwrap();
    }
    let lock = StateLock::acquire(temp.path(), "second").unwrap();
    assert_eq!(lock.read_metadata().unwrap().command, "second");
  }
}
