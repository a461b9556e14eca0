//! Archive extraction and tree copying.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::execute::types::ExecuteError;

/// Unpack a `.tar.gz`/`.tgz` or `.tar` archive into `dest`, dropping the first
/// `strip` path components of every entry.
pub fn unpack_archive(archive_path: &Path, dest: &Path, strip: usize) -> Result<(), ExecuteError> {
  let name = archive_path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default();

  fs::create_dir_all(dest)?;
  let file = BufReader::new(File::open(archive_path)?);

  if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
    unpack_entries(Archive::new(GzDecoder::new(file)), dest, strip)?;
  } else if name.ends_with(".tar") {
    unpack_entries(Archive::new(file), dest, strip)?;
  } else {
    return Err(ExecuteError::UnsupportedArchive(archive_path.to_path_buf()));
  }

  info!(dest = %dest.display(), "unpacked archive");
  Ok(())
}

fn unpack_entries<R: std::io::Read>(mut archive: Archive<R>, dest: &Path, strip: usize) -> Result<(), ExecuteError> {
  archive.set_preserve_permissions(true);

  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.into_owned();
    if !is_contained(&path) {
      return Err(ExecuteError::UnsafeArchiveEntry(path));
    }

    let stripped: PathBuf = path.components().skip(strip).collect();
    if stripped.as_os_str().is_empty() {
      continue;
    }

    // Nothing may be written through a symlink an earlier entry created.
    check_no_symlink_ancestors(dest, &stripped)?;
    let dest_path = dest.join(&stripped);
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    if entry.header().entry_type().is_hard_link() {
      let target = entry.link_name()?.map(|t| t.into_owned()).unwrap_or_default();
      let target_stripped: PathBuf = target.components().skip(strip).collect();
      if !is_contained(&target) || target_stripped.as_os_str().is_empty() {
        return Err(ExecuteError::UnsafeArchiveEntry(path));
      }
      check_no_symlink_ancestors(dest, &target_stripped)?;
      if dest_path.symlink_metadata().is_ok() {
        fs::remove_file(&dest_path)?;
      }
      fs::hard_link(dest.join(&target_stripped), &dest_path)?;
      continue;
    }

    entry.unpack(&dest_path)?;
  }

  Ok(())
}

/// True when `path` is relative and never climbs with `..`.
fn is_contained(path: &Path) -> bool {
  !path
    .components()
    .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

fn check_no_symlink_ancestors(dest: &Path, relative: &Path) -> Result<(), ExecuteError> {
  let Some(parent) = relative.parent() else {
    return Ok(());
  };
  let mut current = dest.to_path_buf();
  for component in parent.components() {
    current.push(component);
    if current.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
      return Err(ExecuteError::UnsafeArchiveEntry(relative.to_path_buf()));
    }
  }
  Ok(())
}

/// Recursively copy `src` into `dest`, preserving permissions and symlinks.
///
/// Existing files are overwritten.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<u64, ExecuteError> {
  let mut copied = 0;

  for entry in WalkDir::new(src).sort_by_file_name() {
    let entry = entry.map_err(std::io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(std::io::Error::other)?;
    let target = dest.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      if target.symlink_metadata().is_ok() {
        fs::remove_file(&target)?;
      }
      symlink(&link, &target)?;
    } else {
      fs::copy(entry.path(), &target)?;
      copied += 1;
    }
  }

  debug!(src = %src.display(), dest = %dest.display(), files = copied, "copied tree");
  Ok(copied)
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
  fs::copy(original, link).map(|_| ())
}
