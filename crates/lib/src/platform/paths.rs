use std::path::PathBuf;

use crate::consts::APP_NAME;

use super::is_elevated;

/// Returns the user's home directory, falling back to `/root` when `HOME` is unset
/// (as it can be inside minimal container images).
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/root"))
}

/// Returns the directory for data files for the application
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
///
/// `KILN_CACHE_DIR` takes precedence over the XDG location.
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("KILN_CACHE_DIR") {
    return PathBuf::from(dir);
  }
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the directory holding provisioning state (stamps and the lock file).
///
/// Resolution order: `KILN_STATE_DIR`, `/var/lib/kiln` when running as root, then
/// the user data directory.
pub fn state_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("KILN_STATE_DIR") {
    return PathBuf::from(dir);
  }
  if is_elevated() {
    return PathBuf::from("/var/lib").join(APP_NAME);
  }
  data_dir()
}

/// Returns the directory where downloaded archives are cached.
pub fn downloads_dir() -> PathBuf {
  cache_dir().join("downloads")
}
