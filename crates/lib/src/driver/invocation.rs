//! The driver's run-time context.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

const REDACTED: &str = "<redacted>";
const SECRET_MARKERS: &[&str] = &["TOKEN", "SECRET", "PASSWORD", "CREDENTIAL", "KEY"];

/// Working directory, `KILN_*` environment and command line of the driver
/// process. Exists for the lifetime of one container run and is never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInvocation {
  pub cwd: PathBuf,
  pub args: Vec<String>,
  /// Driver-related variables with anything credential-like redacted.
  pub env: BTreeMap<String, String>,
}

impl ReleaseInvocation {
  /// Capture the current process context.
  ///
  /// Fails when the working directory no longer exists: the driver has no
  /// meaningful starting point then.
  pub fn capture() -> std::io::Result<Self> {
    let cwd = std::env::current_dir()?;
    let vars = std::env::vars().filter(|(k, _)| is_driver_var(k));
    Ok(Self::new(cwd, std::env::args().collect(), vars))
  }

  pub fn new(cwd: PathBuf, args: Vec<String>, vars: impl IntoIterator<Item = (String, String)>) -> Self {
    let env = vars
      .into_iter()
      .map(|(k, v)| {
        let v = if is_secret(&k) { REDACTED.to_string() } else { v };
        (k, v)
      })
      .collect();
    Self { cwd, args, env }
  }
}

fn is_driver_var(name: &str) -> bool {
  name.starts_with("KILN_") || name == "SOURCE_DATE_EPOCH"
}

fn is_secret(name: &str) -> bool {
  let upper = name.to_ascii_uppercase();
  SECRET_MARKERS.iter().any(|m| upper.contains(m)) && !upper.ends_with("_ENV")
}
