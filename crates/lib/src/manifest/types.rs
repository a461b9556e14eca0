//! Manifest types.
//!
//! The manifest (`kiln.toml`) declares everything the build image needs: the
//! base OS, the package manager, generic prerequisites, the pinned compiler and
//! scripting runtime, and the systems-language toolchain archive. It is data,
//! not an install transcript: the order in which things run is derived from it
//! by [`crate::plan`].
//!
//! # Example
//!
//! ```toml
//! [image]
//! base = "centos"
//! version = "7"
//! workdir = "/tikv"
//!
//! [driver]
//! source = "target/x86_64-unknown-linux-musl/release/kiln"
//!
//! [package_manager]
//! kind = "yum"
//!
//! [[packages]]
//! name = "git"
//! version = "1.8.3.1"
//! phase = "prerequisites"
//! provides = ["git"]
//!
//! [[toolchains]]
//! name = "rust"
//! channel = "nightly"
//! allow_floating = true
//! url = "https://static.rust-lang.org/dist/rust-nightly-x86_64-unknown-linux-gnu.tar.gz"
//! sha256_url = "https://static.rust-lang.org/dist/rust-nightly-x86_64-unknown-linux-gnu.tar.gz.sha256"
//! install_root = "/usr/local"
//! install = "./install.sh --prefix=$KILN_INSTALL_ROOT"
//! provides = ["rustc", "cargo"]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::IMAGE_MANIFEST_PATH;

/// The complete provisioning manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSpec {
  pub image: ImageSpec,
  pub driver: DriverSpec,
  pub package_manager: PackageManagerSpec,
  #[serde(default)]
  pub packages: Vec<PackageSpec>,
  #[serde(default)]
  pub toolchains: Vec<ToolchainDef>,
}

/// Base image and run-time layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSpec {
  /// Base image repository (e.g. `centos`).
  pub base: String,
  /// Base image tag. Must be an explicit version.
  pub version: String,
  /// Fixed working directory the release driver treats as the project root.
  pub workdir: PathBuf,
  #[serde(default)]
  pub labels: BTreeMap<String, String>,
}

/// The local file copied into the image and used as its entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverSpec {
  /// Path of the driver binary on the image build host, relative to the build context.
  pub source: PathBuf,
  /// Absolute path of the driver inside the image.
  #[serde(default = "default_driver_path")]
  pub path: PathBuf,
  /// Absolute path the manifest is copied to inside the image.
  #[serde(default = "default_manifest_path")]
  pub manifest_path: PathBuf,
}

fn default_driver_path() -> PathBuf {
  PathBuf::from("/usr/local/bin/kiln")
}

fn default_manifest_path() -> PathBuf {
  PathBuf::from(IMAGE_MANIFEST_PATH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
  Yum,
  Dnf,
  Apt,
  Apk,
  /// Commands supplied verbatim by the manifest.
  Custom,
}

impl PackageManagerKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Yum => "yum",
      Self::Dnf => "dnf",
      Self::Apt => "apt",
      Self::Apk => "apk",
      Self::Custom => "custom",
    }
  }
}

impl fmt::Display for PackageManagerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageManagerSpec {
  pub kind: PackageManagerKind,
  /// Overrides the refresh command.
  pub refresh: Option<String>,
  /// Overrides the install command. Must contain `{packages}`.
  pub install: Option<String>,
}

/// Install phases in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  Refresh,
  Prerequisites,
  Compilers,
  Toolchains,
}

impl Phase {
  pub const ALL: [Phase; 4] = [Phase::Refresh, Phase::Prerequisites, Phase::Compilers, Phase::Toolchains];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Refresh => "refresh",
      Self::Prerequisites => "prerequisites",
      Self::Compilers => "compilers",
      Self::Toolchains => "toolchains",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Phase {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Phase::ALL
      .into_iter()
      .find(|p| p.as_str() == s)
      .ok_or_else(|| format!("unknown phase '{}' (expected one of: refresh, prerequisites, compilers, toolchains)", s))
  }
}

/// The phases a package may be declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagePhase {
  Prerequisites,
  Compilers,
}

impl From<PackagePhase> for Phase {
  fn from(phase: PackagePhase) -> Self {
    match phase {
      PackagePhase::Prerequisites => Phase::Prerequisites,
      PackagePhase::Compilers => Phase::Compilers,
    }
  }
}

/// Environment a tool contributes to later steps and to the final image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exports {
  /// Directories prepended to `PATH`.
  #[serde(default)]
  pub path: Vec<PathBuf>,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
}

impl Exports {
  pub fn is_empty(&self) -> bool {
    self.path.is_empty() && self.env.is_empty()
  }

  /// Append another set of exports. Later PATH entries take precedence.
  pub fn extend(&mut self, other: &Exports) {
    for dir in other.path.iter().rev() {
      if !self.path.contains(dir) {
        self.path.insert(0, dir.clone());
      }
    }
    self.env.extend(other.env.iter().map(|(k, v)| (k.clone(), v.clone())));
  }

  /// Render `PATH` with these entries in front of `base`.
  pub fn path_with(&self, base: &str) -> String {
    let mut parts: Vec<String> = self.path.iter().map(|p| p.display().to_string()).collect();
    if !base.is_empty() {
      parts.push(base.to_string());
    }
    parts.join(":")
  }
}

/// An OS package installed through the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
  pub name: String,
  pub version: String,
  pub phase: PackagePhase,
  /// Executables that must be on `PATH` once the package is installed.
  #[serde(default)]
  pub provides: Vec<String>,
  /// Directories prepended to `PATH` once installed.
  #[serde(default)]
  pub path: Vec<PathBuf>,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
  /// Command that must exit 0 during verification.
  pub check: Option<String>,
}

impl PackageSpec {
  pub fn exports(&self) -> Exports {
    Exports {
      path: self.path.clone(),
      env: self.env.clone(),
    }
  }
}

/// A toolchain installed from a release archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainDef {
  pub name: String,
  pub version: Option<String>,
  pub channel: Option<String>,
  /// Acknowledges that an undated channel drifts over time.
  #[serde(default)]
  pub allow_floating: bool,
  pub url: String,
  pub sha256: Option<String>,
  /// URL of a published checksum file, accepted for floating channels only.
  pub sha256_url: Option<String>,
  pub install_root: PathBuf,
  /// Installer run from the unpacked archive. Without it the archive contents are
  /// copied into `install_root`.
  pub install: Option<String>,
  /// Names of packages or toolchains that must be installed first.
  #[serde(default)]
  pub requires: Vec<String>,
  #[serde(default)]
  pub provides: Vec<String>,
  /// Defaults to `<install_root>/bin` when empty.
  #[serde(default)]
  pub path: Vec<PathBuf>,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
  pub check: Option<String>,
}

impl ToolchainDef {
  pub fn exports(&self) -> Exports {
    let path = if self.path.is_empty() {
      vec![self.install_root.join("bin")]
    } else {
      self.path.clone()
    };
    Exports {
      path,
      env: self.env.clone(),
    }
  }
}

/// What a tool is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pin {
  Version(String),
  Channel(String),
}

impl Pin {
  /// A channel without a `-YYYY-MM-DD` suffix moves forward in time.
  pub fn is_floating(&self) -> bool {
    match self {
      Pin::Version(_) => false,
      Pin::Channel(channel) => !has_date_suffix(channel),
    }
  }

  pub fn value(&self) -> &str {
    match self {
      Pin::Version(v) | Pin::Channel(v) => v,
    }
  }
}

impl fmt::Display for Pin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Pin::Version(v) => write!(f, "version {}", v),
      Pin::Channel(c) if self.is_floating() => write!(f, "channel {} (floating)", c),
      Pin::Channel(c) => write!(f, "channel {}", c),
    }
  }
}

fn has_date_suffix(channel: &str) -> bool {
  let bytes = channel.as_bytes();
  if bytes.len() < 11 {
    return false;
  }
  let date = &bytes[bytes.len() - 10..];
  bytes[bytes.len() - 11] == b'-'
    && date.iter().enumerate().all(|(i, b)| match i {
      4 | 7 => *b == b'-',
      _ => b.is_ascii_digit(),
    })
}

/// How an archive is checked before it is unpacked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrity {
  Sha256(String),
  ChecksumUrl(String),
}

/// How a tool gets into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum InstallMethod {
  BaseImage,
  PackageManager { manager: PackageManagerKind },
  Archive { url: String, integrity: Integrity },
}

/// One `{name, pin, install method}` tuple of the toolchain set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEntry {
  pub name: String,
  pub pin: Pin,
  #[serde(flatten)]
  pub method: InstallMethod,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dated_channels_are_not_floating() {
    assert!(!Pin::Channel("nightly-2018-07-18".into()).is_floating());
    assert!(!Pin::Channel("beta-2024-01-02".into()).is_floating());
  }

  #[test]
  fn undated_channels_are_floating() {
    assert!(Pin::Channel("nightly".into()).is_floating());
    assert!(Pin::Channel("stable".into()).is_floating());
    assert!(Pin::Channel("nightly-2018-7-18".into()).is_floating());
    assert!(Pin::Channel("2018-07-18".into()).is_floating());
  }

  #[test]
  fn versions_are_never_floating() {
    assert!(!Pin::Version("1.29.0".into()).is_floating());
  }

  #[test]
  fn pin_display() {
    assert_eq!(Pin::Version("8.3.1".into()).to_string(), "version 8.3.1");
    assert_eq!(Pin::Channel("nightly".into()).to_string(), "channel nightly (floating)");
    assert_eq!(
      Pin::Channel("nightly-2018-07-18".into()).to_string(),
      "channel nightly-2018-07-18"
    );
  }

  #[test]
  fn phase_parse_and_order() {
    assert_eq!("compilers".parse::<Phase>().unwrap(), Phase::Compilers);
    assert!("install".parse::<Phase>().is_err());
    assert!(Phase::Refresh < Phase::Prerequisites);
    assert!(Phase::Compilers < Phase::Toolchains);
  }
}
