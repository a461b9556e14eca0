//! Loading and validation of the provisioning manifest.
//!
//! [`ToolchainSpec::load`] parses a `kiln.toml` file and rejects anything that
//! would make two provisioning runs diverge in tool identity: unpinned tools,
//! archives without an integrity check, and floating channels nobody signed off on.

mod types;

pub use types::*;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::util::hash::is_sha256_hex;

/// Values that look like a pin but resolve to whatever is newest.
const UNPINNED_VALUES: &[&str] = &["", "latest", "*", "current", "any"];

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("{tool}: '{value}' is not a pin, use an explicit version or channel")]
  Unpinned { tool: String, value: String },

  #[error("{tool}: either `version` or `channel` must be set")]
  MissingPin { tool: String },

  #[error("{tool}: `version` and `channel` are mutually exclusive")]
  ConflictingPin { tool: String },

  #[error("{tool}: channel '{channel}' floats forward in time; set `allow_floating = true` to accept the drift")]
  FloatingNotAcknowledged { tool: String, channel: String },

  #[error("{tool}: archive needs an integrity check (`sha256`, or `sha256_url` for floating channels)")]
  MissingIntegrity { tool: String },

  #[error("{tool}: `sha256_url` is only accepted for floating channels, pin the digest with `sha256`")]
  ChecksumUrlNotAllowed { tool: String },

  #[error("{tool}: `sha256` and `sha256_url` are mutually exclusive")]
  ConflictingIntegrity { tool: String },

  #[error("{tool}: '{value}' is not a lowercase hex SHA-256 digest")]
  InvalidDigest { tool: String, value: String },

  #[error("{tool}: unsupported URL '{url}' (expected http:// or https://)")]
  UnsupportedUrl { tool: String, url: String },

  #[error("duplicate tool name: {0}")]
  DuplicateTool(String),

  #[error("{tool} requires unknown tool '{requirement}'")]
  UnknownRequirement { tool: String, requirement: String },

  #[error("toolchain dependency cycle involving '{0}'")]
  DependencyCycle(String),

  #[error("{field} must be an absolute path, got {path}")]
  RelativePath { field: String, path: PathBuf },

  #[error("invalid package manager configuration: {0}")]
  InvalidPackageManager(String),
}

impl ToolchainSpec {
  /// Read, parse and validate a manifest file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    debug!(path = %path.display(), "loading manifest");
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content)
  }

  /// Parse and validate manifest content.
  pub fn parse(content: &str) -> Result<Self, ManifestError> {
    let spec: ToolchainSpec = toml::from_str(content)?;
    spec.validate()?;
    for tool in spec.floating_tools() {
      warn!(tool = %tool.name, channel = %tool.pin.value(), "toolchain pinned to a floating channel");
    }
    Ok(spec)
  }

  /// Check every invariant that does not depend on install ordering.
  pub fn validate(&self) -> Result<(), ManifestError> {
    check_pin_value(&self.image.base, &self.image.version)?;
    require_absolute("image.workdir", &self.image.workdir)?;
    require_absolute("driver.path", &self.driver.path)?;
    require_absolute("driver.manifest_path", &self.driver.manifest_path)?;
    self.validate_package_manager()?;

    let mut names = HashSet::new();
    names.insert(self.image.base.clone());

    for package in &self.packages {
      check_pin_value(&package.name, &package.version)?;
      if !names.insert(package.name.clone()) {
        return Err(ManifestError::DuplicateTool(package.name.clone()));
      }
      for (i, dir) in package.path.iter().enumerate() {
        require_absolute(&format!("packages.{}.path[{}]", package.name, i), dir)?;
      }
    }

    for toolchain in &self.toolchains {
      if !names.insert(toolchain.name.clone()) {
        return Err(ManifestError::DuplicateTool(toolchain.name.clone()));
      }
      validate_toolchain(toolchain)?;
    }

    for toolchain in &self.toolchains {
      for requirement in &toolchain.requires {
        if !names.contains(requirement) || *requirement == self.image.base {
          return Err(ManifestError::UnknownRequirement {
            tool: toolchain.name.clone(),
            requirement: requirement.clone(),
          });
        }
      }
    }

    Ok(())
  }

  fn validate_package_manager(&self) -> Result<(), ManifestError> {
    let pm = &self.package_manager;
    if let Some(install) = &pm.install
      && !install.contains("{packages}")
    {
      return Err(ManifestError::InvalidPackageManager(
        "`install` must contain the {packages} placeholder".to_string(),
      ));
    }
    if pm.kind == PackageManagerKind::Custom && (pm.refresh.is_none() || pm.install.is_none()) {
      return Err(ManifestError::InvalidPackageManager(
        "kind = \"custom\" requires both `refresh` and `install`".to_string(),
      ));
    }
    Ok(())
  }

  /// The `{name, pin, install method}` tuples making up the toolchain set,
  /// base image first, then in declaration order.
  pub fn tools(&self) -> Vec<ToolEntry> {
    let mut tools = vec![ToolEntry {
      name: self.image.base.clone(),
      pin: Pin::Version(self.image.version.clone()),
      method: InstallMethod::BaseImage,
    }];

    tools.extend(self.packages.iter().map(|p| ToolEntry {
      name: p.name.clone(),
      pin: Pin::Version(p.version.clone()),
      method: InstallMethod::PackageManager {
        manager: self.package_manager.kind,
      },
    }));

    tools.extend(self.toolchains.iter().filter_map(|t| {
      Some(ToolEntry {
        name: t.name.clone(),
        pin: t.pin().ok()?,
        method: InstallMethod::Archive {
          url: t.url.clone(),
          integrity: t.integrity().ok()?,
        },
      })
    }));

    tools
  }

  /// Tools whose pin drifts over time.
  pub fn floating_tools(&self) -> Vec<ToolEntry> {
    self.tools().into_iter().filter(|t| t.pin.is_floating()).collect()
  }

  /// Environment exported by every package and toolchain, in install order.
  pub fn exports(&self) -> Exports {
    let mut exports = Exports::default();
    for phase in [PackagePhase::Prerequisites, PackagePhase::Compilers] {
      for package in self.packages.iter().filter(|p| p.phase == phase) {
        exports.extend(&package.exports());
      }
    }
    for toolchain in &self.toolchains {
      exports.extend(&toolchain.exports());
    }
    exports
  }

  pub fn package(&self, name: &str) -> Option<&PackageSpec> {
    self.packages.iter().find(|p| p.name == name)
  }

  pub fn toolchain(&self, name: &str) -> Option<&ToolchainDef> {
    self.toolchains.iter().find(|t| t.name == name)
  }
}

impl ToolchainDef {
  /// Resolve the `version` / `channel` fields into a [`Pin`].
  pub fn pin(&self) -> Result<Pin, ManifestError> {
    match (&self.version, &self.channel) {
      (Some(_), Some(_)) => Err(ManifestError::ConflictingPin {
        tool: self.name.clone(),
      }),
      (None, None) => Err(ManifestError::MissingPin {
        tool: self.name.clone(),
      }),
      (Some(version), None) => {
        check_pin_value(&self.name, version)?;
        Ok(Pin::Version(version.clone()))
      }
      (None, Some(channel)) => {
        check_pin_value(&self.name, channel)?;
        Ok(Pin::Channel(channel.clone()))
      }
    }
  }

  /// Resolve the `sha256` / `sha256_url` fields into an [`Integrity`] check.
  pub fn integrity(&self) -> Result<Integrity, ManifestError> {
    match (&self.sha256, &self.sha256_url) {
      (Some(_), Some(_)) => Err(ManifestError::ConflictingIntegrity {
        tool: self.name.clone(),
      }),
      (None, None) => Err(ManifestError::MissingIntegrity {
        tool: self.name.clone(),
      }),
      (Some(digest), None) => {
        if !is_sha256_hex(digest) {
          return Err(ManifestError::InvalidDigest {
            tool: self.name.clone(),
            value: digest.clone(),
          });
        }
        Ok(Integrity::Sha256(digest.clone()))
      }
      (None, Some(url)) => {
        check_url(&self.name, url)?;
        Ok(Integrity::ChecksumUrl(url.clone()))
      }
    }
  }
}

fn validate_toolchain(toolchain: &ToolchainDef) -> Result<(), ManifestError> {
  let pin = toolchain.pin()?;
  let integrity = toolchain.integrity()?;

  if pin.is_floating() && !toolchain.allow_floating {
    return Err(ManifestError::FloatingNotAcknowledged {
      tool: toolchain.name.clone(),
      channel: pin.value().to_string(),
    });
  }

  if matches!(integrity, Integrity::ChecksumUrl(_)) && !pin.is_floating() {
    return Err(ManifestError::ChecksumUrlNotAllowed {
      tool: toolchain.name.clone(),
    });
  }

  check_url(&toolchain.name, &toolchain.url)?;
  require_absolute(&format!("toolchains.{}.install_root", toolchain.name), &toolchain.install_root)?;
  for (i, dir) in toolchain.path.iter().enumerate() {
    require_absolute(&format!("toolchains.{}.path[{}]", toolchain.name, i), dir)?;
  }

  Ok(())
}

fn check_pin_value(tool: &str, value: &str) -> Result<(), ManifestError> {
  let normalized = value.trim().to_ascii_lowercase();
  if UNPINNED_VALUES.contains(&normalized.as_str()) {
    return Err(ManifestError::Unpinned {
      tool: tool.to_string(),
      value: value.to_string(),
    });
  }
  Ok(())
}

fn check_url(tool: &str, url: &str) -> Result<(), ManifestError> {
  if url.starts_with("https://") || url.starts_with("http://") {
    Ok(())
  } else {
    Err(ManifestError::UnsupportedUrl {
      tool: tool.to_string(),
      url: url.to_string(),
    })
  }
}

fn require_absolute(field: &str, path: &Path) -> Result<(), ManifestError> {
  if path.is_absolute() {
    Ok(())
  } else {
    Err(ManifestError::RelativePath {
      field: field.to_string(),
      path: path.to_path_buf(),
    })
  }
}
