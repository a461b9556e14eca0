//! Release driver configuration.
//!
//! The container's entry point takes no arguments, so everything the driver
//! needs arrives through `kiln-release.toml` and `KILN_*` environment
//! variables. Both are folded into one [`ReleaseConfig`] up front and
//! validated before any work starts; nothing else in the driver reads the
//! environment for settings.
//!
//! Precedence, highest first: environment, config file, `Cargo.toml` of the
//! project, built-in defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_SOURCE_DATE_EPOCH, RELEASE_CONFIG_FILENAME};
use crate::execute::parse_source_date_epoch;
use crate::platform::host_target;
use crate::util::hash::is_sha256_hex;

pub const DEFAULT_PROFILE: &str = "release";
pub const DEFAULT_OUTPUT_DIR: &str = "dist";
pub const DEFAULT_TOKEN_ENV: &str = "KILN_PUBLISH_TOKEN";
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Environment variables read by the driver.
pub mod vars {
  pub const RELEASE_CONFIG: &str = "KILN_RELEASE_CONFIG";
  pub const NAME: &str = "KILN_NAME";
  pub const VERSION: &str = "KILN_VERSION";
  pub const TARGETS: &str = "KILN_TARGETS";
  pub const BINARIES: &str = "KILN_BINARIES";
  pub const FEATURES: &str = "KILN_FEATURES";
  pub const PROFILE: &str = "KILN_PROFILE";
  pub const LOCKED: &str = "KILN_LOCKED";
  pub const OUTPUT_DIR: &str = "KILN_OUTPUT_DIR";
  pub const CARGO: &str = "KILN_CARGO";
  pub const SOURCE_GIT: &str = "KILN_SOURCE_GIT";
  pub const SOURCE_REF: &str = "KILN_SOURCE_REF";
  pub const SOURCE_URL: &str = "KILN_SOURCE_URL";
  pub const SOURCE_SHA256: &str = "KILN_SOURCE_SHA256";
  pub const SOURCE_ATTEMPTS: &str = "KILN_SOURCE_ATTEMPTS";
  pub const SOURCE_BACKOFF: &str = "KILN_SOURCE_BACKOFF";
  pub const PUBLISH_URL: &str = "KILN_PUBLISH_URL";
  pub const PUBLISH_TOKEN_ENV: &str = "KILN_PUBLISH_TOKEN_ENV";
  pub const PUBLISH_ATTEMPTS: &str = "KILN_PUBLISH_ATTEMPTS";
  pub const PUBLISH_BACKOFF: &str = "KILN_PUBLISH_BACKOFF";
  pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid value for {field}: '{value}' ({reason})")]
  InvalidValue {
    field: String,
    value: String,
    reason: String,
  },

  #[error("invalid version '{value}': {source}")]
  InvalidVersion {
    value: String,
    #[source]
    source: semver::Error,
  },

  #[error("no build target configured and the host platform is not recognized; set KILN_TARGETS")]
  NoTargets,

  #[error("source: `git` and `url` are mutually exclusive")]
  ConflictingSource,

  #[error("source: archive url {0} needs a `sha256` digest")]
  MissingSourceDigest(String),

  #[error("source: `ref` is only meaningful together with `git`")]
  OrphanRef,

  #[error("source: `sha256` is only meaningful together with `url`")]
  OrphanDigest,

  #[error("{0} not found: the working directory must be the project root or a source must be configured")]
  MissingCargoToml(PathBuf),

  #[error("{path}: {message}")]
  CargoToml { path: PathBuf, message: String },

  #[error("project name is not set and {0} has no [package] name")]
  MissingName(PathBuf),

  #[error("project version is not set and {0} has no [package] version")]
  MissingVersion(PathBuf),
}

/// `kiln-release.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseFile {
  pub name: Option<String>,
  pub version: Option<String>,
  pub targets: Option<Vec<String>>,
  pub binaries: Option<Vec<String>>,
  pub features: Option<Vec<String>>,
  pub profile: Option<String>,
  pub locked: Option<bool>,
  pub output_dir: Option<PathBuf>,
  pub cargo: Option<String>,
  /// Extra files packaged next to the binaries, relative to the project root.
  pub include: Option<Vec<PathBuf>>,
  #[serde(default)]
  pub source: SourceFile,
  #[serde(default)]
  pub publish: PublishFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFile {
  pub git: Option<String>,
  #[serde(rename = "ref")]
  pub reference: Option<String>,
  pub url: Option<String>,
  pub sha256: Option<String>,
  pub attempts: Option<u32>,
  pub backoff: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishFile {
  pub url: Option<String>,
  pub token_env: Option<String>,
  pub attempts: Option<u32>,
  pub backoff: Option<String>,
}

impl ReleaseFile {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Where the project source comes from when the working directory is not it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
  Git { url: String, reference: Option<String> },
  Archive { url: String, sha256: String },
}

/// Exponential backoff for the driver's network calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub attempts: u32,
  pub backoff: Duration,
}

impl RetryPolicy {
  /// Delay before retry number `retry` (1-based): `backoff * 2^(retry - 1)`.
  pub fn delay(&self, retry: u32) -> Duration {
    let factor = 1u32 << retry.saturating_sub(1).min(10);
    self.backoff.saturating_mul(factor)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts: DEFAULT_RETRY_ATTEMPTS,
      backoff: DEFAULT_RETRY_BACKOFF,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishConfig {
  /// Base URL; artifacts go to `<url>/<version>/<file>`.
  pub url: String,
  /// Name of the variable holding the bearer token. The token itself is never stored.
  pub token_env: String,
  pub retry: RetryPolicy,
}

/// Validated driver configuration.
///
/// `name`, `version` and `binaries` may still be unset here: they default
/// from the project's `Cargo.toml`, which is only known once the source has
/// been located. See [`ReleaseConfig::project`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseConfig {
  pub name: Option<String>,
  pub version: Option<semver::Version>,
  pub targets: Vec<String>,
  pub binaries: Vec<String>,
  pub features: Vec<String>,
  pub profile: String,
  pub locked: bool,
  pub output_dir: PathBuf,
  pub cargo: String,
  pub include: Vec<PathBuf>,
  pub source: Option<SourceSpec>,
  /// Applies to cloning or downloading a configured source.
  pub source_retry: RetryPolicy,
  pub publish: Option<PublishConfig>,
  pub source_date_epoch: u64,
}

/// Name, version and binaries of the project being released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
  pub root: PathBuf,
  pub name: String,
  pub version: semver::Version,
  pub binaries: Vec<String>,
}

impl ReleaseConfig {
  /// Load configuration for a driver started in `cwd`, reading the process environment.
  pub fn load(cwd: &Path) -> Result<Self, ConfigError> {
    let env: BTreeMap<String, String> = std::env::vars()
      .filter(|(k, _)| k.starts_with("KILN_") || k == vars::SOURCE_DATE_EPOCH)
      .collect();
    Self::load_with_env(cwd, &env)
  }

  /// Load configuration with an explicit environment.
  pub fn load_with_env(cwd: &Path, env: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
    let file = match env.get(vars::RELEASE_CONFIG) {
      Some(path) => ReleaseFile::load(&cwd.join(path))?,
      None => {
        let path = cwd.join(RELEASE_CONFIG_FILENAME);
        if path.is_file() {
          ReleaseFile::load(&path)?
        } else {
          ReleaseFile::default()
        }
      }
    };
    Self::resolve(cwd, file, env)
  }

  /// Merge `file` and `env` and validate the result.
  pub fn resolve(cwd: &Path, file: ReleaseFile, env: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
    let get = |var: &str| env.get(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let name = get(vars::NAME).or(file.name);
    if let Some(name) = &name
      && (name.contains('/') || name.contains(char::is_whitespace))
    {
      return Err(invalid("name", name, "must not contain '/' or whitespace"));
    }

    let version = get(vars::VERSION)
      .or(file.version)
      .map(|v| parse_version(&v))
      .transpose()?;

    let targets = match get(vars::TARGETS).map(|v| split_list(&v)).or(file.targets) {
      Some(targets) if !targets.is_empty() => targets,
      _ => vec![host_target().ok_or(ConfigError::NoTargets)?],
    };

    let binaries = get(vars::BINARIES)
      .map(|v| split_list(&v))
      .or(file.binaries)
      .unwrap_or_default();
    let features = get(vars::FEATURES)
      .map(|v| split_list(&v))
      .or(file.features)
      .unwrap_or_default();

    let profile = get(vars::PROFILE)
      .or(file.profile)
      .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

    let locked = match get(vars::LOCKED) {
      Some(value) => parse_bool(vars::LOCKED, &value)?,
      None => file.locked.unwrap_or(true),
    };

    let output_dir = get(vars::OUTPUT_DIR)
      .map(PathBuf::from)
      .or(file.output_dir)
      .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let output_dir = cwd.join(output_dir);

    let cargo = get(vars::CARGO)
      .or(file.cargo)
      .unwrap_or_else(|| "cargo".to_string());

    let source = resolve_source(
      get(vars::SOURCE_GIT).or(file.source.git),
      get(vars::SOURCE_REF).or(file.source.reference),
      get(vars::SOURCE_URL).or(file.source.url),
      get(vars::SOURCE_SHA256).or(file.source.sha256),
    )?;
    let source_retry = resolve_retry(
      "source",
      get(vars::SOURCE_ATTEMPTS),
      file.source.attempts,
      get(vars::SOURCE_BACKOFF).or(file.source.backoff),
    )?;

    let publish = match get(vars::PUBLISH_URL).or(file.publish.url) {
      Some(url) => {
        check_url("publish.url", &url)?;
        let retry = resolve_retry(
          "publish",
          get(vars::PUBLISH_ATTEMPTS),
          file.publish.attempts,
          get(vars::PUBLISH_BACKOFF).or(file.publish.backoff),
        )?;
        Some(PublishConfig {
          url: url.trim_end_matches('/').to_string(),
          token_env: get(vars::PUBLISH_TOKEN_ENV)
            .or(file.publish.token_env)
            .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string()),
          retry,
        })
      }
      None => None,
    };

    let source_date_epoch = match get(vars::SOURCE_DATE_EPOCH) {
      Some(value) => parse_source_date_epoch(&value)
        .ok_or_else(|| invalid(vars::SOURCE_DATE_EPOCH, &value, "expected seconds since the epoch"))?,
      None => DEFAULT_SOURCE_DATE_EPOCH,
    };

    let config = Self {
      name,
      version,
      targets,
      binaries,
      features,
      profile,
      locked,
      output_dir,
      cargo,
      include: file.include.unwrap_or_default(),
      source,
      source_retry,
      publish,
      source_date_epoch,
    };
    debug!(?config, "resolved release configuration");
    Ok(config)
  }

  /// Directory under `target/<triple>/` that cargo writes this profile to.
  pub fn profile_dir(&self) -> &str {
    match self.profile.as_str() {
      "dev" | "test" => "debug",
      "bench" => "release",
      other => other,
    }
  }

  /// Fill in name, version and binaries from `<root>/Cargo.toml` where not configured.
  pub fn project(&self, root: &Path) -> Result<ProjectInfo, ConfigError> {
    let manifest_path = root.join("Cargo.toml");
    if !manifest_path.is_file() {
      return Err(ConfigError::MissingCargoToml(manifest_path));
    }
    let content = fs::read_to_string(&manifest_path).map_err(|source| ConfigError::Read {
      path: manifest_path.clone(),
      source,
    })?;
    let manifest: CargoManifest = toml::from_str(&content).map_err(|e| ConfigError::CargoToml {
      path: manifest_path.clone(),
      message: e.to_string(),
    })?;
    let package = manifest.package.unwrap_or_default();

    let name = self
      .name
      .clone()
      .or(package.name)
      .ok_or_else(|| ConfigError::MissingName(manifest_path.clone()))?;

    let version = match &self.version {
      Some(version) => version.clone(),
      None => match package.version {
        Some(toml::Value::String(v)) => parse_version(&v)?,
        Some(_) => {
          return Err(ConfigError::CargoToml {
            path: manifest_path.clone(),
            message: "inherited package.version is not supported, set KILN_VERSION".to_string(),
          });
        }
        None => return Err(ConfigError::MissingVersion(manifest_path)),
      },
    };

    let binaries = if !self.binaries.is_empty() {
      self.binaries.clone()
    } else if !manifest.bin.is_empty() {
      manifest.bin.into_iter().filter_map(|b| b.name).collect()
    } else {
      vec![name.clone()]
    };

    Ok(ProjectInfo {
      root: root.to_path_buf(),
      name,
      version,
      binaries,
    })
  }
}

#[derive(Debug, Default, Deserialize)]
struct CargoManifest {
  package: Option<CargoPackage>,
  #[serde(default)]
  bin: Vec<CargoBin>,
}

#[derive(Debug, Default, Deserialize)]
struct CargoPackage {
  name: Option<String>,
  /// A string, or `{ workspace = true }`.
  version: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct CargoBin {
  name: Option<String>,
}

fn resolve_source(
  git: Option<String>,
  reference: Option<String>,
  url: Option<String>,
  sha256: Option<String>,
) -> Result<Option<SourceSpec>, ConfigError> {
  match (git, url) {
    (Some(_), Some(_)) => Err(ConfigError::ConflictingSource),
    (Some(_), None) if sha256.is_some() => Err(ConfigError::OrphanDigest),
    (Some(git), None) => Ok(Some(SourceSpec::Git { url: git, reference })),
    (None, Some(url)) => {
      if reference.is_some() {
        return Err(ConfigError::OrphanRef);
      }
      check_url("source.url", &url)?;
      let sha256 = sha256.ok_or_else(|| ConfigError::MissingSourceDigest(url.clone()))?;
      let sha256 = sha256.to_lowercase();
      if !is_sha256_hex(&sha256) {
        return Err(invalid("source.sha256", &sha256, "expected a hex SHA-256 digest"));
      }
      Ok(Some(SourceSpec::Archive { url, sha256 }))
    }
    (None, None) if reference.is_some() => Err(ConfigError::OrphanRef),
    (None, None) if sha256.is_some() => Err(ConfigError::OrphanDigest),
    (None, None) => Ok(None),
  }
}

fn parse_version(value: &str) -> Result<semver::Version, ConfigError> {
  let trimmed = value.strip_prefix('v').unwrap_or(value);
  semver::Version::parse(trimmed).map_err(|source| ConfigError::InvalidVersion {
    value: value.to_string(),
    source,
  })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
  match value.to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(invalid(field, value, "expected true or false")),
  }
}

fn split_list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

/// `attempts` comes from the environment and wins over `file_attempts`.
fn resolve_retry(
  field: &str,
  attempts: Option<String>,
  file_attempts: Option<u32>,
  backoff: Option<String>,
) -> Result<RetryPolicy, ConfigError> {
  let attempts = match attempts {
    Some(value) => value
      .parse::<u32>()
      .map_err(|e| invalid(&format!("{}.attempts", field), &value, &e.to_string()))?,
    None => file_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
  };
  if attempts == 0 {
    return Err(invalid(
      &format!("{}.attempts", field),
      "0",
      "at least one attempt is required",
    ));
  }
  let backoff = match backoff {
    Some(value) => humantime::parse_duration(&value)
      .map_err(|e| invalid(&format!("{}.backoff", field), &value, &e.to_string()))?,
    None => DEFAULT_RETRY_BACKOFF,
  };
  Ok(RetryPolicy { attempts, backoff })
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
  if url.starts_with("https://") || url.starts_with("http://") {
    Ok(())
  } else {
    Err(invalid(field, url, "expected an http:// or https:// URL"))
  }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
  ConfigError::InvalidValue {
    field: field.to_string(),
    value: value.to_string(),
    reason: reason.to_string(),
  }
}
