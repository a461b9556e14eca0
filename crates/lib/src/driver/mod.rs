//! The release driver.
//!
//! This is what the container runs when it is started without arguments:
//!
//! 1. Load and validate [`ReleaseConfig`]
//! 2. Locate the project source (working directory, git or archive)
//! 3. `cargo build` once per target
//! 4. Collect the built binaries
//! 5. Package deterministic archives, `SHA256SUMS` and `release.json`
//! 6. Optionally publish everything
//!
//! Any failure ends the run with an error; there is no partial success. Only
//! the network calls retry: fetching a configured source and publishing.

pub mod build;
pub mod config;
pub mod invocation;
pub mod package;
pub mod publish;
pub mod source;

pub use config::{ConfigError, ProjectInfo, PublishConfig, ReleaseConfig, RetryPolicy, SourceSpec};
pub use invocation::ReleaseInvocation;
pub use package::Artifact;
pub use publish::PublishError;
pub use source::{LocatedSource, SourceError};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::consts::APP_NAME;
use crate::platform::paths::cache_dir;

use self::package::{ArchiveEntry, archive_stem, write_archive, write_checksums, write_release_manifest};

#[derive(Debug, Error)]
pub enum ReleaseError {
  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),

  #[error("source error: {0}")]
  Source(#[from] SourceError),

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("build for {target} failed with exit code {code:?}")]
  Build { target: String, code: Option<i32> },

  #[error("build for {target} did not produce {path}")]
  MissingBinary { target: String, path: PathBuf },

  #[error("failed to package {target}: {source}")]
  Package {
    target: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write release metadata: {0}")]
  Metadata(#[source] std::io::Error),

  #[error("publish failed: {0}")]
  Publish(#[from] PublishError),
}

/// Run-time inputs that are not part of the configuration.
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
  /// The driver's working directory.
  pub cwd: PathBuf,
  /// Where fetched sources are checked out.
  pub work_dir: PathBuf,
  /// Build and package, but do not upload.
  pub skip_publish: bool,
}

impl ReleaseOptions {
  pub fn new(cwd: &Path) -> Self {
    Self {
      cwd: cwd.to_path_buf(),
      work_dir: cache_dir().join("sources"),
      skip_publish: false,
    }
  }
}

/// What a release run produced. Also written to `release.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
  pub name: String,
  pub version: String,
  /// Commit id or archive digest of a fetched source.
  pub source_revision: Option<String>,
  pub source_date_epoch: u64,
  pub profile: String,
  pub artifacts: Vec<Artifact>,
  /// Upload URLs, empty when nothing was published.
  #[serde(default)]
  pub published: Vec<String>,
}

/// Run the release pipeline.
pub async fn run_release(config: &ReleaseConfig, options: &ReleaseOptions) -> Result<ReleaseOutcome, ReleaseError> {
  let located = source::locate_source(
    &options.cwd,
    config.source.as_ref(),
    &options.work_dir,
    &config.source_retry,
  )
  .await?;
  let project = config.project(&located.root)?;
  let version = project.version.to_string();

  info!(
    name = %project.name,
    version = %version,
    targets = ?config.targets,
    root = %project.root.display(),
    "starting release"
  );

  let token = match (&config.publish, options.skip_publish) {
    (Some(publish), false) => Some(publish::read_token(publish)?),
    _ => None,
  };

  let mut artifacts = Vec::with_capacity(config.targets.len());
  for target in &config.targets {
    build::build_target(config, &project, target).await?;
    let binaries = build::collect_binaries(config, &project, target)?;
    artifacts.push(package_target(config, &project, target, &binaries)?);
  }

  let checksums = write_checksums(&config.output_dir, &artifacts).map_err(ReleaseError::Metadata)?;

  let mut outcome = ReleaseOutcome {
    name: project.name.clone(),
    version: version.clone(),
    source_revision: located.revision,
    source_date_epoch: config.source_date_epoch,
    profile: config.profile.clone(),
    artifacts,
    published: Vec::new(),
  };
  let manifest = write_release_manifest(&config.output_dir, &outcome).map_err(ReleaseError::Metadata)?;

  if let (Some(publish), Some(token)) = (&config.publish, token) {
    let mut files: Vec<PathBuf> = outcome
      .artifacts
      .iter()
      .map(|a| config.output_dir.join(&a.file))
      .collect();
    files.push(checksums);
    files.push(manifest);
    outcome.published = publish::publish_files(publish, &token, &version, &files).await?;
  }

  info!(
    artifacts = outcome.artifacts.len(),
    published = outcome.published.len(),
    output = %config.output_dir.display(),
    "{} release finished",
    APP_NAME
  );
  Ok(outcome)
}

fn package_target(
  config: &ReleaseConfig,
  project: &ProjectInfo,
  target: &str,
  binaries: &[PathBuf],
) -> Result<Artifact, ReleaseError> {
  let package_err = |source| ReleaseError::Package {
    target: target.to_string(),
    source,
  };

  let mut entries = binaries
    .iter()
    .map(|b| ArchiveEntry::binary(b))
    .collect::<Result<Vec<_>, _>>()
    .map_err(package_err)?;
  entries.extend(config.include.iter().map(|f| ArchiveEntry::file(&project.root, f)));

  let stem = archive_stem(&project.name, &project.version.to_string(), target);
  write_archive(&config.output_dir, &stem, target, &entries, config.source_date_epoch).map_err(package_err)
}
