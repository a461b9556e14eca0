//! Locating the project source.
//!
//! By default the working directory is the project root (the source is
//! mounted there). A git repository or a source archive can be configured
//! instead, in which case the driver fetches it itself.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::driver::config::{RetryPolicy, SourceSpec};
use crate::execute::{ExecuteError, execute_fetch, unpack_archive};
use crate::manifest::Integrity;
use crate::util::hash::hash_bytes;

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("working directory {path} is not usable: {source}")]
  WorkingDirectory {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("invalid git reference '{reference}': {source}")]
  Reference {
    reference: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to check out '{url}': {source}")]
  Checkout {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),

  #[error("failed to fetch source archive: {0}")]
  Archive(#[from] ExecuteError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// The project root the build runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedSource {
  pub root: PathBuf,
  /// Commit id for git sources, archive digest for archives.
  pub revision: Option<String>,
}

impl SourceError {
  /// Network failures are worth another attempt; bad references and
  /// digest mismatches are not.
  fn is_retryable(&self) -> bool {
    matches!(
      self,
      SourceError::Clone { .. }
        | SourceError::Archive(ExecuteError::FetchFailed { .. } | ExecuteError::ChecksumUnavailable { .. })
    )
  }
}

/// Resolve the project root, fetching the source into `work_dir` if one is configured.
pub async fn locate_source(
  cwd: &Path,
  source: Option<&SourceSpec>,
  work_dir: &Path,
  retry: &RetryPolicy,
) -> Result<LocatedSource, SourceError> {
  let Some(spec) = source else {
    let root = dunce::canonicalize(cwd).map_err(|source| SourceError::WorkingDirectory {
      path: cwd.to_path_buf(),
      source,
    })?;
    debug!(root = %root.display(), "using working directory as project root");
    return Ok(LocatedSource { root, revision: None });
  };

  let mut attempt = 1;
  loop {
    match fetch_source(spec, work_dir).await {
      Err(err) if err.is_retryable() && attempt < retry.attempts => {
        let delay = retry.delay(attempt);
        warn!(attempt, delay = %humantime::format_duration(delay), error = %err, "retrying source fetch");
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      result => return result,
    }
  }
}

async fn fetch_source(spec: &SourceSpec, work_dir: &Path) -> Result<LocatedSource, SourceError> {
  match spec {
    SourceSpec::Git { url, reference } => {
      let key = format!("{}#{}", url, reference.as_deref().unwrap_or("HEAD"));
      let parent = work_dir.join("git");
      let dest = parent.join(&hash_bytes(key.as_bytes()).0[..16]);
      remove_if_exists(&dest).await?;
      tokio::fs::create_dir_all(&parent).await?;

      info!(url = %url, reference = reference.as_deref().unwrap_or("HEAD"), dest = %dest.display(), "cloning source");
      let url = url.clone();
      let reference = reference.clone();
      let clone_dest = dest.clone();
      let revision = tokio::task::spawn_blocking(move || clone_git(&url, reference.as_deref(), &clone_dest))
        .await
        .map_err(std::io::Error::other)??;

      info!(revision = %revision, "source checked out");
      Ok(LocatedSource {
        root: dest,
        revision: Some(revision),
      })
    }
    SourceSpec::Archive { url, sha256 } => {
      let fetched = execute_fetch(url, &Integrity::Sha256(sha256.clone()), &work_dir.join("downloads")).await?;
      let dest = work_dir.join("archive").join(&sha256[..16]);
      remove_if_exists(&dest).await?;
      unpack_archive(&fetched.path, &dest, 1)?;

      info!(url = %url, root = %dest.display(), "source archive unpacked");
      Ok(LocatedSource {
        root: dest,
        revision: Some(fetched.sha256),
      })
    }
  }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
  if tokio::fs::try_exists(path).await? {
    tokio::fs::remove_dir_all(path).await?;
  }
  Ok(())
}

/// Clone `url` into `dest`, checking out `reference` (a branch or tag) or the
/// remote's default branch. Returns the checked-out commit id.
fn clone_git(url: &str, reference: Option<&str>, dest: &Path) -> Result<String, SourceError> {
  let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| SourceError::Clone {
    url: url.to_string(),
    source: e,
  };

  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| clone_err(Box::new(e)))?;
  if let Some(reference) = reference {
    prepared = prepared
      .with_ref_name(Some(reference))
      .map_err(|e| SourceError::Reference {
        reference: reference.to_string(),
        source: Box::new(e),
      })?;
  }

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| match e {
      gix::clone::fetch::Error::RefNameMissing { .. } => SourceError::Reference {
        reference: reference.unwrap_or("HEAD").to_string(),
        source: Box::new(e),
      },
      e => clone_err(Box::new(e)),
    })?;

  let (repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| SourceError::Checkout {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  let mut head = repo.head().map_err(|e| SourceError::ResolveHead(e.to_string()))?;
  let commit = head
    .peel_to_commit()
    .map_err(|e| SourceError::ResolveHead(e.to_string()))?;

  Ok(commit.id.to_string())
}
