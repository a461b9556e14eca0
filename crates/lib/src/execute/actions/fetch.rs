//! Checked archive downloads.
//!
//! The expected digest is known before the first byte is downloaded, either
//! pinned in the manifest or read from a published checksum file. The archive
//! is hashed while it streams to a partial file and only renamed into place
//! once the digest matches, so nothing unverified is ever unpacked or run.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::execute::types::ExecuteError;
use crate::manifest::Integrity;
use crate::util::hash::{hash_file, parse_checksum};

/// A verified download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
  pub path: PathBuf,
  pub sha256: String,
}

/// Resolve the digest an archive must match.
pub async fn resolve_digest(client: &reqwest::Client, integrity: &Integrity) -> Result<String, ExecuteError> {
  match integrity {
    Integrity::Sha256(digest) => Ok(digest.clone()),
    Integrity::ChecksumUrl(url) => {
      debug!(url = %url, "fetching published checksum");
      let unavailable = |message: String| ExecuteError::ChecksumUnavailable {
        url: url.clone(),
        message,
      };

      let response = client.get(url).send().await.map_err(|e| unavailable(e.to_string()))?;
      if !response.status().is_success() {
        return Err(unavailable(format!("HTTP {}", response.status())));
      }
      let body = response.text().await.map_err(|e| unavailable(e.to_string()))?;
      parse_checksum(&body).ok_or_else(|| unavailable("no SHA-256 digest in response".to_string()))
    }
  }
}

/// Download `url` into `downloads_dir` and verify it against `integrity`.
///
/// A cached file whose digest still matches is reused without touching the network
/// (beyond resolving a checksum URL).
pub async fn execute_fetch(
  url: &str,
  integrity: &Integrity,
  downloads_dir: &Path,
) -> Result<FetchedArchive, ExecuteError> {
  let client = reqwest::Client::new();
  let expected = resolve_digest(&client, integrity).await?;

  fs::create_dir_all(downloads_dir).await?;
  let dest_path = downloads_dir.join(format!("{}-{}", &expected[..16], url_to_filename(url)));

  if dest_path.exists() {
    debug!(path = %dest_path.display(), "checking cached download");
    let cached = dest_path.clone();
    if let Ok(Ok(actual)) = tokio::task::spawn_blocking(move || hash_file(&cached)).await {
      if actual.0 == expected {
        info!(path = %dest_path.display(), "using cached download");
        return Ok(FetchedArchive {
          path: dest_path,
          sha256: expected,
        });
      }
      debug!(expected = %expected, actual = %actual, "cached download hash mismatch, re-downloading");
    }
  }

  info!(url = %url, "fetching archive");
  let failed = |message: String| ExecuteError::FetchFailed {
    url: url.to_string(),
    message,
  };

  let mut response = client.get(url).send().await.map_err(|e| failed(e.to_string()))?;
  if !response.status().is_success() {
    return Err(failed(format!("HTTP {}", response.status())));
  }

  let partial_path = dest_path.with_extension("partial");
  let mut file = fs::File::create(&partial_path).await?;
  let mut hasher = Sha256::new();
  let mut size = 0u64;

  while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
    hasher.update(&chunk);
    file.write_all(&chunk).await?;
    size += chunk.len() as u64;
  }
  file.flush().await?;
  drop(file);

  let actual = hex::encode(hasher.finalize());
  if actual != expected {
    fs::remove_file(&partial_path).await?;
    return Err(ExecuteError::HashMismatch {
      url: url.to_string(),
      expected,
      actual,
    });
  }

  fs::rename(&partial_path, &dest_path).await?;
  info!(path = %dest_path.display(), size, "download verified");

  Ok(FetchedArchive {
    path: dest_path,
    sha256: expected,
  })
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of the
/// URL if no suitable filename can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}
