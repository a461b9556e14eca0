//! Uploading release artifacts.
//!
//! Each file is sent with `PUT <url>/<version>/<file>` and a bearer token.
//! Connection errors, 5xx and 429 are retried with exponential backoff;
//! any other client error fails at once, since repeating the same request
//! cannot fix it.

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, warn};

use crate::driver::config::{PublishConfig, RetryPolicy};

#[derive(Debug, Error)]
pub enum PublishError {
  #[error("publish token variable {0} is not set")]
  MissingToken(String),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("upload to {url} rejected with HTTP {status}: {body}")]
  Rejected { url: String, status: u16, body: String },

  #[error("upload to {url} failed after {attempts} attempts: {last}")]
  Exhausted { url: String, attempts: u32, last: String },
}

/// Read the bearer token from the variable named in the config.
pub fn read_token(publish: &PublishConfig) -> Result<String, PublishError> {
  std::env::var(&publish.token_env)
    .ok()
    .filter(|t| !t.trim().is_empty())
    .ok_or_else(|| PublishError::MissingToken(publish.token_env.clone()))
}

/// Upload every file in `files`. Returns the URLs written, in order.
pub async fn publish_files(
  publish: &PublishConfig,
  token: &str,
  version: &str,
  files: &[PathBuf],
) -> Result<Vec<String>, PublishError> {
  let client = reqwest::Client::new();
  let mut urls = Vec::with_capacity(files.len());

  for path in files {
    let url = artifact_url(&publish.url, version, path);
    let body = tokio::fs::read(path).await.map_err(|source| PublishError::Read {
      path: path.clone(),
      source,
    })?;

    put_with_retry(&client, &url, token, body, &publish.retry).await?;
    info!(url = %url, "published");
    urls.push(url);
  }

  Ok(urls)
}

fn artifact_url(base: &str, version: &str, path: &Path) -> String {
  let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
  format!("{}/{}/{}", base.trim_end_matches('/'), version, name)
}

fn is_retryable(status: StatusCode) -> bool {
  status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

async fn put_with_retry(
  client: &reqwest::Client,
  url: &str,
  token: &str,
  body: Vec<u8>,
  retry: &RetryPolicy,
) -> Result<(), PublishError> {
  let mut last = String::new();

  for attempt in 1..=retry.attempts {
    if attempt > 1 {
      let delay = retry.delay(attempt - 1);
      warn!(url = %url, attempt, delay = %humantime::format_duration(delay), error = %last, "retrying upload");
      tokio::time::sleep(delay).await;
    }

    match client.put(url).bearer_auth(token).body(body.clone()).send().await {
      Ok(response) if response.status().is_success() => return Ok(()),
      Ok(response) if is_retryable(response.status()) => {
        last = format!("HTTP {}", response.status());
      }
      Ok(response) => {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(PublishError::Rejected {
          url: url.to_string(),
          status,
          body: body.trim().to_string(),
        });
      }
      Err(err) => {
        last = err.to_string();
      }
    }
  }

  Err(PublishError::Exhausted {
    url: url.to_string(),
    attempts: retry.attempts,
    last,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::time::Duration;
  use tempfile::TempDir;

  fn config(url: &str, attempts: u32) -> PublishConfig {
    PublishConfig {
      url: url.to_string(),
      token_env: "KILN_TEST_TOKEN".to_string(),
      retry: RetryPolicy {
        attempts,
        backoff: Duration::from_millis(1),
      },
    }
  }

  fn artifact(temp: &TempDir) -> PathBuf {
    let path = temp.path().join("tikv-5.0.1-x86_64-unknown-linux-gnu.tar.gz");
    std::fs::write(&path, b"archive").unwrap();
    path
  }

  #[tokio::test]
  async fn uploads_with_bearer_token() {
    let temp = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("PUT", "/releases/5.0.1/tikv-5.0.1-x86_64-unknown-linux-gnu.tar.gz")
      .match_header("authorization", "Bearer s3cret")
      .match_body("archive")
      .with_status(201)
      .expect(1)
      .create_async()
      .await;

    let urls = publish_files(
      &config(&format!("{}/releases", server.url()), 3),
      "s3cret",
      "5.0.1",
      &[artifact(&temp)],
    )
    .await
    .unwrap();

    mock.assert_async().await;
    assert_eq!(
      urls,
      [format!(
        "{}/releases/5.0.1/tikv-5.0.1-x86_64-unknown-linux-gnu.tar.gz",
        server.url()
      )]
    );
  }

  #[tokio::test]
  async fn server_errors_are_retried_until_exhausted() {
    let temp = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("PUT", mockito::Matcher::Any)
      .with_status(503)
      .expect(3)
      .create_async()
      .await;

    let err = publish_files(&config(&server.url(), 3), "t", "5.0.1", &[artifact(&temp)])
      .await
      .unwrap_err();

    mock.assert_async().await;
    match err {
      PublishError::Exhausted { attempts, last, .. } => {
        assert_eq!(attempts, 3);
        assert!(last.contains("503"));
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[tokio::test]
  async fn too_many_requests_is_retried() {
    let temp = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("PUT", mockito::Matcher::Any)
      .with_status(429)
      .expect(2)
      .create_async()
      .await;

    let err = publish_files(&config(&server.url(), 2), "t", "5.0.1", &[artifact(&temp)])
      .await
      .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, PublishError::Exhausted { attempts: 2, .. }));
  }

  #[tokio::test]
  async fn client_errors_fail_immediately() {
    let temp = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("PUT", mockito::Matcher::Any)
      .with_status(403)
      .with_body("token expired")
      .expect(1)
      .create_async()
      .await;

    let err = publish_files(&config(&server.url(), 5), "t", "5.0.1", &[artifact(&temp)])
      .await
      .unwrap_err();

    mock.assert_async().await;
    match err {
      PublishError::Rejected { status, body, .. } => {
        assert_eq!(status, 403);
        assert_eq!(body, "token expired");
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[tokio::test]
  async fn connection_errors_are_retried() {
    let temp = TempDir::new().unwrap();
    // Nothing listens on port 1.
    let err = publish_files(&config("http://127.0.0.1:1", 2), "t", "5.0.1", &[artifact(&temp)])
      .await
      .unwrap_err();
    assert!(matches!(err, PublishError::Exhausted { attempts: 2, .. }));
  }

  #[test]
  #[serial]
  fn token_is_read_from_named_variable() {
    let publish = config("https://x", 1);
    temp_env::with_var("KILN_TEST_TOKEN", Some("abc"), || {
      assert_eq!(read_token(&publish).unwrap(), "abc");
    });
    temp_env::with_var("KILN_TEST_TOKEN", None::<&str>, || {
      assert!(matches!(read_token(&publish), Err(PublishError::MissingToken(_))));
    });
  }
}
