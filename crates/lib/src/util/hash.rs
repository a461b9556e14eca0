//! Hashing utilities for step identity and artifact verification.
//!
//! This module provides:
//! - `ObjectHash`: A truncated 20-character hash identifying plan steps
//! - `ContentHash`: A full 64-character hash for content verification
//! - `hash_file()` / `hash_bytes()`: Single file and byte hashing
//! - `parse_checksum()`: Parsing of published `*.sha256` checksum files

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A content-addressed hash identifying a unique object.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized struct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character SHA256 hash (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Returns true if `value` looks like a SHA-256 digest in lowercase hex.
pub fn is_sha256_hex(value: &str) -> bool {
  value.len() == 64 && value.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Extract the digest from a checksum file body.
///
/// Accepts both a bare digest and the `sha256sum` format (`<digest>  <file>`).
/// Uppercase digests are normalized to lowercase.
pub fn parse_checksum(body: &str) -> Option<String> {
  let digest = body.split_whitespace().next()?.to_ascii_lowercase();
  is_sha256_hex(&digest).then_some(digest)
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[derive(Serialize)]
  struct Sample {
    name: &'static str,
  }

  impl Hashable for Sample {}

  #[test]
  fn object_hash_is_truncated_and_stable() {
    let a = Sample { name: "rust" }.compute_hash().unwrap();
    let b = Sample { name: "rust" }.compute_hash().unwrap();
    let c = Sample { name: "gcc" }.compute_hash().unwrap();
    assert_eq!(a.0.len(), OBJ_HASH_PREFIX_LEN);
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn hash_bytes_known_value() {
    assert_eq!(
      hash_bytes(b"hello").0,
      "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
  }

  #[test]
  fn parse_checksum_formats() {
    let digest = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    assert_eq!(parse_checksum(digest).as_deref(), Some(digest));
    assert_eq!(
      parse_checksum(&format!("{}  rust-nightly.tar.gz\n", digest)).as_deref(),
      Some(digest)
    );
    assert_eq!(parse_checksum(&digest.to_uppercase()).as_deref(), Some(digest));
    assert_eq!(parse_checksum("not-a-digest"), None);
    assert_eq!(parse_checksum(""), None);
  }

  #[test]
  fn hash_file_matches_hash_bytes() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("f");
    fs::write(&path, "hello").unwrap();
    assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"hello"));
  }
}
