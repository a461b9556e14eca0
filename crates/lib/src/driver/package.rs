//! Deterministic release archives.
//!
//! Two runs over the same binaries produce byte-identical archives: entries
//! are sorted, timestamps are `SOURCE_DATE_EPOCH`, ownership is root and
//! modes are fixed (0755 for binaries, 0644 for everything else).

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::GzBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::util::hash::hash_file;

pub const CHECKSUMS_FILENAME: &str = "SHA256SUMS";
pub const RELEASE_MANIFEST_FILENAME: &str = "release.json";

/// One packaged archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub target: String,
  /// File name inside the output directory.
  pub file: String,
  pub sha256: String,
  pub size: u64,
}

/// An entry to put in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
  /// Path inside the archive, below the top-level directory.
  pub name: String,
  pub source: PathBuf,
  pub mode: u32,
}

impl ArchiveEntry {
  pub fn binary(source: &Path) -> io::Result<Self> {
    Ok(Self {
      name: file_name(source)?,
      source: source.to_path_buf(),
      mode: 0o755,
    })
  }

  /// A non-executable file, placed at `relative` below the archive root.
  pub fn file(root: &Path, relative: &Path) -> Self {
    Self {
      name: relative.to_string_lossy().replace('\\', "/"),
      source: root.join(relative),
      mode: 0o644,
    }
  }
}

fn file_name(path: &Path) -> io::Result<String> {
  path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no file name in {}", path.display())))
}

/// `<name>-<version>-<target>`, the archive's stem and top-level directory.
pub fn archive_stem(name: &str, version: &str, target: &str) -> String {
  format!("{}-{}-{}", name, version, target)
}

/// Write `<output_dir>/<stem>.tar.gz` containing `entries` under `<stem>/`.
pub fn write_archive(
  output_dir: &Path,
  stem: &str,
  target: &str,
  entries: &[ArchiveEntry],
  mtime: u64,
) -> io::Result<Artifact> {
  fs::create_dir_all(output_dir)?;
  let file = format!("{}.tar.gz", stem);
  let path = output_dir.join(&file);

  let mut entries: Vec<&ArchiveEntry> = entries.iter().collect();
  entries.sort_by(|a, b| a.name.cmp(&b.name));

  let encoder = GzBuilder::new()
    .mtime(0)
    .write(BufWriter::new(File::create(&path)?), Compression::best());
  let mut builder = tar::Builder::new(encoder);

  for entry in entries {
    let data = fs::read(&entry.source)?;
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(entry.mode);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    builder.append_data(&mut header, format!("{}/{}", stem, entry.name), data.as_slice())?;
  }

  let mut writer = builder.into_inner()?.finish()?;
  writer.flush()?;
  drop(writer);

  let artifact = Artifact {
    target: target.to_string(),
    sha256: hash_file(&path)?.0,
    size: fs::metadata(&path)?.len(),
    file,
  };
  info!(file = %artifact.file, sha256 = %artifact.sha256, "packaged");
  Ok(artifact)
}

/// Write `SHA256SUMS` in the format `sha256sum -c` accepts.
pub fn write_checksums(output_dir: &Path, artifacts: &[Artifact]) -> io::Result<PathBuf> {
  let mut sorted: Vec<&Artifact> = artifacts.iter().collect();
  sorted.sort_by(|a, b| a.file.cmp(&b.file));

  let body: String = sorted.iter().map(|a| format!("{}  {}\n", a.sha256, a.file)).collect();
  let path = output_dir.join(CHECKSUMS_FILENAME);
  fs::write(&path, body)?;
  Ok(path)
}

/// Write `value` as pretty JSON to `release.json`.
pub fn write_release_manifest<T: Serialize>(output_dir: &Path, value: &T) -> io::Result<PathBuf> {
  let path = output_dir.join(RELEASE_MANIFEST_FILENAME);
  let mut content = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
  content.push('\n');
  fs::write(&path, content)?;
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use flate2::read::GzDecoder;
  use tempfile::TempDir;

  fn fixture(temp: &TempDir) -> Vec<ArchiveEntry> {
    let root = temp.path().join("src");
    fs::create_dir_all(root.join("target")).unwrap();
    fs::write(root.join("target/tikv-server"), b"\x7fELF server").unwrap();
    fs::write(root.join("target/tikv-ctl"), b"\x7fELF ctl").unwrap();
    fs::write(root.join("LICENSE"), "Apache-2.0").unwrap();

    vec![
      ArchiveEntry::binary(&root.join("target/tikv-server")).unwrap(),
      ArchiveEntry::binary(&root.join("target/tikv-ctl")).unwrap(),
      ArchiveEntry::file(&root, Path::new("LICENSE")),
    ]
  }

  #[test]
  fn archives_are_byte_identical_across_runs() {
    let temp = TempDir::new().unwrap();
    let entries = fixture(&temp);

    let stem = "tikv-5.0.1-x86_64-unknown-linux-gnu";
    let target = "x86_64-unknown-linux-gnu";

    let a = write_archive(&temp.path().join("a"), stem, target, &entries, 1_600_000_000).unwrap();
    let mut reversed = entries.clone();
    reversed.reverse();
    let b = write_archive(&temp.path().join("b"), stem, target, &reversed, 1_600_000_000).unwrap();

    assert_eq!(a, b);
    assert_eq!(
      fs::read(temp.path().join("a").join(&a.file)).unwrap(),
      fs::read(temp.path().join("b").join(&b.file)).unwrap()
    );
  }

  #[test]
  fn entries_have_fixed_metadata() {
    let temp = TempDir::new().unwrap();
    let entries = fixture(&temp);
    let artifact = write_archive(temp.path(), "tikv-5.0.1-t", "t", &entries, 42).unwrap();

    let file = File::open(temp.path().join(&artifact.file)).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut seen = Vec::new();
    for entry in archive.entries().unwrap() {
      let entry = entry.unwrap();
      let header = entry.header();
      seen.push((
        entry.path().unwrap().display().to_string(),
        header.mode().unwrap(),
        header.mtime().unwrap(),
        header.uid().unwrap(),
      ));
    }

    assert_eq!(
      seen,
      [
        ("tikv-5.0.1-t/LICENSE".to_string(), 0o644, 42, 0),
        ("tikv-5.0.1-t/tikv-ctl".to_string(), 0o755, 42, 0),
        ("tikv-5.0.1-t/tikv-server".to_string(), 0o755, 42, 0),
      ]
    );
  }

  #[test]
  fn checksums_are_sorted_sha256sum_lines() {
    let temp = TempDir::new().unwrap();
    let artifacts = [
      Artifact {
        target: "b".to_string(),
        file: "x-b.tar.gz".to_string(),
        sha256: "2".repeat(64),
        size: 1,
      },
      Artifact {
        target: "a".to_string(),
        file: "x-a.tar.gz".to_string(),
        sha256: "1".repeat(64),
        size: 1,
      },
    ];
    let path = write_checksums(temp.path(), &artifacts).unwrap();
    assert_eq!(
      fs::read_to_string(path).unwrap(),
      format!("{}  x-a.tar.gz\n{}  x-b.tar.gz\n", "1".repeat(64), "2".repeat(64))
    );
  }
}
