//! Test utilities for kiln-lib.

use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Build a gzipped tarball in memory.
///
/// Every entry is placed under `prefix/` the way upstream release archives are.
/// Entries are `(relative path, contents, mode)`.
pub fn tar_gz(prefix: &str, entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
  let encoder = GzEncoder::new(Vec::new(), Compression::default());
  let mut builder = tar::Builder::new(encoder);

  for (path, contents, mode) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(*mode);
    header.set_mtime(0);
    header.set_cksum();
    builder
      .append_data(&mut header, format!("{}/{}", prefix, path), *contents)
      .unwrap();
  }

  let encoder = builder.into_inner().unwrap();
  encoder.finish().unwrap()
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
  use std::os::unix::fs::PermissionsExt;

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  let mut file = std::fs::File::create(path).unwrap();
  writeln!(file, "#!/bin/sh").unwrap();
  file.write_all(body.as_bytes()).unwrap();
  drop(file);
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
