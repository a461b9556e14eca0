//! Implementation of the release driver entry point.
//!
//! This is what runs when the container starts: no arguments, configuration
//! from the environment, exit code 0 or 1.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use kiln_lib::driver::{ReleaseConfig, ReleaseInvocation, ReleaseOptions, run_release};

use crate::output::{format_bytes, format_duration, print_stat, print_success, truncate_hash};

pub fn cmd_release(no_publish: bool) -> Result<()> {
  let invocation = ReleaseInvocation::capture().context("Working directory is not accessible")?;
  debug!(cwd = %invocation.cwd.display(), env = ?invocation.env, "release invocation");

  let config = ReleaseConfig::load(&invocation.cwd).context("Invalid release configuration")?;
  let options = ReleaseOptions {
    skip_publish: no_publish,
    ..ReleaseOptions::new(&invocation.cwd)
  };

  let started = Instant::now();
  let rt = super::runtime()?;
  let outcome = rt.block_on(run_release(&config, &options)).context("Release failed")?;

  print_success(&format!(
    "Released {} {} in {}",
    outcome.name,
    outcome.version,
    format_duration(started.elapsed())
  ));
  for artifact in &outcome.artifacts {
    print_stat(
      &artifact.file,
      &format!("{} sha256:{}", format_bytes(artifact.size), truncate_hash(&artifact.sha256)),
    );
  }
  for url in &outcome.published {
    print_stat("Published", url);
  }

  Ok(())
}
