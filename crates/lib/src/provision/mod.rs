//! Applying a provisioning plan.
//!
//! Steps run strictly one after another, each with the environment exported
//! by the steps before it. The first failure aborts the run and is returned
//! unchanged; nothing is retried and nothing after the failing step runs.
//!
//! Completed steps leave a stamp keyed by their content hash, so re-running a
//! phase (a cached image layer being rebuilt, an interrupted build) skips work
//! that is already done.

mod lock;
mod stamp;

pub use lock::{LockError, LockMetadata, StateLock};
pub use stamp::{Stamp, StampStore};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::execute::{ExecuteConfig, ExecuteError, copy_tree, execute_cmd, execute_fetch, unpack_archive};
use crate::manifest::{Exports, Phase};
use crate::plan::{ProvisionPlan, Step, StepAction};
use crate::platform::paths::state_dir;
use crate::util::hash::HashError;

/// Variable naming the install root while a toolchain installer runs.
pub const INSTALL_ROOT_VAR: &str = "KILN_INSTALL_ROOT";

#[derive(Debug, Error)]
pub enum ProvisionError {
  #[error(transparent)]
  Lock(#[from] LockError),

  #[error("step {step} failed: {source}")]
  StepFailed {
    step: String,
    #[source]
    source: ExecuteError,
  },

  #[error("failed to record completion of {step}: {source}")]
  Stamp {
    step: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to hash step: {0}")]
  Hash(#[from] HashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Options for a provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
  /// Only run steps of this phase. `None` runs the whole plan.
  pub phase: Option<Phase>,
  /// Ignore stamps and run every selected step again.
  pub force: bool,
  pub state_dir: PathBuf,
  pub execute: ExecuteConfig,
}

impl Default for ProvisionOptions {
  fn default() -> Self {
    Self {
      phase: None,
      force: false,
      state_dir: state_dir(),
      execute: ExecuteConfig::default(),
    }
  }
}

/// What a provisioning run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionResult {
  /// Step ids that ran, in order.
  pub completed: Vec<String>,
  /// Step ids skipped because a stamp for their exact content exists.
  pub skipped: Vec<String>,
}

/// Run `plan` (or one phase of it).
pub async fn provision(plan: &ProvisionPlan, options: &ProvisionOptions) -> Result<ProvisionResult, ProvisionError> {
  let command = match options.phase {
    Some(phase) => format!("provision --phase {}", phase),
    None => "provision".to_string(),
  };
  let _lock = StateLock::acquire(&options.state_dir, &command)?;
  let stamps = StampStore::new(&options.state_dir);

  info!(
    phase = options.phase.map(|p| p.as_str()).unwrap_or("all"),
    steps = plan.steps.len(),
    force = options.force,
    "starting provisioning"
  );

  for tool in &plan.floating {
    warn!(tool = %tool.name, pin = %tool.pin, "provisioning from a floating channel; rebuilds may install a different toolchain");
  }

  let mut result = ProvisionResult::default();

  for (index, step) in plan.steps.iter().enumerate() {
    if options.phase.is_some_and(|phase| phase != step.phase) {
      continue;
    }

    let hash = step.hash()?;
    if !options.force && stamps.contains(&hash) {
      info!(step = %step.id, hash = %hash, "already provisioned, skipping");
      result.skipped.push(step.id.clone());
      continue;
    }

    info!(step = %step.id, phase = %step.phase, "running step");
    let exports = plan.exports_before(index);
    run_step(step, &exports, &options.execute)
      .await
      .map_err(|source| ProvisionError::StepFailed {
        step: step.id.clone(),
        source,
      })?;

    stamps
      .record(&step.id, &hash)
      .map_err(|source| ProvisionError::Stamp {
        step: step.id.clone(),
        source,
      })?;
    result.completed.push(step.id.clone());
  }

  info!(
    completed = result.completed.len(),
    skipped = result.skipped.len(),
    "provisioning complete"
  );
  Ok(result)
}

async fn run_step(step: &Step, exports: &Exports, config: &ExecuteConfig) -> Result<(), ExecuteError> {
  let work = tempfile::Builder::new().prefix("kiln-step-").tempdir()?;
  let tmp_dir = work.path().join("tmp");

  match &step.action {
    StepAction::Run { cmd } | StepAction::InstallPackages { cmd, .. } => {
      execute_cmd(cmd, exports, None, Path::new("/"), &tmp_dir, config).await?;
    }
    StepAction::InstallArchive {
      tool,
      url,
      integrity,
      install_root,
      install,
      ..
    } => {
      let fetched = execute_fetch(url, integrity, &config.downloads_dir).await?;
      let staging = work.path().join(tool);
      unpack_archive(&fetched.path, &staging, 1)?;

      match install {
        Some(install) => {
          let env = BTreeMap::from([(INSTALL_ROOT_VAR.to_string(), install_root.display().to_string())]);
          execute_cmd(install, exports, Some(&env), &staging, &tmp_dir, config).await?;
        }
        None => {
          copy_tree(&staging, install_root)?;
        }
      }
      debug!(tool = %tool, root = %install_root.display(), "toolchain installed");
    }
  }

  Ok(())
}
