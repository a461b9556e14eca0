//! Provisioning plans.
//!
//! A [`ProvisionPlan`] is the manifest compiled into the exact, ordered list of
//! steps that provisioning will run. Compiling is pure: it can be printed,
//! diffed and tested without touching the system.
//!
//! Phases always run in the order refresh, prerequisites, compilers,
//! toolchains. Empty phases produce no step.

mod dag;
pub mod package_manager;

pub use dag::order_toolchains;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::manifest::{Exports, Integrity, ManifestError, PackagePhase, Phase, Pin, ToolEntry, ToolchainSpec};
use crate::util::hash::{HashError, Hashable, ObjectHash};

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
  /// Run a shell command (package metadata refresh).
  Run { cmd: String },
  /// Install a batch of pinned packages.
  InstallPackages { cmd: String, packages: Vec<String> },
  /// Fetch, verify and install a toolchain archive.
  InstallArchive {
    tool: String,
    pin: Pin,
    url: String,
    integrity: Integrity,
    install_root: PathBuf,
    install: Option<String>,
  },
}

/// A single provisioning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
  /// Stable, human-readable identifier (`refresh`, `packages:compilers`, `toolchain:rust`).
  pub id: String,
  pub phase: Phase,
  pub action: StepAction,
  /// Environment this step makes available to every later step.
  pub exports: Exports,
}

impl Hashable for Step {}

impl Step {
  /// Content hash identifying this exact step, used for idempotence stamps.
  pub fn hash(&self) -> Result<ObjectHash, HashError> {
    self.compute_hash()
  }

  /// Short description for plan output.
  pub fn describe(&self) -> String {
    match &self.action {
      StepAction::Run { cmd } => cmd.clone(),
      StepAction::InstallPackages { cmd, .. } => cmd.clone(),
      StepAction::InstallArchive {
        tool,
        pin,
        url,
        install_root,
        ..
      } => format!("{} ({}) from {} into {}", tool, pin, url, install_root.display()),
    }
  }
}

/// The ordered steps derived from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionPlan {
  pub steps: Vec<Step>,
  /// Tools pinned to a floating channel. Reproducible in identity, not in behavior.
  pub floating: Vec<ToolEntry>,
}

impl Hashable for ProvisionPlan {}

impl ProvisionPlan {
  /// Compile a validated manifest into a plan.
  pub fn compile(spec: &ToolchainSpec) -> Result<Self, ManifestError> {
    let mut steps = Vec::new();
    let pm = &spec.package_manager;

    steps.push(Step {
      id: Phase::Refresh.as_str().to_string(),
      phase: Phase::Refresh,
      action: StepAction::Run {
        cmd: package_manager::refresh_command(pm),
      },
      exports: Exports::default(),
    });

    for phase in [PackagePhase::Prerequisites, PackagePhase::Compilers] {
      let packages: Vec<_> = spec.packages.iter().filter(|p| p.phase == phase).collect();
      if packages.is_empty() {
        continue;
      }

      let mut exports = Exports::default();
      for package in &packages {
        exports.extend(&package.exports());
      }

      let phase = Phase::from(phase);
      steps.push(Step {
        id: format!("packages:{}", phase),
        phase,
        action: StepAction::InstallPackages {
          cmd: package_manager::install_command(pm, &packages),
          packages: packages
            .iter()
            .map(|p| package_manager::pinned_name(pm.kind, p))
            .collect(),
        },
        exports,
      });
    }

    for toolchain in order_toolchains(&spec.toolchains)? {
      steps.push(Step {
        id: format!("toolchain:{}", toolchain.name),
        phase: Phase::Toolchains,
        action: StepAction::InstallArchive {
          tool: toolchain.name.clone(),
          pin: toolchain.pin()?,
          url: toolchain.url.clone(),
          integrity: toolchain.integrity()?,
          install_root: toolchain.install_root.clone(),
          install: toolchain.install.clone(),
        },
        exports: toolchain.exports(),
      });
    }

    Ok(Self {
      steps,
      floating: spec.floating_tools(),
    })
  }

  /// Steps belonging to `phase`, in order.
  pub fn phase_steps(&self, phase: Phase) -> impl Iterator<Item = &Step> {
    self.steps.iter().filter(move |s| s.phase == phase)
  }

  /// The phases that have at least one step, in order.
  pub fn phases(&self) -> Vec<Phase> {
    Phase::ALL
      .into_iter()
      .filter(|phase| self.steps.iter().any(|s| s.phase == *phase))
      .collect()
  }

  /// Environment accumulated by all steps strictly before index `index`.
  pub fn exports_before(&self, index: usize) -> Exports {
    let mut exports = Exports::default();
    for step in self.steps.iter().take(index) {
      exports.extend(&step.exports);
    }
    exports
  }

  /// Environment accumulated by the whole plan.
  pub fn exports(&self) -> Exports {
    self.exports_before(self.steps.len())
  }
}
