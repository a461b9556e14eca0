//! Package manager command rendering.
//!
//! Every command is non-interactive: an install step must never stop to ask.

use crate::manifest::{PackageManagerKind, PackageManagerSpec, PackageSpec};

/// Placeholder replaced by the space-separated package list.
pub const PACKAGES_PLACEHOLDER: &str = "{packages}";

/// The command refreshing package metadata.
pub fn refresh_command(pm: &PackageManagerSpec) -> String {
  if let Some(refresh) = &pm.refresh {
    return refresh.clone();
  }
  match pm.kind {
    PackageManagerKind::Yum => "yum -y makecache".to_string(),
    PackageManagerKind::Dnf => "dnf -y makecache".to_string(),
    PackageManagerKind::Apt => "apt-get update".to_string(),
    PackageManagerKind::Apk => "apk update".to_string(),
    // Rejected during manifest validation.
    PackageManagerKind::Custom => String::new(),
  }
}

/// The command installing `packages`, each pinned to its declared version.
pub fn install_command(pm: &PackageManagerSpec, packages: &[&PackageSpec]) -> String {
  let template = match (&pm.install, pm.kind) {
    (Some(install), _) => install.as_str(),
    (None, PackageManagerKind::Yum) => "yum -y install {packages}",
    (None, PackageManagerKind::Dnf) => "dnf -y install {packages}",
    (None, PackageManagerKind::Apt) => "apt-get install -y --no-install-recommends {packages}",
    (None, PackageManagerKind::Apk) => "apk add --no-cache {packages}",
    (None, PackageManagerKind::Custom) => PACKAGES_PLACEHOLDER,
  };

  let specs: Vec<String> = packages.iter().map(|p| pinned_name(pm.kind, p)).collect();
  template.replace(PACKAGES_PLACEHOLDER, &specs.join(" "))
}

/// The package spec string understood by the given package manager.
pub fn pinned_name(kind: PackageManagerKind, package: &PackageSpec) -> String {
  match kind {
    PackageManagerKind::Yum | PackageManagerKind::Dnf => format!("{}-{}", package.name, package.version),
    PackageManagerKind::Apt | PackageManagerKind::Apk | PackageManagerKind::Custom => {
      format!("{}={}", package.name, package.version)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::PackagePhase;

  fn pm(kind: PackageManagerKind) -> PackageManagerSpec {
    PackageManagerSpec {
      kind,
      refresh: None,
      install: None,
    }
  }

  fn package(name: &str, version: &str) -> PackageSpec {
    PackageSpec {
      name: name.to_string(),
      version: version.to_string(),
      phase: PackagePhase::Prerequisites,
      provides: vec![],
      path: vec![],
      env: Default::default(),
      check: None,
    }
  }

  #[test]
  fn yum_pins_with_dash() {
    let git = package("git", "1.8.3.1");
    let tar = package("tar", "1.26");
    assert_eq!(
      install_command(&pm(PackageManagerKind::Yum), &[&git, &tar]),
      "yum -y install git-1.8.3.1 tar-1.26"
    );
    assert_eq!(refresh_command(&pm(PackageManagerKind::Yum)), "yum -y makecache");
  }

  #[test]
  fn apt_pins_with_equals() {
    let git = package("git", "1:2.39.2-1");
    assert_eq!(
      install_command(&pm(PackageManagerKind::Apt), &[&git]),
      "apt-get install -y --no-install-recommends git=1:2.39.2-1"
    );
    assert_eq!(refresh_command(&pm(PackageManagerKind::Apt)), "apt-get update");
  }

  #[test]
  fn overrides_replace_defaults() {
    let spec = PackageManagerSpec {
      kind: PackageManagerKind::Yum,
      refresh: Some("yum -y update".to_string()),
      install: Some("yum -y --setopt=tsflags=nodocs install {packages} && yum clean all".to_string()),
    };
    let python = package("python3", "3.6.8");
    assert_eq!(refresh_command(&spec), "yum -y update");
    assert_eq!(
      install_command(&spec, &[&python]),
      "yum -y --setopt=tsflags=nodocs install python3-3.6.8 && yum clean all"
    );
  }
}
