//! Enforcing a [`DependencyManifest`] on the Python environment.
//!
//! The environment may hold a stale GPU backend from a previous build. The
//! sync plan always removes conflicting distributions before installing the
//! pinned ones; installing on top and hoping the old module is shadowed is
//! exactly what produces library version conflicts at load time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::consts::ONNXRUNTIME_VERSION;
use crate::exec::{CommandRunner, CommandSpec};
use crate::freeze::BuildError;
use crate::platform::{Os, Platform};
use crate::variant::{DependencyManifest, Requirement};

/// Installs and removes Python distributions in the environment of the
/// project at `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
  Uv { uv: PathBuf, root: PathBuf },
  Pip { python: PathBuf, root: PathBuf },
}

impl PackageManager {
  pub fn root(&self) -> &Path {
    match self {
      Self::Uv { root, .. } | Self::Pip { root, .. } => root,
    }
  }

  fn base(&self) -> CommandSpec {
    let spec = match self {
      Self::Uv { uv, .. } => CommandSpec::new(uv.to_string_lossy()).arg("pip"),
      Self::Pip { python, .. } => CommandSpec::new(python.to_string_lossy()).args(["-m", "pip"]),
    };
    spec.cwd(self.root())
  }

  pub fn list(&self) -> CommandSpec {
    self.base().args(["list", "--format=json"])
  }

  pub fn uninstall(&self, names: &[String]) -> CommandSpec {
    let spec = self.base().arg("uninstall");
    let spec = match self {
      Self::Uv { .. } => spec,
      Self::Pip { .. } => spec.arg("-y"),
    };
    spec.args(names.iter().cloned()).inherit_output()
  }

  pub fn install(&self, requirements: &[Requirement]) -> CommandSpec {
    self
      .base()
      .arg("install")
      .args(requirements.iter().map(Requirement::specifier))
      .inherit_output()
  }
}

/// Normalize a distribution name the way package indexes compare them:
/// lowercase, with runs of `-`, `_` and `.` collapsed to `-`.
pub fn normalize_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut last_sep = false;
  for c in name.chars() {
    if matches!(c, '-' | '_' | '.') {
      if !last_sep {
        out.push('-');
      }
      last_sep = true;
    } else {
      out.push(c.to_ascii_lowercase());
      last_sep = false;
    }
  }
  out
}

#[derive(Debug, Deserialize)]
struct ListedPackage {
  name: String,
  version: String,
}

/// Installed distributions keyed by normalized name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledPackages(BTreeMap<String, String>);

impl InstalledPackages {
  /// Parse the JSON produced by `pip list --format=json`.
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    let listed: Vec<ListedPackage> = serde_json::from_str(json)?;
    Ok(Self(
      listed
        .into_iter()
        .map(|p| (normalize_name(&p.name), p.version))
        .collect(),
    ))
  }

  pub fn version(&self, name: &str) -> Option<&str> {
    self.0.get(&normalize_name(name)).map(String::as_str)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.version(name).is_some()
  }

  /// The first installed ONNX Runtime flavour, if any.
  pub fn runtime(&self) -> Option<(&str, &str)> {
    self
      .0
      .iter()
      .find(|(name, _)| name.starts_with("onnxruntime"))
      .map(|(name, version)| (name.as_str(), version.as_str()))
  }
}

pub async fn installed_packages<R: CommandRunner>(
  runner: &R,
  manager: &PackageManager,
) -> Result<InstalledPackages, BuildError> {
  let spec = manager.list();
  let output = runner.run(&spec).await?;
  if !output.success() {
    return Err(BuildError::command_failed(&spec, &output));
  }
  InstalledPackages::from_json(&output.stdout).map_err(|e| BuildError::PackageList(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOp {
  Remove(Vec<String>),
  Install(Vec<Requirement>),
}

/// Ordered operations that bring the environment in line with a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
  pub ops: Vec<PackageOp>,
}

impl SyncPlan {
  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }
}

/// Compute the operations needed to satisfy `manifest`.
///
/// All removals come first and only name distributions that are actually
/// installed. A requirement is skipped when its pinned version is already
/// present, unless it carries extras (those can't be verified from a
/// package listing and are always reinstalled).
pub fn plan_sync(installed: &InstalledPackages, manifest: &DependencyManifest) -> SyncPlan {
  let remove: Vec<String> = manifest
    .remove
    .iter()
    .filter(|name| installed.contains(name))
    .cloned()
    .collect();

  let install: Vec<Requirement> = manifest
    .packages
    .iter()
    .filter(|req| {
      let satisfied = req.extras.is_empty() && installed.version(&req.name) == Some(req.version.as_str());
      !satisfied || remove.iter().any(|r| normalize_name(r) == normalize_name(&req.name))
    })
    .cloned()
    .collect();

  let mut ops = Vec::new();
  if !remove.is_empty() {
    ops.push(PackageOp::Remove(remove));
  }
  if !install.is_empty() {
    ops.push(PackageOp::Install(install));
  }
  SyncPlan { ops }
}

/// Execute a sync plan, stopping at the first failure.
pub async fn apply_sync<R: CommandRunner>(
  runner: &R,
  manager: &PackageManager,
  plan: &SyncPlan,
) -> Result<(), BuildError> {
  for op in &plan.ops {
    let spec = match op {
      PackageOp::Remove(names) => {
        info!(packages = ?names, "removing conflicting backend packages");
        manager.uninstall(names)
      }
      PackageOp::Install(reqs) => {
        let specs: Vec<String> = reqs.iter().map(Requirement::specifier).collect();
        info!(packages = ?specs, "installing backend packages");
        manager.install(reqs)
      }
    };

    let output = runner.run(&spec).await?;
    if !output.success() {
      return Err(BuildError::command_failed(&spec, &output));
    }
  }
  Ok(())
}

/// Run `uv sync --all-groups` so the locked project dependencies are in
/// place before the backend recipe is enforced. Only meaningful with uv and
/// a `pyproject.toml`; failures are reported and tolerated.
pub async fn sync_project<R: CommandRunner>(runner: &R, manager: &PackageManager) {
  let PackageManager::Uv { uv, root: project_root } = manager else {
    return;
  };
  if !project_root.join("pyproject.toml").exists() {
    warn!("pyproject.toml not found, skipping project sync");
    return;
  }

  let spec = CommandSpec::new(uv.to_string_lossy())
    .args(["sync", "--all-groups"])
    .cwd(project_root)
    .inherit_output();
  match runner.run(&spec).await {
    Ok(output) if output.success() => info!("project dependencies synced"),
    Ok(output) => warn!(code = ?output.code, "project sync failed, continuing with the current environment"),
    Err(e) => warn!(error = %e, "project sync failed, continuing with the current environment"),
  }
}

/// Advisory notes on the installed ONNX Runtime flavour for `platform`.
///
/// Never blocks a build; the recipe enforcement is what guarantees the
/// right backend.
pub fn backend_report(installed: &InstalledPackages, platform: &Platform) -> Vec<String> {
  let mut notes = Vec::new();
  let Some((name, version)) = installed.runtime() else {
    notes.push("ONNX Runtime is not installed; AI features will be unavailable".to_string());
    return notes;
  };

  if version != ONNXRUNTIME_VERSION {
    notes.push(format!(
      "{} {} is installed, {} is the tested version",
      name, version, ONNXRUNTIME_VERSION
    ));
  }

  let unsupported = match (platform.os, name) {
    (Os::MacOs, "onnxruntime-gpu") => Some("CUDA is not available on macOS"),
    (Os::MacOs | Os::Linux, "onnxruntime-directml") => Some("DirectML is Windows only"),
    (_, "onnxruntime-silicon") => Some("onnxruntime-silicon is deprecated, the stock runtime ships CoreML"),
    _ => None,
  };
  if let Some(reason) = unsupported {
    notes.push(format!("{} on {}: {}", name, platform.release_name(), reason));
  }

  notes
}
