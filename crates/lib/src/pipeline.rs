//! End-to-end build orchestration.
//!
//! A build runs strictly in sequence:
//!
//! 1. Resolve the request into a configuration and dependency manifest
//! 2. Read unset app metadata from the app's config module
//! 3. Preflight the toolchain (patchelf on Linux, compiler on Windows)
//! 4. Sync the Python environment to the manifest
//! 5. Ensure the runtime client bundle is staged in the assets
//! 6. Clean `dist/<mode>`
//! 7. Freeze
//! 8. Package
//!
//! Resolution is pure, so invalid input fails before any process is spawned.
//! The first failing stage aborts the build. A failed freeze removes its own
//! intermediate directories; anything else left behind is removed by the next
//! run's clean step. [`run_build_until`] additionally stops the build when an
//! interrupt arrives and removes the intermediates right away.

use std::future::Future;

use thiserror::Error;
use tracing::{info, warn};

use crate::bundle::{self, BundleLayout, BundleMismatchError, RuntimeClientBundle, RuntimeSource};
use crate::deps::{self, PackageManager};
use crate::exec::CommandRunner;
use crate::freeze::{self, BuildError};
use crate::package::{self, OutputArtifact, PackagingError};
use crate::platform::{Os, Platform};
use crate::project::{Project, ProjectError, read_app_metadata};
use crate::toolchain::{self, Launcher};
use crate::util::archive::ArchiveFormat;
use crate::variant::{self, BuildConfiguration, BuildRequest, ConfigurationError, DependencyManifest};

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("configuration error: {0}")]
  Configuration(#[from] ConfigurationError),

  #[error("project error: {0}")]
  Project(#[from] ProjectError),

  #[error("runtime bundle error: {0}")]
  Bundle(#[from] BundleMismatchError),

  #[error("build error: {0}")]
  Build(#[from] BuildError),

  #[error("packaging error: {0}")]
  Packaging(#[from] PackagingError),

  #[error("build interrupted")]
  Interrupted,
}

/// Options for a full build.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
  pub request: BuildRequest,
  /// How to run the project's interpreter; detected when unset.
  pub launcher: Option<Launcher>,
  /// Leave the Python environment as it is.
  pub no_sync: bool,
  /// Archive format; defaults to zip on Windows and tar.gz elsewhere.
  pub archive: Option<ArchiveFormat>,
}

/// Everything a finished build produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
  pub config: BuildConfiguration,
  pub manifest: DependencyManifest,
  pub bundle: RuntimeClientBundle,
  pub artifact: OutputArtifact,
}

async fn preflight<R: CommandRunner>(runner: &R, config: &BuildConfiguration) -> Result<(), BuildError> {
  match config.platform.os {
    Os::Linux => {
      toolchain::require_patchelf(runner).await?;
    }
    Os::Windows => {
      toolchain::detect_compiler(runner).await;
    }
    Os::MacOs => {}
  }
  Ok(())
}

async fn sync_dependencies<R: CommandRunner>(
  runner: &R,
  manager: &PackageManager,
  config: &BuildConfiguration,
  manifest: &DependencyManifest,
) -> Result<(), BuildError> {
  deps::sync_project(runner, manager).await;

  let installed = deps::installed_packages(runner, manager).await?;
  let plan = deps::plan_sync(&installed, manifest);
  let installed = if plan.is_empty() {
    info!(backend = %manifest.backend, "backend packages already in place");
    installed
  } else {
    deps::apply_sync(runner, manager, &plan).await?;
    deps::installed_packages(runner, manager).await?
  };

  for note in deps::backend_report(&installed, &config.platform) {
    warn!("{}", note);
  }
  Ok(())
}

/// Probe the environment's runtime client and make sure the assets hold a
/// matching bundle.
async fn prepare_bundle<R: CommandRunner>(
  runner: &R,
  launcher: &Launcher,
  project: &Project,
  os: Os,
) -> Result<(BundleLayout, RuntimeSource, String), BundleMismatchError> {
  let toolkit = project.file.runtime.toolkit.as_str();
  let source = bundle::probe_runtime_source(runner, launcher, &project.root, toolkit).await?;
  let expected = project
    .file
    .runtime
    .version
    .clone()
    .unwrap_or_else(|| source.version.clone());
  let layout = BundleLayout::new(project.assets_dir(), toolkit, os);
  Ok((layout, source, expected))
}

/// Run a full build of `project`.
pub async fn run_build<R: CommandRunner>(
  runner: &R,
  project: &Project,
  options: &PipelineOptions,
) -> Result<BuildOutcome, PipelineError> {
  let (config, manifest) = variant::resolve(&options.request)?;
  let os = config.platform.os;
  let launcher = options.launcher.clone().unwrap_or_else(|| Launcher::detect(None));

  let mut project = project.clone();
  if let Some(metadata) = read_app_metadata(runner, &launcher, &project).await {
    project.apply_metadata(metadata);
  }
  let project = &project;

  info!(
    app = project.app_name(),
    version = project.version(),
    mode = %config.mode,
    variant = %config.gpu_variant,
    platform = %config.platform,
    "starting build"
  );

  preflight(runner, &config).await?;

  if options.no_sync {
    warn!("dependency sync skipped, the environment is used as is");
  } else {
    let manager = launcher.package_manager(&project.root);
    sync_dependencies(runner, &manager, &config, &manifest).await?;
  }

  let (layout, source, expected) = prepare_bundle(runner, &launcher, project, os).await?;
  let bundle = bundle::ensure_runtime_bundle(&layout, &source, &expected)?;

  let dist = freeze::dist_dir(project, config.mode);
  freeze::clean_dist(&dist)?;
  let python = launcher.python(&project.root);
  let raw_output = freeze::invoke_freeze(runner, python, &config, &manifest, &bundle, project).await?;

  let format = options.archive.unwrap_or_else(|| ArchiveFormat::for_os(os));
  let artifact = package::package(runner, &raw_output, &config, project, format).await?;
  freeze::remove_intermediates(&dist);

  info!(
    product = %artifact.product_dir.display(),
    archive = %artifact.archive_path.display(),
    "build complete"
  );
  Ok(BuildOutcome {
    config,
    manifest,
    bundle,
    artifact,
  })
}

/// Run a full build of `project` unless `interrupt` resolves first.
///
/// On interrupt the in-flight stage is dropped, which kills any command it
/// was running, and the freezer's intermediate directories are removed.
pub async fn run_build_until<R, F>(
  runner: &R,
  project: &Project,
  options: &PipelineOptions,
  interrupt: F,
) -> Result<BuildOutcome, PipelineError>
where
  R: CommandRunner,
  F: Future<Output = ()>,
{
  tokio::select! {
    biased;
    () = interrupt => {
      let dist = freeze::dist_dir(project, options.request.mode.unwrap_or_default());
      warn!(dist = %dist.display(), "build interrupted, removing intermediate output");
      let removed = freeze::remove_intermediates(&dist);
      info!(removed, "cleanup finished");
      Err(PipelineError::Interrupted)
    }
    result = run_build(runner, project, options) => result,
  }
}

/// Stage the runtime client bundle without building.
///
/// With `force` the archive is rewritten even if it is fresh.
pub async fn stage_bundle_only<R: CommandRunner>(
  runner: &R,
  project: &Project,
  launcher: &Launcher,
  platform: Platform,
  force: bool,
) -> Result<RuntimeClientBundle, PipelineError> {
  let (layout, source, expected) = prepare_bundle(runner, launcher, project, platform.os).await?;
  let bundle = if force {
    if source.version != expected {
      return Err(
        BundleMismatchError::SourceVersion {
          expected,
          found: source.version,
        }
        .into(),
      );
    }
    bundle::stage(&layout, &source)?
  } else {
    bundle::ensure_runtime_bundle(&layout, &source, &expected)?
  };
  Ok(bundle)
}
