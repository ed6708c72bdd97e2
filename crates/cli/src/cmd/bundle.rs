//! Implementation of the `mtpack bundle` command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use mtpack_lib::exec::SystemRunner;
use mtpack_lib::pipeline::stage_bundle_only;
use mtpack_lib::platform::Platform;
use mtpack_lib::project::Project;
use mtpack_lib::toolchain::Launcher;

use crate::output::{Status, format_size, print_field, print_status};

pub fn cmd_bundle(project_dir: &Path, python: Option<PathBuf>, force: bool) -> Result<()> {
  let project =
    Project::load(project_dir).with_context(|| format!("Failed to load project: {}", project_dir.display()))?;
  let platform = Platform::current().ok_or_else(|| anyhow!("Unsupported host platform"))?;

  let launcher = Launcher::detect(python.as_deref());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let bundle = rt
    .block_on(stage_bundle_only(&SystemRunner, &project, &launcher, platform, force))
    .context("Failed to stage runtime bundle")?;

  if bundle.staged {
    print_status(Status::Success, &format!("Runtime bundle {} staged", bundle.version));
  } else {
    print_status(Status::Info, &format!("Runtime bundle {} is up to date", bundle.version));
  }
  let size = fs::metadata(&bundle.archive_path).map(|m| m.len()).unwrap_or(0);
  print_field("Archive", bundle.archive_path.display());
  print_field("Size", format_size(size));

  Ok(())
}
