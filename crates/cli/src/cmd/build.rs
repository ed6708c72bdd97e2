//! Implementation of the `mtpack build` command.
//!
//! Runs the full pipeline: resolve, preflight, dependency sync, runtime
//! bundle, freeze and package. Ctrl+C or SIGTERM stops the build and removes
//! the freezer's intermediate output.

use std::fs;
use std::time::Instant;

use anyhow::{Context, Result};

use mtpack_lib::exec::SystemRunner;
use mtpack_lib::pipeline::{PipelineOptions, run_build_until};
use mtpack_lib::project::Project;

use super::BuildArgs;
use crate::output::{Status, format_elapsed, format_size, print_field, print_json, print_status};

/// Resolves on the first Ctrl+C, or SIGTERM on Unix. A handler that can't be
/// installed never fires.
async fn shutdown_signal() {
  let ctrl_c = async {
    if tokio::signal::ctrl_c().await.is_err() {
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(_) => std::future::pending::<()>().await,
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => {}
    () = terminate => {}
  }
  print_status(Status::Warning, "Interrupted, cleaning up");
}

pub fn cmd_build(args: &BuildArgs) -> Result<()> {
  let project = Project::load(&args.project_dir)
    .with_context(|| format!("Failed to load project: {}", args.project_dir.display()))?;

  let options = PipelineOptions {
    request: args.flags.to_request(&project),
    launcher: Some(args.launcher()),
    no_sync: args.no_sync,
    archive: args.archive.map(Into::into),
  };
  if options.no_sync {
    print_status(
      Status::Warning,
      "Skipping dependency sync; the current environment is frozen as is",
    );
  }

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt
    .block_on(run_build_until(&SystemRunner, &project, &options, shutdown_signal()))
    .context("Build failed")?;
  let elapsed = start.elapsed();

  let artifact = &outcome.artifact;
  if args.output.is_json() {
    let json = serde_json::json!({
      "mode": outcome.config.mode,
      "gpu_variant": outcome.config.gpu_variant,
      "backend": outcome.manifest.backend,
      "runtime_version": outcome.bundle.version,
      "artifact": artifact,
      "duration_ms": elapsed.as_millis() as u64,
    });
    return print_json(&json);
  }

  let size = fs::metadata(&artifact.archive_path).map(|m| m.len()).unwrap_or(0);
  print_status(Status::Success, &format!("Build complete in {}", format_elapsed(elapsed)));
  print_field("Mode", outcome.config.mode);
  print_field("Variant", outcome.config.gpu_variant);
  print_field("Backend", outcome.manifest.backend);
  print_field(
    "Runtime",
    format!(
      "{} ({})",
      outcome.bundle.version,
      if outcome.bundle.staged { "staged" } else { "cached" }
    ),
  );
  print_field("Product", artifact.product_dir.display());
  print_field(
    "Archive",
    format!("{} ({})", artifact.archive_path.display(), format_size(size)),
  );

  Ok(())
}
