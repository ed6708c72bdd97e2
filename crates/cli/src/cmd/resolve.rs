//! Implementation of the `mtpack resolve` command.
//!
//! Prints what a build with the same flags would use, without touching the
//! environment or spawning anything.

use std::path::Path;

use anyhow::{Context, Result};

use mtpack_lib::package::product_stem;
use mtpack_lib::project::Project;
use mtpack_lib::variant::resolve;

use super::BuildFlags;
use crate::output::{Change, OutputFormat, print_change, print_field, print_json, print_section};

pub fn cmd_resolve(flags: &BuildFlags, project_dir: &Path, output: OutputFormat) -> Result<()> {
  let project =
    Project::load(project_dir).with_context(|| format!("Failed to load project: {}", project_dir.display()))?;
  let (config, manifest) = resolve(&flags.to_request(&project)).context("Invalid build configuration")?;
  let stem = product_stem(project.app_name(), &config);

  if output.is_json() {
    let json = serde_json::json!({
      "mode": config.mode,
      "gpu_variant": config.gpu_variant,
      "job_count": config.job_count,
      "upx_enabled": config.upx_enabled,
      "platform": config.platform.release_name(),
      "console_visible": config.console_visible(),
      "python_flags": config.python_flags(),
      "variant_suffix": config.variant_suffix(),
      "product_stem": stem,
      "manifest": manifest,
    });
    return print_json(&json);
  }

  print_section("Configuration");
  print_field("Mode", config.mode.as_str());
  print_field("Variant", config.gpu_variant.as_str());
  print_field("Platform", config.platform.release_name());
  print_field("Jobs", config.job_count);
  print_field("UPX", if config.upx_enabled { "enabled" } else { "disabled" });
  print_field("Console", if config.console_visible() { "visible" } else { "hidden" });
  print_field("Python flags", &config.python_flags().join(" "));
  print_field("Product", &stem);
  println!();
  print_section(&format!("Backend {}", manifest.backend));
  for name in &manifest.remove {
    print_change(Change::Remove, name);
  }
  for req in &manifest.packages {
    print_change(Change::Add, &req.specifier());
  }

  Ok(())
}
