use std::path::Path;

use anyhow::{Context, Result};

use mtpack_lib::bundle::BundleLayout;
use mtpack_lib::consts::PROJECT_FILENAME;
use mtpack_lib::package::product_stem;
use mtpack_lib::project::Project;
use mtpack_lib::variant::{BuildRequest, GpuVariant, resolve};

use crate::output::{OutputFormat, print_field, print_json, print_section};

pub fn cmd_info(project_dir: &Path, output: OutputFormat) -> Result<()> {
  let project =
    Project::load(project_dir).with_context(|| format!("Failed to load project: {}", project_dir.display()))?;
  let (config, _) = resolve(&BuildRequest::default()).context("Unsupported host platform")?;
  let platform = config.platform;
  let backend = GpuVariant::Standard.backend(&platform)?;
  let layout = BundleLayout::new(project.assets_dir(), project.file.runtime.toolkit.as_str(), platform.os);
  let has_project_file = project.root.join(PROJECT_FILENAME).is_file();

  if output.is_json() {
    let json = serde_json::json!({
      "platform": platform.to_string(),
      "release_name": platform.release_name(),
      "default_backend": backend,
      "product_stem": product_stem(project.app_name(), &config),
      "bundle_archive": layout.archive_path(),
      "project_file": has_project_file,
    });
    return print_json(&json);
  }

  print_section("System");
  print_field("Platform", platform);
  print_field("Release name", platform.release_name());
  print_field("Default backend", backend.as_str());
  println!();
  print_section("Project");
  print_field("Root", project.root.display());
  print_field("App", format!("{} {}", project.app_name(), project.version()));
  print_field("Product", product_stem(project.app_name(), &config));
  print_field("Runtime bundle", layout.archive_path().display());
  if !has_project_file {
    print_field("Project file", "not found, using defaults");
  }

  Ok(())
}
