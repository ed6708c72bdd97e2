//! Turning the freezer's raw output into a distributable product.
//!
//! The raw `*.dist` directory is renamed to the product stem
//! (`MTools_Windows_amd64_CUDA`), trimmed of assets other platforms need,
//! optionally compressed with UPX and finally archived so the archive's only
//! top-level entry is the product directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::exec::{CommandRunner, CommandSpec, ExecError};
use crate::platform::Os;
use crate::project::Project;
use crate::toolchain;
use crate::util::archive::{self, ArchiveError, ArchiveFormat};
use crate::variant::BuildConfiguration;

#[derive(Debug, Error)]
pub enum PackagingError {
  #[error("failed to clear previous output {path}: {source}")]
  Clear {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to rename {from} to {to}: {source}")]
  Rename {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("main executable not found at {0}")]
  MissingExecutable(PathBuf),

  #[error("UPX failed on {path} with exit code {code:?}: {stderr}")]
  Upx {
    path: PathBuf,
    code: Option<i32>,
    stderr: String,
  },

  #[error("failed to create archive: {0}")]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

/// A finished, distributable build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
  /// `Windows`, `Darwin` or `Linux`.
  pub platform: String,
  /// `amd64`, `arm64` or `x86`.
  pub architecture: String,
  pub variant_suffix: Option<String>,
  pub product_dir: PathBuf,
  pub archive_path: PathBuf,
}

/// `<App>_<Platform>_<arch>[_<SUFFIX>]`.
pub fn product_stem(app_name: &str, config: &BuildConfiguration) -> String {
  let mut stem = format!("{}_{}", app_name, config.platform.release_name());
  if let Some(suffix) = config.variant_suffix() {
    stem.push('_');
    stem.push_str(suffix);
  }
  stem
}

/// Directory of the frozen app's code and data inside the product.
fn app_root(product_dir: &Path, os: Os, app_name: &str) -> PathBuf {
  match os {
    Os::MacOs => product_dir.join(format!("{}.app", app_name)).join("Contents/MacOS"),
    Os::Linux | Os::Windows => product_dir.to_path_buf(),
  }
}

fn clear(path: &Path) -> Result<(), PackagingError> {
  let result = if path.is_dir() {
    fs::remove_dir_all(path)
  } else if path.exists() {
    fs::remove_file(path)
  } else {
    return Ok(());
  };
  result.map_err(|source| PackagingError::Clear {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(path = %path.display(), "cleared previous output");
  Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<(), PackagingError> {
  fs::rename(from, to).map_err(|source| PackagingError::Rename {
    from: from.to_path_buf(),
    to: to.to_path_buf(),
    source,
  })
}

/// Move the raw output into place as `product_dir`.
///
/// On macOS the `.app` bundle itself becomes a child of the product
/// directory, so the archive root is still the product stem.
fn place_product(raw_output: &Path, product_dir: &Path, os: Os, app_name: &str) -> Result<(), PackagingError> {
  clear(product_dir)?;
  let is_app_bundle = raw_output.extension().is_some_and(|ext| ext == "app");
  if os == Os::MacOs && is_app_bundle {
    fs::create_dir_all(product_dir)?;
    rename(raw_output, &product_dir.join(format!("{}.app", app_name)))
  } else {
    rename(raw_output, product_dir)
  }
}

/// Remove icon files only other platforms use. The runtime bundle and every
/// other asset stay.
fn remove_foreign_icons(app_root: &Path, os: Os) -> Result<usize, PackagingError> {
  let assets = app_root.join("src").join("assets");
  let mut removed = 0;
  for icon in os.foreign_icons() {
    let path = assets.join(icon);
    if path.is_file() {
      fs::remove_file(&path)?;
      debug!(path = %path.display(), "removed foreign icon");
      removed += 1;
    }
  }
  Ok(removed)
}

async fn compress_executable<R: CommandRunner>(
  runner: &R,
  upx: &str,
  executable: &Path,
) -> Result<(), PackagingError> {
  if !executable.is_file() {
    return Err(PackagingError::MissingExecutable(executable.to_path_buf()));
  }
  let before = fs::metadata(executable)?.len();

  let spec = CommandSpec::new(upx)
    .args(["--best", "--lzma"])
    .arg(executable.to_string_lossy());
  let output = runner.run(&spec).await?;
  if !output.success() {
    return Err(PackagingError::Upx {
      path: executable.to_path_buf(),
      code: output.code,
      stderr: output.stderr.trim().to_string(),
    });
  }

  let after = fs::metadata(executable)?.len();
  info!(executable = %executable.display(), before, after, "compressed main executable");
  Ok(())
}

/// Package the freezer's raw output into a named product directory and
/// archive.
pub async fn package<R: CommandRunner>(
  runner: &R,
  raw_output: &Path,
  config: &BuildConfiguration,
  project: &Project,
  format: ArchiveFormat,
) -> Result<OutputArtifact, PackagingError> {
  let os = config.platform.os;
  let app_name = project.app_name();
  let stem = product_stem(app_name, config);
  let out_dir = raw_output.parent().unwrap_or(Path::new("."));
  let product_dir = out_dir.join(&stem);

  place_product(raw_output, &product_dir, os, app_name)?;
  info!(product = %product_dir.display(), "product directory ready");

  let root = app_root(&product_dir, os, app_name);
  let removed = remove_foreign_icons(&root, os)?;
  if removed > 0 {
    debug!(removed, "dropped icons for other platforms");
  }

  if config.upx_enabled {
    match toolchain::find_upx(runner, config.upx_path.as_deref()).await {
      Some(upx) => compress_executable(runner, &upx, &root.join(os.executable_name(app_name))).await?,
      None => warn!("UPX unavailable, skipping compression"),
    }
  }

  let archive_path = out_dir.join(format!("{}.{}", stem, format.extension()));
  clear(&archive_path)?;
  let files = archive::pack_dir(format, &product_dir, &stem, &archive_path)?;
  info!(archive = %archive_path.display(), files, "archive created");

  Ok(OutputArtifact {
    platform: os.release_name().to_string(),
    architecture: config.platform.arch.release_name().to_string(),
    variant_suffix: config.variant_suffix().map(str::to_string),
    product_dir,
    archive_path,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{Arch, Platform};
  use crate::project::ProjectFile;
  use crate::util::testutil::{RecordingRunner, failed, ok};
  use crate::variant::{BuildRequest, resolve};
  use tempfile::TempDir;

  fn config(variant: Option<&str>, os: Os, upx: bool) -> BuildConfiguration {
    resolve(&BuildRequest {
      gpu_variant: variant.map(str::to_string),
      upx: Some(upx),
      platform: Some(Platform::new(Arch::X86_64, os)),
      ..Default::default()
    })
    .unwrap()
    .0
  }

  /// A fake `main.dist` with the Linux executable and all three icons.
  fn raw_output(temp: &TempDir) -> PathBuf {
    let raw = temp.path().join("dist/release/main.dist");
    let assets = raw.join("src/assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(raw.join("MTools.bin"), b"\x7fELF").unwrap();
    for icon in ["icon.png", "icon.ico", "icon.icns", ".flet.tar.gz"] {
      fs::write(assets.join(icon), icon).unwrap();
    }
    raw
  }

  fn project(temp: &TempDir) -> Project {
    Project::with_file(temp.path().to_path_buf(), ProjectFile::default())
  }

  #[test]
  fn stem_carries_platform_and_variant() {
    assert_eq!(
      product_stem("MTools", &config(None, Os::Windows, false)),
      "MTools_Windows_amd64"
    );
    assert_eq!(
      product_stem("MTools", &config(Some("cuda"), Os::Linux, false)),
      "MTools_Linux_amd64_CUDA"
    );
    assert_eq!(
      product_stem("MTools", &config(Some("cuda_full"), Os::Windows, false)),
      "MTools_Windows_amd64_CUDA_FULL"
    );
  }

  #[tokio::test]
  async fn archive_has_single_root_named_after_product() {
    let temp = TempDir::new().unwrap();
    let raw = raw_output(&temp);
    let config = config(Some("cuda"), Os::Linux, false);

    let artifact = package(&RecordingRunner::new(), &raw, &config, &project(&temp), ArchiveFormat::TarGz)
      .await
      .unwrap();

    assert!(!raw.exists());
    assert!(artifact.product_dir.ends_with("MTools_Linux_amd64_CUDA"));
    assert_eq!(artifact.variant_suffix.as_deref(), Some("CUDA"));
    assert!(
      artifact
        .archive_path
        .to_string_lossy()
        .ends_with("MTools_Linux_amd64_CUDA.tar.gz")
    );

    let names = archive::list_entries(ArchiveFormat::TarGz, &artifact.archive_path).unwrap();
    assert_eq!(archive::top_level_entries(&names), vec!["MTools_Linux_amd64_CUDA".to_string()]);
  }

  #[tokio::test]
  async fn foreign_icons_removed_and_bundle_kept() {
    let temp = TempDir::new().unwrap();
    let raw = raw_output(&temp);

    let artifact = package(
      &RecordingRunner::new(),
      &raw,
      &config(None, Os::Linux, false),
      &project(&temp),
      ArchiveFormat::Zip,
    )
    .await
    .unwrap();

    let assets = artifact.product_dir.join("src/assets");
    assert!(assets.join("icon.png").exists());
    assert!(assets.join(".flet.tar.gz").exists());
    assert!(!assets.join("icon.ico").exists());
    assert!(!assets.join("icon.icns").exists());
  }

  #[tokio::test]
  async fn previous_product_is_replaced() {
    let temp = TempDir::new().unwrap();
    let raw = raw_output(&temp);
    let stale = temp.path().join("dist/release/MTools_Linux_amd64");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("leftover.txt"), "old").unwrap();

    let artifact = package(
      &RecordingRunner::new(),
      &raw,
      &config(None, Os::Linux, false),
      &project(&temp),
      ArchiveFormat::TarGz,
    )
    .await
    .unwrap();

    assert!(!artifact.product_dir.join("leftover.txt").exists());
    assert!(artifact.product_dir.join("MTools.bin").exists());
  }

  #[tokio::test]
  async fn upx_disabled_runs_no_upx_command() {
    let temp = TempDir::new().unwrap();
    let raw = raw_output(&temp);
    let runner = RecordingRunner::new();

    package(&runner, &raw, &config(None, Os::Linux, false), &project(&temp), ArchiveFormat::TarGz)
      .await
      .unwrap();

    assert!(!runner.ran("upx"));
    assert!(runner.calls().is_empty());
  }

  #[tokio::test]
  async fn upx_enabled_compresses_main_executable() {
    let temp = TempDir::new().unwrap();
    let raw = raw_output(&temp);
    let runner = RecordingRunner::with_responder(|_| ok("upx 4.2.4"));

    let artifact = package(&runner, &raw, &config(None, Os::Linux, true), &project(&temp), ArchiveFormat::TarGz)
      .await
      .unwrap();

    let calls = runner.calls();
    let compress = calls.last().unwrap();
    assert_eq!(compress.program, "upx");
    let exe = artifact.product_dir.join("MTools.bin");
    assert_eq!(compress.args.last().unwrap(), &exe.to_string_lossy().to_string());
  }

  #[tokio::test]
  async fn upx_unavailable_is_skipped() {
    let temp = TempDir::new().unwrap();
    let raw = raw_output(&temp);
    let runner = RecordingRunner::with_responder(|_| failed(127, "not found"));

    let artifact = package(&runner, &raw, &config(None, Os::Linux, true), &project(&temp), ArchiveFormat::TarGz)
      .await;

    assert!(artifact.is_ok());
    assert_eq!(runner.calls().len(), 1);
  }

  #[tokio::test]
  async fn upx_failure_is_a_packaging_error() {
    let temp = TempDir::new().unwrap();
    let raw = raw_output(&temp);
    let runner = RecordingRunner::with_responder(|spec| {
      if spec.args.iter().any(|a| a == "--version") {
        ok("upx 4.2.4")
      } else {
        failed(1, "CantPackException")
      }
    });

    let err = package(&runner, &raw, &config(None, Os::Linux, true), &project(&temp), ArchiveFormat::TarGz)
      .await
      .unwrap_err();

    assert!(matches!(err, PackagingError::Upx { code: Some(1), .. }));
  }

  #[tokio::test]
  async fn macos_app_bundle_nested_in_product_dir() {
    let temp = TempDir::new().unwrap();
    let raw = temp.path().join("dist/release/main.app");
    let macos = raw.join("Contents/MacOS");
    fs::create_dir_all(macos.join("src/assets")).unwrap();
    fs::write(macos.join("MTools"), "bin").unwrap();
    fs::write(macos.join("src/assets/icon.ico"), "ico").unwrap();
    let config = resolve(&BuildRequest {
      platform: Some(Platform::new(Arch::Aarch64, Os::MacOs)),
      ..Default::default()
    })
    .unwrap()
    .0;

    let artifact = package(&RecordingRunner::new(), &raw, &config, &project(&temp), ArchiveFormat::TarGz)
      .await
      .unwrap();

    let app = artifact.product_dir.join("MTools.app/Contents/MacOS");
    assert!(app.join("MTools").exists());
    assert!(!app.join("src/assets/icon.ico").exists());
    assert_eq!(artifact.platform, "Darwin");
    assert_eq!(artifact.architecture, "arm64");
  }
}
