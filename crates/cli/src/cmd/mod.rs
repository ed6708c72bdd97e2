mod build;
mod bundle;
mod info;
mod resolve;

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use mtpack_lib::consts::CUDA_VARIANT_ENV;
use mtpack_lib::project::Project;
use mtpack_lib::toolchain::Launcher;
use mtpack_lib::util::archive::ArchiveFormat;
use mtpack_lib::variant::{BuildMode, BuildRequest};

use crate::output::OutputFormat;

pub use build::cmd_build;
pub use bundle::cmd_bundle;
pub use info::cmd_info;
pub use resolve::cmd_resolve;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
  Release,
  Dev,
}

impl From<ModeArg> for BuildMode {
  fn from(mode: ModeArg) -> Self {
    match mode {
      ModeArg::Release => BuildMode::Release,
      ModeArg::Dev => BuildMode::Dev,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ArchiveArg {
  Zip,
  TarGz,
}

impl From<ArchiveArg> for ArchiveFormat {
  fn from(format: ArchiveArg) -> Self {
    match format {
      ArchiveArg::Zip => ArchiveFormat::Zip,
      ArchiveArg::TarGz => ArchiveFormat::TarGz,
    }
  }
}

/// Flags that shape the build configuration.
#[derive(Debug, Clone, Args)]
pub struct BuildFlags {
  /// Build mode [default: release]
  #[arg(long, value_enum)]
  pub mode: Option<ModeArg>,

  /// GPU variant: standard, cuda or cuda_full [default: $CUDA_VARIANT]
  #[arg(long)]
  pub variant: Option<String>,

  /// Compress the main executable with UPX
  #[arg(long, conflicts_with = "no_upx")]
  pub upx: bool,

  /// Don't compress with UPX, even if mtpack.toml enables it
  #[arg(long)]
  pub no_upx: bool,

  /// Path to the UPX binary
  #[arg(long)]
  pub upx_path: Option<PathBuf>,

  /// Parallel compile jobs for the freezer [default: 2]
  #[arg(long)]
  pub jobs: Option<u32>,

  /// MinGW64 installation to put on the freezer's PATH (Windows only)
  #[arg(long = "mingw64")]
  pub mingw64: Option<PathBuf>,
}

impl BuildFlags {
  /// `None` when neither `--upx` nor `--no-upx` was given.
  fn upx_choice(&self) -> Option<bool> {
    match (self.upx, self.no_upx) {
      (true, _) => Some(true),
      (_, true) => Some(false),
      _ => None,
    }
  }

  /// Layer the flags over `CUDA_VARIANT` and the project's `[build]` table.
  pub fn to_request(&self, project: &Project) -> BuildRequest {
    let variant = self.variant.clone().or_else(|| {
      std::env::var(CUDA_VARIANT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
    });

    let mut request = BuildRequest {
      mode: self.mode.map(BuildMode::from),
      gpu_variant: variant,
      jobs: self.jobs,
      upx: self.upx_choice(),
      upx_path: self.upx_path.clone(),
      mingw_path: self.mingw64.clone(),
      platform: None,
    };
    project.file.build.apply_to(&mut request);
    request
  }
}

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
  #[command(flatten)]
  pub flags: BuildFlags,

  /// Project root containing mtpack.toml
  #[arg(long, default_value = ".")]
  pub project_dir: PathBuf,

  /// Python interpreter to use instead of `uv run python`
  #[arg(long)]
  pub python: Option<PathBuf>,

  /// Skip syncing the Python environment to the backend recipe
  #[arg(long)]
  pub no_sync: bool,

  /// Archive format [default: zip on Windows, tar-gz elsewhere]
  #[arg(long, value_enum)]
  pub archive: Option<ArchiveArg>,

  /// Output format
  #[arg(short, long, value_enum, default_value_t)]
  pub output: OutputFormat,
}

impl BuildArgs {
  pub fn launcher(&self) -> Launcher {
    Launcher::detect(self.python.as_deref())
  }
}
