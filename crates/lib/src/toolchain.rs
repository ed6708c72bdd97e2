//! Discovery of the external tools a build drives.
//!
//! The interpreter that runs the freezer, UPX, `patchelf` on Linux and the C
//! compiler on Windows are all located here. Probes run `<tool> --version`
//! through the [`CommandRunner`] and never fail the build themselves, except
//! for tools the freezer cannot work without.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::deps::PackageManager;
use crate::exec::{CommandRunner, CommandSpec};
use crate::freeze::BuildError;

/// How the Python interpreter that hosts the freezer is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
  /// `uv run --no-sync python`, so the project's environment is used.
  Uv { uv: PathBuf },
  /// A plain interpreter.
  Python { python: PathBuf },
}

impl Launcher {
  /// Pick a launcher: an explicit interpreter wins, then `uv` on PATH, then
  /// `python3` / `python`.
  pub fn detect(explicit_python: Option<&Path>) -> Self {
    if let Some(python) = explicit_python {
      return Self::Python {
        python: python.to_path_buf(),
      };
    }
    if let Ok(uv) = which::which("uv") {
      debug!(uv = %uv.display(), "using uv launcher");
      return Self::Uv { uv };
    }
    let python = which::which("python3")
      .or_else(|_| which::which("python"))
      .unwrap_or_else(|_| PathBuf::from("python"));
    debug!(python = %python.display(), "using plain interpreter");
    Self::Python { python }
  }

  /// A command that runs the interpreter inside `project_root`; callers
  /// append its arguments.
  ///
  /// `uv run` never syncs here: the environment is synced once up front and
  /// then edited by the backend recipe, and a resync would reinstall the
  /// locked backend.
  pub fn python(&self, project_root: &Path) -> CommandSpec {
    let spec = match self {
      Self::Uv { uv } => CommandSpec::new(uv.to_string_lossy()).args(["run", "--no-sync", "python"]),
      Self::Python { python } => CommandSpec::new(python.to_string_lossy()),
    };
    spec.cwd(project_root)
  }

  pub fn package_manager(&self, project_root: &Path) -> PackageManager {
    let root = project_root.to_path_buf();
    match self {
      Self::Uv { uv } => PackageManager::Uv { uv: uv.clone(), root },
      Self::Python { python } => PackageManager::Pip {
        python: python.clone(),
        root,
      },
    }
  }
}

/// Run `<program> --version` and return the first line of output on success.
async fn probe_version<R: CommandRunner>(runner: &R, program: &str) -> Option<String> {
  let spec = CommandSpec::new(program).arg("--version");
  match runner.run(&spec).await {
    Ok(output) if output.success() => {
      let text = if output.stdout.trim().is_empty() {
        &output.stderr
      } else {
        &output.stdout
      };
      Some(text.lines().next().unwrap_or_default().trim().to_string())
    }
    Ok(_) => None,
    Err(e) => {
      debug!(program, error = %e, "version probe failed");
      None
    }
  }
}

/// Locate a working UPX binary.
///
/// An explicit path is tried first, then `upx` on PATH. Returns `None` with
/// a warning when neither answers `--version`.
pub async fn find_upx<R: CommandRunner>(runner: &R, explicit: Option<&Path>) -> Option<String> {
  if let Some(path) = explicit {
    if path.is_file() {
      let program = path.to_string_lossy().to_string();
      if probe_version(runner, &program).await.is_some() {
        info!(upx = %program, "found UPX");
        return Some(program);
      }
      warn!(path = %path.display(), "specified UPX binary does not run");
    } else {
      warn!(path = %path.display(), "specified UPX path does not exist");
    }
  }

  if probe_version(runner, "upx").await.is_some() {
    info!("found UPX on PATH");
    return Some("upx".to_string());
  }

  warn!("UPX not found, download it from https://github.com/upx/upx/releases");
  None
}

/// The freezer rewrites ELF binaries with `patchelf` on Linux.
pub async fn require_patchelf<R: CommandRunner>(runner: &R) -> Result<String, BuildError> {
  match probe_version(runner, "patchelf").await {
    Some(version) => {
      info!(version = %version, "found patchelf");
      Ok(version)
    }
    None => Err(BuildError::MissingTool {
      tool: "patchelf".to_string(),
      hint: "install it with your package manager, e.g. `sudo apt-get install patchelf`, \
             `sudo dnf install patchelf` or `sudo pacman -S patchelf`"
        .to_string(),
    }),
  }
}

/// C compiler the freezer will use on Windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compiler {
  MinGw,
  Msvc,
  /// Nothing installed; the freezer downloads MinGW on first use.
  FreezerManaged,
}

pub async fn detect_compiler<R: CommandRunner>(runner: &R) -> Compiler {
  if let Some(version) = probe_version(runner, "gcc").await {
    info!(version = %version, "using MinGW");
    return Compiler::MinGw;
  }

  // `cl` exits non-zero without arguments; being spawnable is enough.
  if runner.run(&CommandSpec::new("cl")).await.is_ok() {
    info!("using MSVC");
    return Compiler::Msvc;
  }

  info!("no C compiler found, the freezer will download MinGW on first use");
  Compiler::FreezerManaged
}
