//! Invoking the ahead-of-time freezer.
//!
//! The freezer's flag set is derived purely from the [`BuildConfiguration`]
//! and the project; [`freeze_args`] has no side effects so the exact command
//! can be inspected and tested. [`invoke_freeze`] streams the freezer's
//! output straight to the terminal and fails on a non-zero exit. It is never
//! retried.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bundle::RuntimeClientBundle;
use crate::consts::{BUNDLE_PARTIAL_SUFFIX, BUNDLE_STAMP_SUFFIX, DIST_DIR, FREEZE_BUILD_SUFFIX, FREEZE_DIST_SUFFIX};
use crate::exec::{CommandOutput, CommandRunner, CommandSpec, ExecError};
use crate::platform::Os;
use crate::project::{Project, file_version};
use crate::variant::{BuildConfiguration, BuildMode, DependencyManifest};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("{tool} not found: {hint}")]
  MissingTool { tool: String, hint: String },

  #[error("`{command}` failed with exit code {}{}", fmt_code(.code), fmt_stderr(.stderr))]
  CommandFailed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("failed to read installed packages: {0}")]
  PackageList(String),

  #[error("freezer produced no output directory in {0}")]
  NoOutput(PathBuf),

  #[error("failed to clean {path}: {source}")]
  Clean {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Exec(#[from] ExecError),
}

fn fmt_code(code: &Option<i32>) -> String {
  code.map(|c| c.to_string()).unwrap_or_else(|| "none (terminated by signal)".to_string())
}

fn fmt_stderr(stderr: &str) -> String {
  let stderr = stderr.trim();
  if stderr.is_empty() {
    String::new()
  } else {
    format!("\n{}", stderr)
  }
}

impl BuildError {
  pub fn command_failed(spec: &CommandSpec, output: &CommandOutput) -> Self {
    Self::CommandFailed {
      command: spec.to_string(),
      code: output.code,
      stderr: output.stderr.clone(),
    }
  }
}

/// Output root for a build mode: `dist/<mode>`.
pub fn dist_dir(project: &Project, mode: BuildMode) -> PathBuf {
  project.root.join(DIST_DIR).join(mode.as_str())
}

/// Remove the previous output of this mode, including partial output left
/// by an interrupted run.
pub fn clean_dist(dist: &Path) -> Result<(), BuildError> {
  if dist.exists() {
    fs::remove_dir_all(dist).map_err(|source| BuildError::Clean {
      path: dist.to_path_buf(),
      source,
    })?;
    info!(path = %dist.display(), "removed previous build output");
  }
  Ok(())
}

/// Remove the freezer's intermediate `*.build` and `*.dist` directories
/// from `dist`. Failures are logged, never fatal.
pub fn remove_intermediates(dist: &Path) -> usize {
  let Ok(entries) = fs::read_dir(dist) else {
    return 0;
  };

  let mut removed = 0;
  for path in entries.filter_map(Result::ok).map(|e| e.path()) {
    let intermediate = path.is_dir()
      && path
        .extension()
        .is_some_and(|ext| ext == FREEZE_DIST_SUFFIX || ext == FREEZE_BUILD_SUFFIX);
    if !intermediate {
      continue;
    }
    match fs::remove_dir_all(&path) {
      Ok(()) => {
        debug!(path = %path.display(), "removed intermediate directory");
        removed += 1;
      }
      Err(e) => warn!(path = %path.display(), error = %e, "failed to remove intermediate directory"),
    }
  }
  removed
}

fn path_arg(flag: &str, path: &Path) -> String {
  format!("--{}={}", flag, path.display())
}

/// Freezer arguments (after `python -m nuitka`) for one build.
pub fn freeze_args(config: &BuildConfiguration, project: &Project) -> Vec<String> {
  let assets = project.assets_dir();
  let app = project.app_name();
  let version = project.version();
  let os = config.platform.os;

  let mut args = vec![
    "--standalone".to_string(),
    path_arg("output-dir", &dist_dir(project, config.mode)),
    "--assume-yes-for-downloads".to_string(),
    "--follow-imports".to_string(),
    format!("--jobs={}", config.job_count),
    format!("--include-data-dir={}=src/assets", assets.display()),
  ];

  // Bundle bookkeeping lives next to the archive and must not ship.
  for suffix in [BUNDLE_STAMP_SUFFIX, BUNDLE_PARTIAL_SUFFIX] {
    args.push(format!("--noinclude-data-files=src/assets/*{}", suffix));
  }

  let platform_bin = project.bin_dir().join(os.as_str());
  if platform_bin.is_dir() {
    args.push(format!(
      "--include-data-dir={}=bin/{}",
      platform_bin.display(),
      os.as_str()
    ));
  }

  for flag in config.python_flags() {
    args.push(format!("--python-flag={}", flag));
  }
  if config.onefile_compression_disabled() {
    args.push("--onefile-no-compression".to_string());
  }

  for module in &project.file.freeze.exclude_modules {
    args.push(format!("--nofollow-import-to={}", module));
  }

  let output_filename = os.executable_name(app);
  match os {
    Os::Windows => {
      let console = if config.console_visible() { "attach" } else { "disable" };
      let numeric = file_version(version);
      args.extend([
        format!("--windows-console-mode={}", console),
        path_arg("windows-icon-from-ico", &assets.join(os.icon_file())),
        format!("--file-version={}", numeric),
        format!("--product-version={}", numeric),
        format!("--file-description={}", project.description()),
        format!("--company-name={}", project.file.app.company),
        format!("--copyright={}", project.copyright()),
        format!("--product-name={} {}", app, version),
      ]);
    }
    Os::Linux => {
      args.push(path_arg("linux-icon", &assets.join(os.icon_file())));
    }
    Os::MacOs => {
      args.extend([
        "--macos-create-app-bundle".to_string(),
        path_arg("macos-app-icon", &assets.join(os.icon_file())),
        format!("--macos-app-name={}", app),
        format!("--macos-app-version={}", version),
      ]);
    }
  }
  args.push(format!("--output-filename={}", output_filename));

  args.push(project.main_script().display().to_string());
  args
}

/// Prepend `<mingw>/bin` to PATH for the freezer process.
fn mingw_path_env(mingw: &Path) -> Option<String> {
  let bin = mingw.join("bin");
  if !bin.is_dir() {
    warn!(path = %mingw.display(), "specified MinGW64 path does not exist, ignoring");
    return None;
  }
  let current = env::var_os("PATH").unwrap_or_default();
  let paths = std::iter::once(bin).chain(env::split_paths(&current));
  env::join_paths(paths).ok().map(|p| p.to_string_lossy().to_string())
}

/// The freezer's raw output: the single `*.dist` directory, or on macOS the
/// `*.app` bundle, which wins over a `*.dist` left next to it.
pub fn locate_raw_output(dist: &Path, os: Os) -> Result<PathBuf, BuildError> {
  let mut candidates: Vec<PathBuf> = Vec::new();
  let suffixes: &[&str] = match os {
    Os::MacOs => &["app", FREEZE_DIST_SUFFIX],
    Os::Linux | Os::Windows => &[FREEZE_DIST_SUFFIX],
  };

  for suffix in suffixes {
    let entries = fs::read_dir(dist).map_err(|_| BuildError::NoOutput(dist.to_path_buf()))?;
    candidates = entries
      .filter_map(Result::ok)
      .map(|e| e.path())
      .filter(|p| p.is_dir() && p.extension().is_some_and(|ext| ext == *suffix))
      .collect();
    if !candidates.is_empty() {
      break;
    }
  }

  candidates.sort();
  if candidates.len() > 1 {
    warn!(count = candidates.len(), "several freezer outputs found, using the first");
  }
  candidates
    .into_iter()
    .next()
    .ok_or_else(|| BuildError::NoOutput(dist.to_path_buf()))
}

/// Run the freezer and return its raw output directory.
pub async fn invoke_freeze<R: CommandRunner>(
  runner: &R,
  python: CommandSpec,
  config: &BuildConfiguration,
  manifest: &DependencyManifest,
  bundle: &RuntimeClientBundle,
  project: &Project,
) -> Result<PathBuf, BuildError> {
  let mut args = freeze_args(config, project);

  // The assets directory is included wholesale; a bundle staged elsewhere
  // has to be added explicitly.
  if !bundle.archive_path.starts_with(project.assets_dir()) {
    let name = bundle.archive_path.file_name().unwrap_or_default().to_string_lossy().to_string();
    let script = args.pop().unwrap_or_default();
    args.push(format!(
      "--include-data-files={}=src/assets/{}",
      bundle.archive_path.display(),
      name
    ));
    args.push(script);
  }

  let mut spec = python.args(["-m", "nuitka"]).args(args).cwd(&project.root).inherit_output();
  if let Some(path) = config.mingw_path.as_deref().and_then(mingw_path_env) {
    spec = spec.env("PATH", path);
  }

  info!(
    mode = %config.mode,
    variant = %config.gpu_variant,
    backend = %manifest.backend,
    jobs = config.job_count,
    runtime = %bundle.version,
    "starting freezer"
  );

  let dist = dist_dir(project, config.mode);
  let output = runner.run(&spec).await?;
  if !output.success() {
    let removed = remove_intermediates(&dist);
    if removed > 0 {
      info!(removed, "cleaned up incomplete freezer output");
    }
    return Err(BuildError::command_failed(&spec, &output));
  }

  let raw = locate_raw_output(&dist, config.platform.os)?;
  info!(output = %raw.display(), "freezer finished");
  Ok(raw)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{Arch, Platform};
  use crate::project::ProjectFile;
  use crate::util::archive::ArchiveFormat;
  use crate::util::testutil::{RecordingRunner, failed};
  use crate::variant::{BuildRequest, resolve};
  use tempfile::TempDir;

  fn config(mode: BuildMode, os: Os) -> (BuildConfiguration, DependencyManifest) {
    resolve(&BuildRequest {
      mode: Some(mode),
      platform: Some(Platform::new(Arch::X86_64, os)),
      jobs: Some(4),
      ..Default::default()
    })
    .unwrap()
  }

  fn project(root: &Path) -> Project {
    Project::with_file(root.to_path_buf(), ProjectFile::default())
  }

  fn bundle(project: &Project) -> RuntimeClientBundle {
    RuntimeClientBundle {
      archive_path: project.assets_dir().join(".flet.tar.gz"),
      version: "0.28.3".to_string(),
      format: ArchiveFormat::TarGz,
      staged: false,
    }
  }

  #[test]
  fn release_args_are_optimized() {
    let (config, _) = config(BuildMode::Release, Os::Linux);
    let args = freeze_args(&config, &project(Path::new("/proj")));

    assert!(args.contains(&"--standalone".to_string()));
    assert!(args.contains(&"--jobs=4".to_string()));
    assert!(args.contains(&"--python-flag=-O".to_string()));
    assert!(args.contains(&"--python-flag=no_warnings".to_string()));
    assert!(args.contains(&"--onefile-no-compression".to_string()));
    assert!(args.contains(&"--output-filename=MTools.bin".to_string()));
    assert!(args.contains(&"--nofollow-import-to=tkinter".to_string()));
    assert!(args.last().unwrap().ends_with("main.py"));
  }

  #[test]
  fn bundle_bookkeeping_is_left_out_of_the_assets() {
    let (config, _) = config(BuildMode::Release, Os::Linux);
    let args = freeze_args(&config, &project(Path::new("/proj")));

    let data_dir = args.iter().position(|a| a.starts_with("--include-data-dir=")).unwrap();
    let stamp = args
      .iter()
      .position(|a| a == "--noinclude-data-files=src/assets/*.stamp.json")
      .unwrap();
    assert!(data_dir < stamp);
    assert!(args.contains(&"--noinclude-data-files=src/assets/*.partial".to_string()));
  }

  #[test]
  fn dev_args_skip_optimizations() {
    let (config, _) = config(BuildMode::Dev, Os::Linux);
    let args = freeze_args(&config, &project(Path::new("/proj")));

    assert!(args.contains(&"--python-flag=no_site".to_string()));
    assert!(!args.contains(&"--python-flag=-O".to_string()));
    assert!(!args.contains(&"--python-flag=no_warnings".to_string()));
    assert!(args.iter().any(|a| a.contains("dist") && a.ends_with("dev")));
  }

  #[test]
  fn windows_console_follows_mode() {
    let (dev, _) = config(BuildMode::Dev, Os::Windows);
    let (release, _) = config(BuildMode::Release, Os::Windows);
    let proj = project(Path::new("C:/proj"));

    assert!(freeze_args(&dev, &proj).contains(&"--windows-console-mode=attach".to_string()));
    let release_args = freeze_args(&release, &proj);
    assert!(release_args.contains(&"--windows-console-mode=disable".to_string()));
    assert!(release_args.contains(&"--file-version=0.1.0.0".to_string()));
    assert!(release_args.contains(&"--output-filename=MTools.exe".to_string()));
  }

  #[test]
  fn macos_builds_an_app_bundle() {
    let (config, _) = config(BuildMode::Release, Os::MacOs);
    let args = freeze_args(&config, &project(Path::new("/proj")));

    assert!(args.contains(&"--macos-create-app-bundle".to_string()));
    assert!(args.iter().any(|a| a.starts_with("--macos-app-icon=") && a.ends_with("icon.icns")));
  }

  #[test]
  fn platform_bin_tree_is_included_when_present() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("bin/linux/ffmpeg")).unwrap();
    let (config, _) = config(BuildMode::Release, Os::Linux);

    let args = freeze_args(&config, &project(temp.path()));

    assert!(args.iter().any(|a| a.starts_with("--include-data-dir=") && a.ends_with("=bin/linux")));
  }

  #[test]
  fn locate_prefers_dist_directory() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("main.build")).unwrap();
    fs::create_dir_all(temp.path().join("main.dist")).unwrap();

    let raw = locate_raw_output(temp.path(), Os::Linux).unwrap();

    assert_eq!(raw, temp.path().join("main.dist"));
  }

  #[test]
  fn locate_finds_app_bundle_on_macos() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("MTools.app")).unwrap();

    assert_eq!(
      locate_raw_output(temp.path(), Os::MacOs).unwrap(),
      temp.path().join("MTools.app")
    );
    assert!(matches!(
      locate_raw_output(temp.path(), Os::Linux),
      Err(BuildError::NoOutput(_))
    ));
  }

  #[test]
  fn app_bundle_wins_over_dist_on_macos() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("main.dist")).unwrap();
    fs::create_dir_all(temp.path().join("MTools.app")).unwrap();

    assert_eq!(
      locate_raw_output(temp.path(), Os::MacOs).unwrap(),
      temp.path().join("MTools.app")
    );
    assert_eq!(
      locate_raw_output(temp.path(), Os::Linux).unwrap(),
      temp.path().join("main.dist")
    );
  }

  #[test]
  fn clean_dist_removes_partial_output() {
    let temp = TempDir::new().unwrap();
    let dist = temp.path().join("dist/release");
    fs::create_dir_all(dist.join("main.dist")).unwrap();

    clean_dist(&dist).unwrap();

    assert!(!dist.exists());
    clean_dist(&dist).unwrap();
  }

  #[test]
  fn intermediates_removed_products_kept() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("main.build/module")).unwrap();
    fs::create_dir_all(temp.path().join("main.dist")).unwrap();
    fs::create_dir_all(temp.path().join("MTools_Linux_amd64")).unwrap();
    fs::write(temp.path().join("MTools_Linux_amd64.tar.gz"), "archive").unwrap();

    assert_eq!(remove_intermediates(temp.path()), 2);
    assert!(temp.path().join("MTools_Linux_amd64").is_dir());
    assert!(temp.path().join("MTools_Linux_amd64.tar.gz").is_file());
    assert_eq!(remove_intermediates(&temp.path().join("missing")), 0);
  }

  #[tokio::test]
  async fn failure_is_propagated_with_exit_code() {
    let temp = TempDir::new().unwrap();
    let proj = project(temp.path());
    let (config, manifest) = config(BuildMode::Release, Os::Linux);
    let runner = RecordingRunner::with_responder(|_| failed(2, "Nuitka-Plugins: FATAL"));

    let err = invoke_freeze(&runner, CommandSpec::new("python"), &config, &manifest, &bundle(&proj), &proj)
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::CommandFailed { code: Some(2), .. }));
    assert!(err.to_string().contains("Nuitka-Plugins: FATAL"));
    assert_eq!(runner.calls().len(), 1);
  }

  #[tokio::test]
  async fn freezer_runs_as_python_module() {
    let temp = TempDir::new().unwrap();
    let proj = project(temp.path());
    let (config, manifest) = config(BuildMode::Release, Os::Linux);
    fs::create_dir_all(dist_dir(&proj, BuildMode::Release).join("main.dist")).unwrap();
    let runner = RecordingRunner::new();

    let raw = invoke_freeze(&runner, CommandSpec::new("python"), &config, &manifest, &bundle(&proj), &proj)
      .await
      .unwrap();

    let call = &runner.calls()[0];
    assert_eq!(&call.args[..2], &["-m", "nuitka"]);
    assert!(raw.ends_with("main.dist"));
    assert!(!call.args.iter().any(|a| a.starts_with("--include-data-files=")));
  }
}
