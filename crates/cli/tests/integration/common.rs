//! Shared test helpers for CLI integration tests.
//!
//! Each test gets a project directory and a `bin/` directory of fake tools:
//! a `python` that answers the runtime client lookup, the app config read,
//! `pip` and the freezer, plus
//! `patchelf` and `upx`. Every fake tool appends its arguments to a log file.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

const FAKE_PYTHON: &str = r#"#!/bin/sh
echo "python $*" >> "$FAKE_LOG"
if [ "$1" = "-c" ]; then
  case "$2" in
    *APP_TITLE*)
      echo '{"APP_TITLE": "Demo - A demo app", "APP_VERSION": "2.0.0"}'
      exit 0
      ;;
  esac
  printf '%s\n%s\n' "$FAKE_SITE/flet_desktop" "${FAKE_FLET_VERSION:-0.28.3}"
  exit 0
fi
if [ "$1" = "-m" ] && [ "$2" = "pip" ]; then
  if [ "$3" = "list" ]; then
    echo '[{"name": "onnxruntime", "version": "1.22.0"}, {"name": "flet", "version": "0.28.3"}]'
  fi
  exit 0
fi
if [ "$1" = "-m" ] && [ "$2" = "nuitka" ]; then
  for arg in "$@"; do
    case "$arg" in
      --output-dir=*) out="${arg#--output-dir=}" ;;
      --output-filename=*) exe="${arg#--output-filename=}" ;;
    esac
  done
  mkdir -p "$out/main.build" "$out/main.dist/src/assets"
  if [ -n "$FAKE_FREEZE_FAIL" ]; then
    echo "FATAL: freezer exploded" >&2
    exit 3
  fi
  echo "frozen" > "$out/main.dist/$exe"
  echo "ico" > "$out/main.dist/src/assets/icon.ico"
  echo "icns" > "$out/main.dist/src/assets/icon.icns"
  echo "png" > "$out/main.dist/src/assets/icon.png"
  exit 0
fi
exit 1
"#;

const FAKE_PATCHELF: &str = r#"#!/bin/sh
echo "patchelf $*" >> "$FAKE_LOG"
echo "0.18.0"
"#;

const FAKE_UPX: &str = r#"#!/bin/sh
echo "upx $*" >> "$FAKE_LOG"
echo "upx 4.2.4"
"#;

/// Isolated project plus fake toolchain.
pub struct TestEnv {
  pub temp: TempDir,
  pub project_dir: PathBuf,
  pub bin_dir: PathBuf,
  pub site_dir: PathBuf,
}

fn write_script(path: &Path, content: &str) {
  fs::write(path, content).unwrap();
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();

    let project_dir = root.join("project");
    fs::create_dir_all(project_dir.join("src/assets")).unwrap();
    fs::write(project_dir.join("src/main.py"), "print('hello')\n").unwrap();
    fs::write(project_dir.join("src/assets/icon.png"), "png").unwrap();

    let site_dir = root.join("site");
    let client = site_dir.join("flet_desktop/app");
    fs::create_dir_all(client.join("flet")).unwrap();
    fs::write(client.join("flet/flet"), "client").unwrap();

    let bin_dir = root.join("bin");
    fs::create_dir_all(&bin_dir).unwrap();
    write_script(&bin_dir.join("python"), FAKE_PYTHON);
    write_script(&bin_dir.join("patchelf"), FAKE_PATCHELF);
    write_script(&bin_dir.join("upx"), FAKE_UPX);

    Self {
      temp,
      project_dir,
      bin_dir,
      site_dir,
    }
  }

  /// Write a file relative to the project directory.
  pub fn write_project_file(&self, relative_path: &str, content: &str) {
    let path = self.project_dir.join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  pub fn python(&self) -> PathBuf {
    self.bin_dir.join("python")
  }

  pub fn log_path(&self) -> PathBuf {
    self.temp.path().join("tools.log")
  }

  /// Everything the fake tools were asked to do, one call per line.
  pub fn tool_log(&self) -> String {
    fs::read_to_string(self.log_path()).unwrap_or_default()
  }

  pub fn dist_dir(&self, mode: &str) -> PathBuf {
    self.project_dir.join("dist").join(mode)
  }

  /// Get a pre-configured Command for the mtpack binary.
  ///
  /// The fake tools come first on PATH, and `--python` points at the fake
  /// interpreter.
  pub fn mtpack_cmd(&self, subcommand: &str) -> Command {
    let path = format!("{}:{}", self.bin_dir.display(), std::env::var("PATH").unwrap_or_default());
    let mut cmd: Command = cargo_bin_cmd!("mtpack");
    cmd.env("PATH", path);
    cmd.env("FAKE_LOG", self.log_path());
    cmd.env("FAKE_SITE", &self.site_dir);
    cmd.env_remove("CUDA_VARIANT");
    cmd.arg(subcommand);
    cmd.arg("--project-dir").arg(&self.project_dir);
    cmd.arg("--python").arg(self.python());
    cmd
  }
}
