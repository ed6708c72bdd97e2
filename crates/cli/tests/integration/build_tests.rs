//! Build command integration tests.

use std::fs;

use predicates::prelude::*;

use super::common::TestEnv;

fn archives_in(dir: &std::path::Path) -> Vec<String> {
  fs::read_dir(dir)
    .map(|entries| {
      entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".tar.gz") || n.ends_with(".zip"))
        .collect()
    })
    .unwrap_or_default()
}

#[test]
fn build_produces_product_and_archive() {
  let env = TestEnv::new();

  env
    .mtpack_cmd("build")
    .arg("--no-sync")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"))
    .stdout(predicate::str::contains("MTools_"));

  let archives = archives_in(&env.dist_dir("release"));
  assert_eq!(archives.len(), 1, "expected one archive, found {:?}", archives);
  assert!(archives[0].starts_with("MTools_"));
  assert!(!env.dist_dir("release").join("main.dist").exists());
  assert!(!env.dist_dir("release").join("main.build").exists());
  assert!(env.project_dir.join("src/assets/.flet.tar.gz").exists());
}

#[test]
fn app_config_module_names_the_product() {
  let env = TestEnv::new();
  env.write_project_file("src/constants/app_config.py", "APP_TITLE = \"Demo - A demo app\"\n");

  env
    .mtpack_cmd("build")
    .arg("--no-sync")
    .assert()
    .success()
    .stdout(predicate::str::contains("Demo_"));

  let archives = archives_in(&env.dist_dir("release"));
  assert!(archives[0].starts_with("Demo_"), "{:?}", archives);
  assert!(env.tool_log().contains("--output-filename=Demo"));
}

#[test]
fn project_file_name_beats_app_config_module() {
  let env = TestEnv::new();
  env.write_project_file("mtpack.toml", "[app]\nname = \"MTools\"\n");
  env.write_project_file("src/constants/app_config.py", "APP_TITLE = \"Demo - A demo app\"\n");

  env.mtpack_cmd("build").arg("--no-sync").assert().success();

  assert!(archives_in(&env.dist_dir("release"))[0].starts_with("MTools_"));
}

#[test]
fn dev_build_uses_its_own_output_dir() {
  let env = TestEnv::new();

  env.mtpack_cmd("build").args(["--no-sync", "--mode", "dev"]).assert().success();

  assert_eq!(archives_in(&env.dist_dir("dev")).len(), 1);
  assert!(!env.dist_dir("release").exists());
  let log = env.tool_log();
  assert!(log.contains("--python-flag=no_site"));
  assert!(!log.contains("--python-flag=-O"));
}

#[test]
fn json_output_describes_artifact() {
  let env = TestEnv::new();

  env
    .mtpack_cmd("build")
    .args(["--no-sync", "--output", "json", "--archive", "zip"])
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""runtime_version": "0.28.3""#))
    .stdout(predicate::str::contains(".zip"));
}

#[test]
fn freezer_failure_fails_the_build() {
  let env = TestEnv::new();

  env
    .mtpack_cmd("build")
    .arg("--no-sync")
    .env("FAKE_FREEZE_FAIL", "1")
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed with exit code 3"))
    .stderr(predicate::str::contains("freezer exploded"));

  assert!(archives_in(&env.dist_dir("release")).is_empty());
  assert!(!env.dist_dir("release").join("main.build").exists());
  assert!(!env.dist_dir("release").join("main.dist").exists());
}

#[test]
fn stale_output_is_cleaned_before_freezing() {
  let env = TestEnv::new();
  env.write_project_file("dist/release/leftover.dist/partial.bin", "half-written");

  env.mtpack_cmd("build").arg("--no-sync").assert().success();

  assert!(!env.dist_dir("release").join("leftover.dist").exists());
}

#[test]
fn upx_disabled_never_invokes_upx() {
  let env = TestEnv::new();

  env.mtpack_cmd("build").arg("--no-sync").assert().success();

  assert!(!env.tool_log().lines().any(|call| call.starts_with("upx")));
}

#[test]
fn invalid_variant_runs_no_tools() {
  let env = TestEnv::new();

  env
    .mtpack_cmd("build")
    .env("CUDA_VARIANT", "cuda2")
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown GPU variant"));

  assert!(env.tool_log().is_empty());
}

#[cfg(target_os = "linux")]
mod linux {
  use super::*;

  #[test]
  fn upx_compresses_the_main_executable() {
    let env = TestEnv::new();

    env.mtpack_cmd("build").args(["--no-sync", "--upx"]).assert().success();

    let log = env.tool_log();
    assert!(log.contains("upx --version"));
    assert!(log.contains("upx --best --lzma"));
    assert!(log.contains("MTools.bin"));
  }

  #[test]
  fn cuda_build_swaps_backend_before_freezing() {
    let env = TestEnv::new();

    env
      .mtpack_cmd("build")
      .env("CUDA_VARIANT", "cuda")
      .assert()
      .success();

    let log = env.tool_log();
    let uninstall = log.find("-m pip uninstall -y onnxruntime").unwrap();
    let install = log.find("-m pip install onnxruntime-gpu==1.22.0").unwrap();
    let freeze = log.find("-m nuitka").unwrap();
    assert!(uninstall < install && install < freeze);
    assert!(log.starts_with("patchelf --version"));
    let archives = archives_in(&env.dist_dir("release"));
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("MTools_Linux_"));
    assert!(archives[0].ends_with("_CUDA.tar.gz"));
  }

  #[test]
  fn foreign_icons_are_dropped_from_product() {
    let env = TestEnv::new();

    env.mtpack_cmd("build").arg("--no-sync").assert().success();

    let product = fs::read_dir(env.dist_dir("release"))
      .unwrap()
      .filter_map(Result::ok)
      .map(|e| e.path())
      .find(|p| p.is_dir())
      .unwrap();
    let assets = product.join("src/assets");
    assert!(assets.join("icon.png").exists());
    assert!(!assets.join("icon.ico").exists());
    assert!(!assets.join("icon.icns").exists());
  }
}
