//! Bundle command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn bundle_is_staged_once() {
  let env = TestEnv::new();

  env
    .mtpack_cmd("bundle")
    .assert()
    .success()
    .stdout(predicate::str::contains("Runtime bundle 0.28.3 staged"));

  env
    .mtpack_cmd("bundle")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));
}

#[test]
fn force_restages_fresh_bundle() {
  let env = TestEnv::new();
  env.mtpack_cmd("bundle").assert().success();

  env
    .mtpack_cmd("bundle")
    .arg("--force")
    .assert()
    .success()
    .stdout(predicate::str::contains("staged"));
}

#[test]
fn upgraded_runtime_restages() {
  let env = TestEnv::new();
  env.mtpack_cmd("bundle").assert().success();

  env
    .mtpack_cmd("bundle")
    .env("FAKE_FLET_VERSION", "0.29.0")
    .assert()
    .success()
    .stdout(predicate::str::contains("Runtime bundle 0.29.0 staged"));
}

#[test]
fn pinned_version_mismatch_fails() {
  let env = TestEnv::new();
  env.write_project_file("mtpack.toml", "[runtime]\nversion = \"0.27.0\"\n");

  env
    .mtpack_cmd("bundle")
    .assert()
    .failure()
    .stderr(predicate::str::contains("expected 0.27.0"));
}

#[test]
fn missing_client_fails() {
  let env = TestEnv::new();
  std::fs::remove_dir_all(env.site_dir.join("flet_desktop/app")).unwrap();

  env
    .mtpack_cmd("bundle")
    .assert()
    .failure()
    .stderr(predicate::str::contains("runtime client directory not found"));
}
