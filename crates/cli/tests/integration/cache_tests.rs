#![cfg(unix)]

use predicates::prelude::*;

use super::common::project_env;

#[test]
fn status_before_build_shows_nothing_cached() {
  let env = project_env();

  env
    .strata_cmd()
    .args(["cache", "status"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Fresh: 0 of 4"));
}

#[test]
fn status_after_build_tracks_changes() {
  let env = project_env();
  env.build_json(&[]);
  env.write_file("src/core.c", "int core(int);");

  let output = env.strata_cmd().args(["cache", "status", "-o", "json"]).output().unwrap();
  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

  assert_eq!(json["entries"], 4);
  let state = |id: &str| {
    json["units"]
      .as_array()
      .unwrap()
      .iter()
      .find(|u| u["id"] == id)
      .unwrap()["state"]
      .as_str()
      .unwrap()
      .to_string()
  };
  assert_eq!(state("core"), "stale");
  assert_eq!(state("docs"), "fresh");
}

#[test]
fn status_flags_unreadable_inputs() {
  let env = project_env();
  std::fs::remove_file(env.path().join("src/app.c")).unwrap();

  env
    .strata_cmd()
    .args(["cache", "status"])
    .assert()
    .success()
    .stderr(predicate::str::contains("unreadable inputs"));
}

#[test]
fn clear_forces_full_rebuild() {
  let env = project_env();
  env.build_json(&[]);

  env
    .strata_cmd()
    .args(["cache", "clear"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed 4 cache entries"));

  let (ok, report) = env.build_json(&[]);
  assert!(ok);
  assert_eq!(report["cache_hit_ratio"], 0.0);
}
