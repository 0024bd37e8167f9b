#![cfg(unix)]

use predicates::prelude::*;

use super::common::{TestEnv, build_log, project_env, unit_status};

#[test]
fn first_build_runs_everything() {
  let env = project_env();

  env
    .strata_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"));

  let mut log = build_log(&env);
  log.sort();
  assert_eq!(log, vec!["app", "core", "docs", "lib"]);
  assert!(env.cache_path().join("artifacts").is_dir());
  assert!(env.cache_path().join("history.json").is_file());
}

#[test]
fn unchanged_rebuild_is_fully_cached() {
  let env = project_env();
  let (ok, first) = env.build_json(&[]);
  assert!(ok);
  assert_eq!(first["cache_hit_ratio"], 0.0);

  let (ok, second) = env.build_json(&[]);
  assert!(ok);
  assert_eq!(second["strategy"], "incremental");
  assert_eq!(second["cache_hit_ratio"], 1.0);
  assert_eq!(build_log(&env).len(), 4);
}

#[test]
fn changed_input_rebuilds_dependents_only() {
  let env = project_env();
  env.build_json(&[]);
  std::fs::remove_file(env.path().join("build.log")).unwrap();

  env.write_file("src/lib.c", "int lib(int);");
  let (ok, report) = env.build_json(&[]);

  assert!(ok);
  assert_eq!(unit_status(&report, "core"), "skipped-cached");
  assert_eq!(unit_status(&report, "docs"), "skipped-cached");
  assert_eq!(unit_status(&report, "lib"), "success");
  assert_eq!(unit_status(&report, "app"), "success");
  assert_eq!(build_log(&env), vec!["lib", "app"]);
}

#[test]
fn no_cache_rebuilds_everything() {
  let env = project_env();
  env.build_json(&[]);

  let (ok, report) = env.build_json(&["--no-cache"]);
  assert!(ok);
  assert_eq!(report["cache_hit_ratio"], 0.0);
  assert_eq!(build_log(&env).len(), 8);
}

#[test]
fn failing_unit_poisons_dependents_and_exits_nonzero() {
  let env = TestEnv::with_manifest(
    r#"{
      "units": [
        { "id": "A", "action": { "command": "exit 3" } },
        { "id": "B", "dependencies": ["A"], "action": { "command": "touch b" } },
        { "id": "C", "dependencies": ["A"], "action": { "command": "touch c" } }
      ]
    }"#,
  );

  env
    .strata_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("3 of 3 units did not complete"));

  let (ok, report) = env.build_json(&[]);
  assert!(!ok);
  assert_eq!(report["success"], false);
  assert_eq!(unit_status(&report, "A"), "failure");
  assert_eq!(unit_status(&report, "B"), "skipped-dependency-failed");
  assert_eq!(unit_status(&report, "C"), "skipped-dependency-failed");
  assert!(!env.path().join("b").exists());
  assert!(!env.path().join("c").exists());
}

#[test]
fn timeout_fails_unit() {
  let env = TestEnv::with_manifest(
    r#"{ "units": [ { "id": "slow", "action": { "command": "sleep 10", "timeout_secs": 1 } } ] }"#,
  );

  let (ok, report) = env.build_json(&[]);
  assert!(!ok);
  assert_eq!(unit_status(&report, "slow"), "failure");
  assert_eq!(report["results"][0]["error"]["kind"], "timeout");
}

#[test]
fn explicit_strategy_and_jobs_are_reported() {
  let env = project_env();
  let (ok, report) = env.build_json(&["--strategy", "sequential"]);
  assert!(ok);
  assert_eq!(report["strategy"], "sequential");
  assert_eq!(report["concurrency_limit"], 1);

  let (ok, report) = env.build_json(&["--strategy", "parallel", "--jobs", "2"]);
  assert!(ok);
  assert_eq!(report["strategy"], "parallel");
  assert_eq!(report["concurrency_limit"], 2);
}

#[test]
fn cache_dir_flag_and_env_override_location() {
  let env = project_env();
  let custom = env.path().join("custom-cache");

  env
    .strata_cmd()
    .args(["build", "--cache-dir"])
    .arg(&custom)
    .assert()
    .success();
  assert!(custom.join("artifacts").is_dir());

  let from_env = env.path().join("env-cache");
  env
    .strata_cmd()
    .env("STRATA_CACHE_DIR", &from_env)
    .arg("build")
    .assert()
    .success();
  assert!(from_env.join("history.json").is_file());
  assert!(!env.cache_path().exists());
}

#[test]
fn history_reports_recorded_builds() {
  let env = project_env();
  env.build_json(&[]);
  env.build_json(&[]);

  env
    .strata_cmd()
    .arg("history")
    .assert()
    .success()
    .stdout(predicate::str::contains("Last 2 builds"));

  let output = env.strata_cmd().args(["history", "-o", "json"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["statistics"]["total_builds"], 2);
  assert_eq!(json["statistics"]["success_rate"], 1.0);
}

const WHOLE_PROJECT_MANIFEST: &str = r#"{
  "units": [ { "id": "all", "action": { "command": "true" }, "inputs": ["."] } ]
}"#;

#[test]
fn whole_project_input_is_cached_despite_cache_dir_inside_it() {
  let env = TestEnv::with_manifest(WHOLE_PROJECT_MANIFEST);
  env.write_file("src/main.c", "int main(void) { return 0; }");

  let (ok, first) = env.build_json(&[]);
  assert!(ok);
  assert_eq!(first["cache_hit_ratio"], 0.0);

  for _ in 0..2 {
    let (ok, report) = env.build_json(&[]);
    assert!(ok);
    assert_eq!(report["cache_hit_ratio"], 1.0);
    assert_eq!(unit_status(&report, "all"), "skipped-cached");
  }

  env.write_file("src/main.c", "int main(void) { return 1; }");
  let (_, report) = env.build_json(&[]);
  assert_eq!(unit_status(&report, "all"), "success");
}

#[test]
fn relative_cache_dir_inside_project_is_excluded() {
  let env = TestEnv::with_manifest(WHOLE_PROJECT_MANIFEST);
  env.write_file("src/main.c", "int main(void) { return 0; }");

  let (ok, _) = env.build_json(&["--cache-dir", "build-cache"]);
  assert!(ok);
  assert!(env.path().join("build-cache/artifacts").is_dir());

  let (ok, report) = env.build_json(&["--cache-dir", "build-cache"]);
  assert!(ok);
  assert_eq!(report["cache_hit_ratio"], 1.0);
}

#[test]
fn explicit_parallel_reports_verified_hits() {
  let env = project_env();
  env.build_json(&[]);

  let (ok, report) = env.build_json(&["--strategy", "parallel"]);
  assert!(ok);
  assert_eq!(report["cache_hit_ratio"], 1.0);
  assert_eq!(unit_status(&report, "core"), "success");
}
