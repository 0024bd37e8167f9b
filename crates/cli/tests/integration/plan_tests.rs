use predicates::prelude::*;

use super::common::TestEnv;

const DIAMOND: &str = r#"{
  "units": [
    { "id": "d", "dependencies": ["b", "c"], "action": { "command": "exit 0" } },
    { "id": "c", "dependencies": ["a"], "action": { "command": "exit 0" } },
    { "id": "b", "dependencies": ["a"], "action": { "command": "exit 0" } },
    { "id": "a", "action": { "command": "exit 0" } }
  ]
}"#;

#[test]
fn plan_prints_levels() {
  let env = TestEnv::with_manifest(DIAMOND);

  env
    .strata_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Level 0:"))
    .stdout(predicate::str::contains("Level 2:"))
    .stdout(predicate::str::contains("Widest level: 2"));
}

#[test]
fn plan_json_lists_sorted_levels() {
  let env = TestEnv::with_manifest(DIAMOND);

  let output = env.strata_cmd().args(["plan", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["levels"], serde_json::json!([["a"], ["b", "c"], ["d"]]));
  assert_eq!(json["units"], 4);
}

#[test]
fn plan_does_not_run_actions() {
  let env = TestEnv::with_manifest(r#"{ "units": [ { "id": "a", "action": { "command": "touch ran" } } ] }"#);

  env.strata_cmd().arg("plan").assert().success();
  assert!(!env.path().join("ran").exists());
}

#[test]
fn plan_reports_cycles() {
  let env = TestEnv::with_manifest(
    r#"{
      "units": [
        { "id": "a", "dependencies": ["b"], "action": { "command": "exit 0" } },
        { "id": "b", "dependencies": ["a"], "action": { "command": "exit 0" } }
      ]
    }"#,
  );

  env
    .strata_cmd()
    .arg("plan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle detected"));
}

#[test]
fn plan_reports_unknown_dependencies() {
  let env = TestEnv::with_manifest(
    r#"{ "units": [ { "id": "a", "dependencies": ["ghost"], "action": { "command": "exit 0" } } ] }"#,
  );

  env
    .strata_cmd()
    .arg("plan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("ghost"));
}

#[test]
fn plan_with_explicit_manifest_path() {
  let env = TestEnv::empty();
  env.write_file("nested/units.json", DIAMOND);

  env
    .strata_cmd()
    .args(["plan", "nested/units.json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Units: 4"));
}
