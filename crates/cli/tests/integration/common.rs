//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own project directory holding the manifest, the unit
/// inputs, and the default `.strata` cache.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Create a project with the given manifest content.
  pub fn with_manifest(content: &str) -> Self {
    let env = Self::empty();
    std::fs::write(&env.manifest_path, content).unwrap();
    env
  }

  /// Create an empty project. No manifest is written.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("strata.json");
    Self { temp, manifest_path }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Default cache directory of the project.
  pub fn cache_path(&self) -> PathBuf {
    self.temp.path().join(".strata")
  }

  /// Get a Command for the strata binary, run from the project directory.
  ///
  /// Clears `STRATA_CACHE_DIR` so the default cache location applies.
  pub fn strata_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("strata");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("STRATA_CACHE_DIR");
    cmd
  }

  /// Run `strata build -o json` and parse the report.
  pub fn build_json(&self, extra_args: &[&str]) -> (bool, serde_json::Value) {
    let output = self
      .strata_cmd()
      .args(["build", "-o", "json"])
      .args(extra_args)
      .output()
      .unwrap();
    let report = serde_json::from_slice(&output.stdout)
      .unwrap_or_else(|e| panic!("invalid report JSON ({}): {}", e, String::from_utf8_lossy(&output.stdout)));
    (output.status.success(), report)
  }
}

/// Status of unit `id` in a JSON build report.
pub fn unit_status<'a>(report: &'a serde_json::Value, id: &str) -> &'a str {
  report["results"]
    .as_array()
    .unwrap()
    .iter()
    .find(|r| r["id"] == id)
    .unwrap_or_else(|| panic!("unit {} not in report", id))["status"]
    .as_str()
    .unwrap()
}

/// A manifest for core <- lib <- app plus an independent docs unit.
///
/// Each unit reads one source file and appends its id to `build.log`.
#[cfg(unix)]
pub const PROJECT_MANIFEST: &str = r#"{
  "units": [
    { "id": "core", "action": { "command": "echo core >> build.log" }, "inputs": ["src/core.c"] },
    { "id": "lib", "dependencies": ["core"], "action": { "command": "echo lib >> build.log" }, "inputs": ["src/lib.c"] },
    { "id": "app", "dependencies": ["lib"], "action": { "command": "echo app >> build.log" }, "inputs": ["src/app.c"] },
    { "id": "docs", "action": { "command": "echo docs >> build.log" }, "inputs": ["docs"] }
  ]
}"#;

#[cfg(unix)]
pub fn project_env() -> TestEnv {
  let env = TestEnv::with_manifest(PROJECT_MANIFEST);
  env.write_file("src/core.c", "int core(void);");
  env.write_file("src/lib.c", "int lib(void);");
  env.write_file("src/app.c", "int main(void) { return 0; }");
  env.write_file("docs/index.md", "# Docs");
  env
}

/// Lines of `build.log`, i.e. which units actually ran.
pub fn build_log(env: &TestEnv) -> Vec<String> {
  std::fs::read_to_string(env.path().join("build.log"))
    .unwrap_or_default()
    .lines()
    .map(str::to_string)
    .collect()
}
