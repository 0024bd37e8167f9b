//! Test utilities for strata-lib.
//!
//! Cross-platform helpers for tests that build units around shell commands.

use std::collections::BTreeSet;

use crate::unit::{Action, BuildUnit, UnitId, UnitRegistry};

/// Returns a shell script that succeeds.
#[cfg(unix)]
pub fn ok_script() -> &'static str {
  "true"
}

#[cfg(windows)]
pub fn ok_script() -> &'static str {
  "exit 0"
}

/// Returns a shell script that exits with the given code.
pub fn exit_script(code: i32) -> String {
  format!("exit {}", code)
}

/// Returns a shell script that sleeps for the given number of seconds.
#[cfg(unix)]
pub fn sleep_script(secs: u64) -> String {
  format!("sleep {}", secs)
}

#[cfg(windows)]
pub fn sleep_script(secs: u64) -> String {
  format!("Start-Sleep -Seconds {}", secs)
}

/// Returns a shell script that creates a marker file in the current directory.
#[cfg(unix)]
pub fn touch_script(filename: &str) -> String {
  format!("touch {}", filename)
}

#[cfg(windows)]
pub fn touch_script(filename: &str) -> String {
  format!("New-Item -ItemType File -Path '{}' -Force | Out-Null", filename)
}

/// Build a unit that runs `script` through the shell.
pub fn unit(id: &str, deps: &[&str], script: &str) -> BuildUnit {
  BuildUnit {
    id: UnitId::from(id),
    dependencies: deps.iter().map(|d| UnitId::from(*d)).collect(),
    action: Action::shell(script),
    inputs: BTreeSet::new(),
  }
}

/// Build a unit with declared input paths.
pub fn unit_with_inputs(id: &str, deps: &[&str], script: &str, inputs: &[&str]) -> BuildUnit {
  BuildUnit {
    inputs: inputs.iter().map(|p| p.to_string()).collect(),
    ..unit(id, deps, script)
  }
}

/// Build a registry from `(id, deps)` pairs whose actions always succeed.
pub fn registry(edges: &[(&str, &[&str])]) -> UnitRegistry {
  UnitRegistry::from_units(edges.iter().map(|(id, deps)| unit(id, deps, ok_script()))).unwrap()
}

/// An in-process executor that records what ran and how many ran at once.
#[derive(Default)]
pub struct RecordingExecutor {
  /// Units that exit with code 1.
  pub failing: std::collections::HashSet<UnitId>,
  /// How long each unit "runs".
  pub delay: std::time::Duration,
  /// Cancelled as soon as any unit starts.
  pub cancel_on_start: Option<tokio_util::sync::CancellationToken>,
  started: std::sync::Mutex<Vec<UnitId>>,
  running: std::sync::atomic::AtomicUsize,
  peak: std::sync::atomic::AtomicUsize,
}

impl RecordingExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing(ids: &[&str]) -> Self {
    Self {
      failing: ids.iter().map(|id| UnitId::from(*id)).collect(),
      ..Self::default()
    }
  }

  pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn cancel_on_start(mut self, token: tokio_util::sync::CancellationToken) -> Self {
    self.cancel_on_start = Some(token);
    self
  }

  /// Ids in the order their actions started.
  pub fn started(&self) -> Vec<UnitId> {
    self.started.lock().unwrap().clone()
  }

  /// Highest number of actions observed running at once.
  pub fn peak(&self) -> usize {
    self.peak.load(std::sync::atomic::Ordering::SeqCst)
  }
}

impl crate::execute::UnitExecutor for RecordingExecutor {
  async fn execute(&self, unit: &BuildUnit) -> Result<crate::execute::ActionOutput, crate::execute::ExecuteError> {
    use std::sync::atomic::Ordering;

    self.started.lock().unwrap().push(unit.id.clone());
    if let Some(token) = &self.cancel_on_start {
      token.cancel();
    }

    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(self.delay).await;
    self.running.fetch_sub(1, Ordering::SeqCst);

    if self.failing.contains(&unit.id) {
      return Err(crate::execute::ExecuteError::Failed { code: Some(1) });
    }
    Ok(crate::execute::ActionOutput {
      exit_code: 0,
      stdout: format!("built {}", unit.id),
    })
  }
}
