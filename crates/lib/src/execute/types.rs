//! Types for scheduling and executing build units.
//!
//! This module defines the error types, result types, and configuration
//! used by the scheduler and the process executor.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::cache::Signature;
use crate::consts::DEFAULT_TIMEOUT_SECS;
use crate::unit::UnitId;

/// Outcome of one unit in one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStatus {
  Success,
  Failure,
  SkippedCached,
  SkippedDependencyFailed,
  Cancelled,
}

impl BuildStatus {
  /// Whether this outcome leaves the unit's outputs usable by dependents.
  pub fn is_ok(self) -> bool {
    matches!(self, BuildStatus::Success | BuildStatus::SkippedCached)
  }
}

impl std::fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      BuildStatus::Success => "success",
      BuildStatus::Failure => "failure",
      BuildStatus::SkippedCached => "skipped-cached",
      BuildStatus::SkippedDependencyFailed => "skipped-dependency-failed",
      BuildStatus::Cancelled => "cancelled",
    };
    write!(f, "{}", s)
  }
}

/// Per-unit execution errors.
///
/// These never abort an invocation; they only poison the unit's dependents.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExecuteError {
  /// The action ran past its timeout and was killed.
  #[error("action timed out after {timeout_secs}s")]
  Timeout { timeout_secs: u64 },

  /// The action exited unsuccessfully. `code` is absent when killed by a signal.
  #[error("action failed with exit code {code:?}")]
  Failed { code: Option<i32> },

  /// The action could not be started.
  #[error("failed to spawn `{command}`: {message}")]
  Spawn { command: String, message: String },

  /// I/O error while supervising the action.
  #[error("io error: {message}")]
  Io { message: String },

  /// Cancellation was requested before the unit started.
  #[error("cancelled before start")]
  Cancelled,

  /// A dependency did not complete, so this unit never ran.
  #[error("dependency {dependency} did not complete")]
  DependencyFailed { dependency: UnitId },
}

impl From<std::io::Error> for ExecuteError {
  fn from(e: std::io::Error) -> Self {
    ExecuteError::Io { message: e.to_string() }
  }
}

/// What a successful action produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionOutput {
  pub exit_code: i32,
  /// Tail of stdout, trimmed.
  pub stdout: String,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}

/// Result of one unit in one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
  pub id: UnitId,
  pub status: BuildStatus,

  /// Exit code, when the action ran to completion.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exit_code: Option<i32>,

  #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
  pub duration: Duration,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ExecuteError>,

  /// Content signature, when all inputs were readable.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub signature: Option<Signature>,
}

impl BuildResult {
  /// A result for a unit that never ran.
  pub fn not_run(id: UnitId, status: BuildStatus, error: Option<ExecuteError>, signature: Option<Signature>) -> Self {
    Self {
      id,
      status,
      exit_code: None,
      duration: Duration::ZERO,
      error,
      signature,
    }
  }
}

/// Parameters of one scheduler run, fixed by the chosen strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
  /// Maximum number of actions running at once. Clamped to at least 1.
  pub concurrency_limit: usize,
  /// Report verified cache hits as `skipped-cached` instead of running them.
  pub skip_cached: bool,
}

/// Configuration for an orchestrated build.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Directory relative unit inputs and working directories resolve against.
  pub root: PathBuf,

  /// Explicit concurrency limit. Overrides hints and available parallelism.
  pub jobs: Option<usize>,

  /// Timeout for actions that do not declare one.
  pub default_timeout: Duration,

  /// Shell to use for command execution.
  /// If None, uses /bin/sh (Unix) or powershell.exe (Windows).
  pub shell: Option<String>,

  /// Whether verified cache entries may be used.
  pub use_cache: bool,

  /// Cache directory, skipped when hashing inputs that contain it.
  pub cache_dir: Option<PathBuf>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      root: PathBuf::from("."),
      jobs: None,
      default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
      shell: None,
      use_cache: true,
      cache_dir: None,
    }
  }
}

/// Number of CPUs available to this process.
pub fn available_parallelism() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
