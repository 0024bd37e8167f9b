//! Build history types.

use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::Strategy;

/// Current history file format version.
pub const HISTORY_VERSION: u32 = 1;

/// Number of individual invocations kept in the history.
pub const MAX_RECORDS: usize = 100;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
  pub started_at_unix: u64,
  pub strategy: Strategy,
  pub concurrency_limit: usize,
  pub success: bool,
  pub duration_ms: u64,
  pub cache_hit_ratio: f64,
  pub unit_count: usize,
}

/// Lifetime totals for one strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStats {
  pub success_count: u64,
  pub failure_count: u64,
  pub total_duration_ms: u64,
}

impl StrategyStats {
  pub fn runs(&self) -> u64 {
    self.success_count + self.failure_count
  }

  pub fn success_rate(&self) -> f64 {
    match self.runs() {
      0 => 0.0,
      runs => self.success_count as f64 / runs as f64,
    }
  }

  pub fn average_duration_ms(&self) -> f64 {
    match self.runs() {
      0 => 0.0,
      runs => self.total_duration_ms as f64 / runs as f64,
    }
  }

  /// Preference score: mostly success rate, with a bonus for speed.
  pub fn score(&self) -> f64 {
    let average_secs = self.average_duration_ms() / 1000.0;
    0.7 * self.success_rate() + 0.3 / (average_secs + 1.0)
  }
}

/// Summary over the retained records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStatistics {
  pub total_builds: usize,
  pub successful_builds: usize,
  pub success_rate: f64,
  pub average_duration_ms: f64,
  pub average_cache_hit_ratio: f64,
  pub strategies: BTreeMap<Strategy, StrategyStats>,
}

#[derive(Debug, Error)]
pub enum HistoryError {
  #[error("failed to create history directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to write history: {0}")]
  Write(#[source] io::Error),

  #[error("failed to serialize history: {0}")]
  Serialize(#[source] serde_json::Error),
}
