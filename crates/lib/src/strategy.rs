//! Execution strategies.
//!
//! A strategy fixes two knobs of a scheduler run: how many actions may run at
//! once and whether verified cache hits are skipped. The set of strategies is
//! closed; adding one means extending [`Strategy`] and [`Strategy::schedule`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execute::ScheduleOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
  /// One unit at a time; every unit runs.
  Sequential,
  /// Bounded parallelism; every unit runs.
  Parallel,
  /// Bounded parallelism; verified cache hits are skipped.
  Incremental,
}

impl Strategy {
  pub const ALL: [Strategy; 3] = [Strategy::Sequential, Strategy::Parallel, Strategy::Incremental];

  pub fn as_str(self) -> &'static str {
    match self {
      Strategy::Sequential => "sequential",
      Strategy::Parallel => "parallel",
      Strategy::Incremental => "incremental",
    }
  }

  /// Scheduler options for this strategy given the parallel limit.
  pub fn schedule(self, parallel_limit: usize) -> ScheduleOptions {
    match self {
      Strategy::Sequential => ScheduleOptions {
        concurrency_limit: 1,
        skip_cached: false,
      },
      Strategy::Parallel => ScheduleOptions {
        concurrency_limit: parallel_limit.max(1),
        skip_cached: false,
      },
      Strategy::Incremental => ScheduleOptions {
        concurrency_limit: parallel_limit.max(1),
        skip_cached: true,
      },
    }
  }
}

impl std::fmt::Display for Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown strategy '{0}' (expected auto, sequential, parallel, or incremental)")]
pub struct ParseStrategyError(pub String);

impl FromStr for Strategy {
  type Err = ParseStrategyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "sequential" => Ok(Strategy::Sequential),
      "parallel" => Ok(Strategy::Parallel),
      "incremental" => Ok(Strategy::Incremental),
      _ => Err(ParseStrategyError(s.to_string())),
    }
  }
}

/// The strategy asked for by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyRequest {
  /// Let [`select`] decide from the plan shape and cache state.
  #[default]
  Auto,
  Explicit(Strategy),
}

impl FromStr for StrategyRequest {
  type Err = ParseStrategyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.eq_ignore_ascii_case("auto") {
      return Ok(StrategyRequest::Auto);
    }
    s.parse().map(StrategyRequest::Explicit)
  }
}

/// Advice distilled from earlier invocations. May be absent or stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulingHint {
  pub preferred_strategy: Option<Strategy>,
  pub suggested_concurrency: Option<usize>,
}

/// Pick a strategy from the plan's widest level, the cache hit ratio, and an
/// optional hint.
///
/// Any verified hit makes skipping worthwhile. A plan that is a single chain
/// gains nothing from parallelism. Otherwise the hint may choose between
/// sequential and parallel.
pub fn select(max_level_width: usize, hit_ratio: f64, hint: Option<&SchedulingHint>) -> Strategy {
  if max_level_width == 0 {
    return Strategy::Sequential;
  }
  if hit_ratio > 0.0 {
    return Strategy::Incremental;
  }
  if max_level_width <= 1 {
    return Strategy::Sequential;
  }
  match hint.and_then(|h| h.preferred_strategy) {
    Some(preferred @ (Strategy::Sequential | Strategy::Parallel)) => preferred,
    _ => Strategy::Parallel,
  }
}

/// The parallel limit for an invocation.
///
/// An explicit job count wins, then the hint's suggestion clamped to what the
/// machine offers, then the machine's available parallelism.
pub fn parallel_limit(jobs: Option<usize>, hint: Option<&SchedulingHint>, available: usize) -> usize {
  let available = available.max(1);
  if let Some(jobs) = jobs {
    return jobs.max(1);
  }
  match hint.and_then(|h| h.suggested_concurrency) {
    Some(suggested) => suggested.clamp(1, available),
    None => available,
  }
}
