//! Persisted build history.
//!
//! Each invocation appends a record; the history keeps the most recent
//! [`MAX_RECORDS`] plus lifetime totals per strategy. From these it derives a
//! [`SchedulingHint`] for the next invocation. The history is loaded before a
//! build and saved after it; a missing or unreadable file is an empty history.
//!
//! # Storage Layout
//!
//! ```text
//! {cache_dir}/
//! ├── history.json        # BuildHistory
//! └── history.json.tmp    # in-flight write, renamed into place
//! ```

pub mod types;

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::orchestrator::BuildReport;
use crate::strategy::{SchedulingHint, Strategy};

pub use types::{BuildRecord, HISTORY_VERSION, HistoryError, HistoryStatistics, MAX_RECORDS, StrategyStats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildHistory {
  pub version: u32,
  pub records: VecDeque<BuildRecord>,
  pub strategies: BTreeMap<Strategy, StrategyStats>,
}

impl Default for BuildHistory {
  fn default() -> Self {
    Self {
      version: HISTORY_VERSION,
      records: VecDeque::new(),
      strategies: BTreeMap::new(),
    }
  }
}

impl BuildHistory {
  /// Load the history at `path`.
  ///
  /// A missing file yields an empty history. An unreadable, corrupt, or
  /// foreign-version file is logged and also yields an empty history.
  pub fn load(path: &Path) -> Self {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to read build history, starting fresh");
        return Self::default();
      }
    };

    match serde_json::from_str::<BuildHistory>(&content) {
      Ok(history) if history.version == HISTORY_VERSION => {
        debug!(path = %path.display(), records = history.records.len(), "loaded build history");
        history
      }
      Ok(history) => {
        warn!(version = history.version, "unsupported build history version, starting fresh");
        Self::default()
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "corrupt build history, starting fresh");
        Self::default()
      }
    }
  }

  /// Save the history to `path`.
  ///
  /// Uses atomic write (write to temp, then rename) to prevent corruption.
  pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(HistoryError::CreateDir)?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");

    let content = serde_json::to_string_pretty(self).map_err(HistoryError::Serialize)?;
    fs::write(&temp_path, content).map_err(HistoryError::Write)?;
    fs::rename(&temp_path, path).map_err(HistoryError::Write)?;

    Ok(())
  }

  /// Append the outcome of an invocation.
  pub fn record(&mut self, report: &BuildReport) {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();

    self.push(BuildRecord {
      started_at_unix: now.saturating_sub(report.duration_ms / 1000),
      strategy: report.strategy,
      concurrency_limit: report.concurrency_limit,
      success: report.success,
      duration_ms: report.duration_ms,
      cache_hit_ratio: report.cache_hit_ratio,
      unit_count: report.results.len(),
    });
  }

  fn push(&mut self, record: BuildRecord) {
    let stats = self.strategies.entry(record.strategy).or_default();
    if record.success {
      stats.success_count += 1;
    } else {
      stats.failure_count += 1;
    }
    stats.total_duration_ms += record.duration_ms;

    self.records.push_back(record);
    while self.records.len() > MAX_RECORDS {
      self.records.pop_front();
    }
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty() && self.strategies.is_empty()
  }

  /// Advice for the next invocation, or `None` without any history.
  ///
  /// The preferred strategy has the best [`StrategyStats::score`]. The
  /// suggested concurrency is that of the latest successful parallel run.
  pub fn hint(&self) -> Option<SchedulingHint> {
    if self.is_empty() {
      return None;
    }

    let preferred_strategy = self
      .strategies
      .iter()
      .filter(|(_, stats)| stats.runs() > 0)
      .max_by(|(_, a), (_, b)| a.score().total_cmp(&b.score()))
      .map(|(strategy, _)| *strategy);

    let suggested_concurrency = self
      .records
      .iter()
      .rev()
      .find(|r| r.success && r.strategy != Strategy::Sequential)
      .map(|r| r.concurrency_limit);

    Some(SchedulingHint {
      preferred_strategy,
      suggested_concurrency,
    })
  }

  /// Totals over the retained records, plus lifetime per-strategy stats.
  pub fn statistics(&self) -> HistoryStatistics {
    let total_builds = self.records.len();
    if total_builds == 0 {
      return HistoryStatistics {
        strategies: self.strategies.clone(),
        ..HistoryStatistics::default()
      };
    }

    let successful_builds = self.records.iter().filter(|r| r.success).count();
    let total_duration: u64 = self.records.iter().map(|r| r.duration_ms).sum();
    let total_hit_ratio: f64 = self.records.iter().map(|r| r.cache_hit_ratio).sum();

    HistoryStatistics {
      total_builds,
      successful_builds,
      success_rate: successful_builds as f64 / total_builds as f64,
      average_duration_ms: total_duration as f64 / total_builds as f64,
      average_cache_hit_ratio: total_hit_ratio / total_builds as f64,
      strategies: self.strategies.clone(),
    }
  }
}
