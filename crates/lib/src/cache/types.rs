//! Cache entry, lookup, and decision types.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::unit::UnitId;
use crate::util::hash::HashError;

use super::store::StoreError;

/// Cache entry format version.
pub const CACHE_ENTRY_VERSION: u32 = 1;

/// A content signature: the SHA-256 of a unit's action and input content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl std::fmt::Display for Signature {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// What a successful build of a unit left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
  pub exit_code: i32,
  pub duration_ms: u64,
  /// Tail of the action's stdout.
  #[serde(default)]
  pub output: String,
  pub completed_at_unix: u64,
}

impl ArtifactRecord {
  /// Record a completed build, stamped with the current time.
  pub fn completed(exit_code: i32, duration: Duration, output: String) -> Self {
    Self {
      exit_code,
      duration_ms: duration.as_millis() as u64,
      output,
      completed_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }
}

/// A stored cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub version: u32,
  pub unit: UnitId,
  pub signature: Signature,
  pub artifact: ArtifactRecord,
}

/// Why a unit must be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum MissReason {
  /// No entry stored for the unit.
  NotCached,
  /// The stored signature differs from the current one; the entry was evicted.
  SignatureChanged { previous: Signature },
  /// An input could not be hashed, so the unit has no signature.
  UnreadableInput { message: String },
  /// A dependency (directly or transitively) is being rebuilt.
  Upstream { cause: UnitId },
  /// Caching is disabled for this invocation.
  Disabled,
  /// The stored entry could not be read or parsed.
  Corrupt { message: String },
}

impl std::fmt::Display for MissReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MissReason::NotCached => write!(f, "not cached"),
      MissReason::SignatureChanged { .. } => write!(f, "inputs changed"),
      MissReason::UnreadableInput { message } => write!(f, "unreadable input: {}", message),
      MissReason::Upstream { cause } => write!(f, "dependency {} rebuilt", cause),
      MissReason::Disabled => write!(f, "cache disabled"),
      MissReason::Corrupt { message } => write!(f, "corrupt entry: {}", message),
    }
  }
}

/// Result of looking up a unit in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
  Hit(ArtifactRecord),
  Miss(MissReason),
}

impl Lookup {
  pub fn is_hit(&self) -> bool {
    matches!(self, Lookup::Hit(_))
  }
}

/// The cache verdict for one unit in one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDecision {
  /// The unit's signature, or `None` when an input was unreadable.
  pub signature: Option<Signature>,
  pub lookup: Lookup,
}

impl CacheDecision {
  pub fn is_hit(&self) -> bool {
    self.lookup.is_hit()
  }

  pub fn miss_reason(&self) -> Option<&MissReason> {
    match &self.lookup {
      Lookup::Miss(reason) => Some(reason),
      Lookup::Hit(_) => None,
    }
  }
}

/// Cache verdicts for every unit of an invocation.
#[derive(Debug, Clone, Default)]
pub struct CacheDecisions {
  decisions: HashMap<UnitId, CacheDecision>,
}

impl CacheDecisions {
  pub fn insert(&mut self, id: UnitId, decision: CacheDecision) {
    self.decisions.insert(id, decision);
  }

  pub fn get(&self, id: &UnitId) -> Option<&CacheDecision> {
    self.decisions.get(id)
  }

  /// Whether `id` is a verified hit. Unknown units are misses.
  pub fn is_hit(&self, id: &UnitId) -> bool {
    self.decisions.get(id).is_some_and(CacheDecision::is_hit)
  }

  pub fn signature(&self, id: &UnitId) -> Option<&Signature> {
    self.decisions.get(id).and_then(|d| d.signature.as_ref())
  }

  pub fn hit_count(&self) -> usize {
    self.decisions.values().filter(|d| d.is_hit()).count()
  }

  pub fn len(&self) -> usize {
    self.decisions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.decisions.is_empty()
  }

  /// Fraction of units that are verified hits; 1.0 when there are no units.
  pub fn hit_ratio(&self) -> f64 {
    if self.decisions.is_empty() {
      return 1.0;
    }
    self.hit_count() as f64 / self.decisions.len() as f64
  }

  /// Ids of units that must be rebuilt, sorted.
  pub fn misses(&self) -> Vec<&UnitId> {
    let mut ids: Vec<&UnitId> = self
      .decisions
      .iter()
      .filter(|(_, d)| !d.is_hit())
      .map(|(id, _)| id)
      .collect();
    ids.sort();
    ids
  }
}

/// Errors raised by the content cache.
#[derive(Debug, Error)]
pub enum CacheError {
  /// An input path could not be hashed.
  ///
  /// Never fatal: the unit is rebuilt without caching.
  #[error("unreadable input {path} for unit {unit}: {source}")]
  UnreadableInput {
    unit: UnitId,
    path: String,
    #[source]
    source: HashError,
  },

  #[error("artifact store error: {0}")]
  Store(#[from] StoreError),

  #[error("failed to serialize cache entry: {0}")]
  Serialize(#[from] serde_json::Error),
}
