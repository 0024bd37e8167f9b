//! Content-addressed build cache.
//!
//! Each unit's signature covers its action and the bytes of its declared
//! inputs. A stored entry is valid only while its signature matches the
//! freshly computed one. Any miss cascades: every unit that transitively
//! depends on a rebuilt unit is forced to miss too, before scheduling starts.

pub mod lock;
pub mod signature;
pub mod store;
pub mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::consts::KEY_HASH_PREFIX_LEN;
use crate::graph::{DependencyGraph, ExecutionPlan};
use crate::unit::{BuildUnit, UnitId, UnitRegistry};
use crate::util::hash::hash_bytes;

pub use lock::{CacheLock, CacheLockError, LockMode};
pub use signature::compute_signature;
pub use store::{ArtifactStore, FsStore, MemoryStore, StoreError};
pub use types::{
  ArtifactRecord, CACHE_ENTRY_VERSION, CacheDecision, CacheDecisions, CacheEntry, CacheError, Lookup, MissReason,
  Signature,
};

/// Derive the store key for a unit id.
///
/// Ids may be arbitrary paths, so the key is a truncated hash of the id.
pub fn store_key(id: &UnitId) -> String {
  hash_bytes(id.as_str().as_bytes()).prefix(KEY_HASH_PREFIX_LEN).to_string()
}

/// The content cache over an injected artifact store.
///
/// Forced misses are per invocation: [`ContentCache::decide`] clears them
/// before evaluating a plan.
pub struct ContentCache<S> {
  store: S,
  root: PathBuf,
  /// Paths skipped when hashing directory inputs.
  excluded: Vec<PathBuf>,
  enabled: bool,
  /// Forced-miss units, each mapped to the rebuilt unit that caused it.
  forced: HashMap<UnitId, UnitId>,
}

impl<S: ArtifactStore> ContentCache<S> {
  /// Create a cache reading unit inputs relative to `root`.
  pub fn new(store: S, root: impl Into<PathBuf>) -> Self {
    Self {
      store,
      root: root.into(),
      excluded: Vec::new(),
      enabled: true,
      forced: HashMap::new(),
    }
  }

  /// Skip `path` when hashing directory inputs, typically the cache's own
  /// directory. Relative paths resolve against the root.
  pub fn exclude(&mut self, path: impl AsRef<Path>) {
    let path = self.root.join(path);
    if !self.excluded.contains(&path) {
      self.excluded.push(path);
    }
  }

  /// Enable or disable lookups. A disabled cache still records successes.
  pub fn set_enabled(&mut self, enabled: bool) {
    self.enabled = enabled;
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn store_backend(&self) -> &S {
    &self.store
  }

  /// Compute the content signature of `unit`.
  pub fn signature(&self, unit: &BuildUnit) -> Result<Signature, CacheError> {
    let excluded: Vec<&Path> = self.excluded.iter().map(PathBuf::as_path).collect();
    compute_signature(unit, &self.root, &excluded)
  }

  /// Look `unit` up against a freshly computed `signature`.
  ///
  /// A stored entry whose signature differs is evicted, even when the unit is
  /// a forced miss. Store failures degrade to a miss.
  pub fn lookup(&self, unit: &BuildUnit, signature: &Signature) -> Lookup {
    let key = store_key(&unit.id);

    let stored = match self.read_entry(&key) {
      Ok(stored) => stored,
      Err(reason) => {
        warn!(unit = %unit.id, %reason, "discarding unusable cache entry");
        if let Err(e) = self.store.remove(&key) {
          warn!(unit = %unit.id, error = %e, "failed to remove cache entry");
        }
        return Lookup::Miss(reason);
      }
    };

    let stale = stored.as_ref().filter(|entry| entry.signature != *signature || entry.unit != unit.id);
    if let Some(entry) = stale {
      debug!(unit = %unit.id, previous = %entry.signature, "evicting stale cache entry");
      if let Err(e) = self.store.remove(&key) {
        warn!(unit = %unit.id, error = %e, "failed to evict stale cache entry");
      }
    }

    if let Some(cause) = self.forced.get(&unit.id) {
      return Lookup::Miss(MissReason::Upstream { cause: cause.clone() });
    }

    match stored {
      None => Lookup::Miss(MissReason::NotCached),
      Some(entry) if entry.signature != *signature || entry.unit != unit.id => {
        Lookup::Miss(MissReason::SignatureChanged {
          previous: entry.signature,
        })
      }
      Some(entry) => Lookup::Hit(entry.artifact),
    }
  }

  fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, MissReason> {
    let bytes = match self.store.get(key) {
      Ok(Some(bytes)) => bytes,
      Ok(None) => return Ok(None),
      Err(e) => return Err(MissReason::Corrupt { message: e.to_string() }),
    };

    let entry: CacheEntry =
      serde_json::from_slice(&bytes).map_err(|e| MissReason::Corrupt { message: e.to_string() })?;

    if entry.version != CACHE_ENTRY_VERSION {
      return Err(MissReason::Corrupt {
        message: format!("unsupported entry version {}", entry.version),
      });
    }

    Ok(Some(entry))
  }

  /// Record a successful build of `id`. Last write wins.
  pub fn store(&self, id: &UnitId, signature: &Signature, artifact: ArtifactRecord) -> Result<(), CacheError> {
    let entry = CacheEntry {
      version: CACHE_ENTRY_VERSION,
      unit: id.clone(),
      signature: signature.clone(),
      artifact,
    };
    let bytes = serde_json::to_vec_pretty(&entry)?;
    self.store.put(&store_key(id), &bytes)?;
    debug!(unit = %id, %signature, "stored cache entry");
    Ok(())
  }

  /// Force every unit that transitively depends on `id` to miss.
  ///
  /// The first recorded cause for a unit is kept.
  pub fn invalidate_dependents(&mut self, graph: &DependencyGraph, id: &UnitId) {
    for dependent in graph.transitive_dependents(id) {
      self.forced.entry(dependent).or_insert_with(|| id.clone());
    }
  }

  /// Whether `id` has been forced to miss in this invocation.
  pub fn is_forced(&self, id: &UnitId) -> bool {
    self.forced.contains_key(id)
  }

  /// Decide hit or miss for every unit of `plan`, in level order.
  ///
  /// Dependencies are always decided before their dependents, so a miss
  /// anywhere upstream has already forced the dependent by the time it is
  /// looked up.
  pub fn decide(&mut self, plan: &ExecutionPlan, registry: &UnitRegistry) -> CacheDecisions {
    self.forced.clear();
    let mut decisions = CacheDecisions::default();

    for id in plan.ordered_units() {
      let Some(unit) = registry.get(id) else {
        continue;
      };

      let decision = match self.signature(unit) {
        Err(e) => {
          warn!(unit = %id, error = %e, "unreadable input, unit will be rebuilt without caching");
          CacheDecision {
            signature: None,
            lookup: Lookup::Miss(MissReason::UnreadableInput { message: e.to_string() }),
          }
        }
        Ok(signature) if !self.enabled => CacheDecision {
          signature: Some(signature),
          lookup: Lookup::Miss(MissReason::Disabled),
        },
        Ok(signature) => {
          let lookup = self.lookup(unit, &signature);
          CacheDecision {
            signature: Some(signature),
            lookup,
          }
        }
      };

      match decision.miss_reason() {
        None => debug!(unit = %id, "cache hit"),
        Some(reason) => {
          debug!(unit = %id, %reason, "cache miss");
          self.invalidate_dependents(plan.graph(), id);
        }
      }

      decisions.insert(id.clone(), decision);
    }

    decisions
  }

  /// All readable entries in the store, sorted by unit id.
  pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
    let mut entries = Vec::new();
    for key in self.store.keys()? {
      match self.read_entry(&key) {
        Ok(Some(entry)) => entries.push(entry),
        Ok(None) => {}
        Err(reason) => warn!(%key, %reason, "skipping unreadable cache entry"),
      }
    }
    entries.sort_by(|a, b| a.unit.cmp(&b.unit));
    Ok(entries)
  }

  /// Remove every stored entry, returning how many were removed.
  pub fn clear(&self) -> Result<usize, CacheError> {
    Ok(self.store.clear()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::resolve;
  use crate::unit::UnitRegistry;
  use crate::util::testutil::{ok_script, unit, unit_with_inputs};
  use std::fs;
  use std::sync::Arc;
  use std::time::Duration;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  struct Fixture {
    temp: TempDir,
    store: Arc<MemoryStore>,
    registry: UnitRegistry,
  }

  impl Fixture {
    /// core <- lib <- app, plus an unrelated docs unit.
    fn new() -> Self {
      let temp = TempDir::new().unwrap();
      for name in ["core.c", "lib.c", "app.c", "docs.md"] {
        fs::write(temp.path().join(name), name).unwrap();
      }
      let registry = UnitRegistry::from_units([
        unit_with_inputs("core", &[], ok_script(), &["core.c"]),
        unit_with_inputs("lib", &["core"], ok_script(), &["lib.c"]),
        unit_with_inputs("app", &["lib"], ok_script(), &["app.c"]),
        unit_with_inputs("docs", &[], ok_script(), &["docs.md"]),
      ])
      .unwrap();
      Self {
        temp,
        store: Arc::new(MemoryStore::new()),
        registry,
      }
    }

    fn cache(&self) -> ContentCache<Arc<MemoryStore>> {
      ContentCache::new(self.store.clone(), self.temp.path())
    }

    /// Decide, then store every unit with a signature as if it built.
    fn warm(&self) {
      let plan = resolve(&self.registry).unwrap();
      let mut cache = self.cache();
      let decisions = cache.decide(&plan, &self.registry);
      for id in self.registry.ids() {
        let signature = decisions.signature(id).unwrap();
        cache.store(id, signature, artifact()).unwrap();
      }
    }

    fn decide(&self) -> CacheDecisions {
      let plan = resolve(&self.registry).unwrap();
      self.cache().decide(&plan, &self.registry)
    }
  }

  fn artifact() -> ArtifactRecord {
    ArtifactRecord::completed(0, Duration::from_millis(12), "ok".to_string())
  }

  fn id(s: &str) -> UnitId {
    UnitId::from(s)
  }

  #[test]
  fn store_key_is_stable_and_short() {
    assert_eq!(store_key(&id("a/b")), store_key(&id("a/b")));
    assert_ne!(store_key(&id("a/b")), store_key(&id("a/c")));
    assert_eq!(store_key(&id("a/b")).len(), KEY_HASH_PREFIX_LEN);
  }

  #[test]
  fn cold_cache_misses_everything() {
    let fixture = Fixture::new();
    let decisions = fixture.decide();
    assert_eq!(decisions.hit_count(), 0);
    assert_eq!(
      decisions.get(&id("core")).unwrap().miss_reason(),
      Some(&MissReason::NotCached)
    );
    // lib is downstream of a miss
    assert_eq!(
      decisions.get(&id("lib")).unwrap().miss_reason(),
      Some(&MissReason::Upstream { cause: id("core") })
    );
  }

  #[test]
  fn warm_cache_hits_everything() {
    let fixture = Fixture::new();
    fixture.warm();

    let decisions = fixture.decide();
    assert_eq!(decisions.hit_count(), 4);
    assert_eq!(decisions.hit_ratio(), 1.0);
  }

  #[test]
  fn changed_input_cascades_to_dependents_only() {
    let fixture = Fixture::new();
    fixture.warm();
    fs::write(fixture.temp.path().join("core.c"), "int changed;").unwrap();

    let decisions = fixture.decide();
    assert!(matches!(
      decisions.get(&id("core")).unwrap().miss_reason(),
      Some(MissReason::SignatureChanged { .. })
    ));
    assert_eq!(
      decisions.get(&id("lib")).unwrap().miss_reason(),
      Some(&MissReason::Upstream { cause: id("core") })
    );
    assert_eq!(
      decisions.get(&id("app")).unwrap().miss_reason(),
      Some(&MissReason::Upstream { cause: id("core") })
    );
    assert!(decisions.is_hit(&id("docs")));
  }

  #[test]
  fn stale_entry_is_evicted() {
    let fixture = Fixture::new();
    fixture.warm();
    assert_eq!(fixture.store.len(), 4);

    fs::write(fixture.temp.path().join("docs.md"), "rewritten").unwrap();
    fixture.decide();
    assert_eq!(fixture.store.len(), 3);
  }

  #[test]
  fn forced_miss_still_evicts_stale_entry() {
    let fixture = Fixture::new();
    fixture.warm();
    fs::write(fixture.temp.path().join("core.c"), "new core").unwrap();
    fs::write(fixture.temp.path().join("lib.c"), "new lib").unwrap();

    let decisions = fixture.decide();
    assert_eq!(
      decisions.get(&id("lib")).unwrap().miss_reason(),
      Some(&MissReason::Upstream { cause: id("core") })
    );
    // core and lib evicted, app kept for a later run
    assert_eq!(fixture.store.len(), 2);
  }

  #[test]
  fn timeout_change_keeps_hit() {
    let mut fixture = Fixture::new();
    fixture.warm();

    let mut units: Vec<BuildUnit> = fixture.registry.iter().cloned().collect();
    for unit in &mut units {
      unit.action.timeout_secs = Some(1);
    }
    fixture.registry = UnitRegistry::from_units(units).unwrap();

    assert_eq!(fixture.decide().hit_count(), 4);
  }

  #[test]
  #[traced_test]
  fn unreadable_input_is_forced_miss() {
    let fixture = Fixture::new();
    fixture.warm();
    fs::remove_file(fixture.temp.path().join("lib.c")).unwrap();

    let decisions = fixture.decide();
    let lib = decisions.get(&id("lib")).unwrap();
    assert!(lib.signature.is_none());
    assert!(matches!(lib.miss_reason(), Some(MissReason::UnreadableInput { .. })));
    assert_eq!(
      decisions.get(&id("app")).unwrap().miss_reason(),
      Some(&MissReason::Upstream { cause: id("lib") })
    );
    assert!(decisions.is_hit(&id("core")));
    assert!(logs_contain("unreadable input"));
  }

  #[test]
  fn disabled_cache_misses_but_computes_signatures() {
    let fixture = Fixture::new();
    fixture.warm();

    let plan = resolve(&fixture.registry).unwrap();
    let mut cache = fixture.cache();
    cache.set_enabled(false);
    let decisions = cache.decide(&plan, &fixture.registry);

    assert_eq!(decisions.hit_count(), 0);
    assert!(decisions.signature(&id("app")).is_some());
    assert_eq!(
      decisions.get(&id("core")).unwrap().miss_reason(),
      Some(&MissReason::Disabled)
    );
  }

  #[test]
  fn corrupt_entry_is_miss_and_removed() {
    let fixture = Fixture::new();
    fixture.warm();
    fixture.store.put(&store_key(&id("docs")), b"not json").unwrap();

    let decisions = fixture.decide();
    assert!(matches!(
      decisions.get(&id("docs")).unwrap().miss_reason(),
      Some(MissReason::Corrupt { .. })
    ));
    assert_eq!(fixture.store.get(&store_key(&id("docs"))).unwrap(), None);
  }

  #[test]
  fn invalidate_dependents_records_first_cause() {
    let registry = UnitRegistry::from_units([
      unit("a", &[], ok_script()),
      unit("b", &[], ok_script()),
      unit("c", &["a", "b"], ok_script()),
      unit("d", &["c"], ok_script()),
    ])
    .unwrap();
    let plan = resolve(&registry).unwrap();
    let temp = TempDir::new().unwrap();
    let mut cache = ContentCache::new(MemoryStore::new(), temp.path());

    cache.invalidate_dependents(plan.graph(), &id("a"));
    cache.invalidate_dependents(plan.graph(), &id("b"));

    assert!(!cache.is_forced(&id("a")));
    assert!(!cache.is_forced(&id("b")));
    assert!(cache.is_forced(&id("c")));
    assert!(cache.is_forced(&id("d")));

    let signature = cache.signature(registry.get(&id("d")).unwrap()).unwrap();
    assert_eq!(
      cache.lookup(registry.get(&id("d")).unwrap(), &signature),
      Lookup::Miss(MissReason::Upstream { cause: id("a") })
    );
  }

  #[test]
  fn store_last_write_wins() {
    let temp = TempDir::new().unwrap();
    let registry = UnitRegistry::from_units([unit("a", &[], ok_script())]).unwrap();
    let cache = ContentCache::new(MemoryStore::new(), temp.path());
    let unit = registry.get(&id("a")).unwrap();
    let signature = cache.signature(unit).unwrap();

    cache.store(&unit.id, &signature, artifact()).unwrap();
    let second = ArtifactRecord::completed(0, Duration::from_millis(99), "second".to_string());
    cache.store(&unit.id, &signature, second.clone()).unwrap();

    assert_eq!(cache.lookup(unit, &signature), Lookup::Hit(second));
  }

  #[test]
  fn entries_and_clear_on_fs_store() {
    let fixture = Fixture::new();
    let store_dir = fixture.temp.path().join(".strata/artifacts");
    let plan = resolve(&fixture.registry).unwrap();
    let mut cache = ContentCache::new(FsStore::new(&store_dir), fixture.temp.path());
    let decisions = cache.decide(&plan, &fixture.registry);
    for unit_id in ["core", "docs"] {
      let unit_id = id(unit_id);
      cache
        .store(&unit_id, decisions.signature(&unit_id).unwrap(), artifact())
        .unwrap();
    }

    let entries = cache.entries().unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.unit.as_str()).collect();
    assert_eq!(ids, vec!["core", "docs"]);

    assert_eq!(cache.clear().unwrap(), 2);
    assert!(cache.entries().unwrap().is_empty());
  }

  #[test]
  fn project_wide_input_hits_when_cache_dir_is_excluded() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("main.c"), "int main(void) { return 0; }").unwrap();
    let registry = UnitRegistry::from_units([unit_with_inputs("all", &[], ok_script(), &["."])]).unwrap();
    let plan = resolve(&registry).unwrap();
    let all = id("all");

    let mut cache = ContentCache::new(FsStore::new(temp.path().join(".strata/artifacts")), temp.path());
    cache.exclude(".strata");

    let first = cache.decide(&plan, &registry);
    assert!(!first.is_hit(&all));
    cache.store(&all, first.signature(&all).unwrap(), artifact()).unwrap();

    let second = cache.decide(&plan, &registry);
    assert!(second.is_hit(&all));
    assert_eq!(first.signature(&all), second.signature(&all));
  }

  #[test]
  fn unexcluded_cache_dir_changes_project_wide_input() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("main.c"), "int main(void) { return 0; }").unwrap();
    let registry = UnitRegistry::from_units([unit_with_inputs("all", &[], ok_script(), &["."])]).unwrap();
    let plan = resolve(&registry).unwrap();
    let all = id("all");

    let mut cache = ContentCache::new(FsStore::new(temp.path().join(".strata/artifacts")), temp.path());
    let first = cache.decide(&plan, &registry);
    cache.store(&all, first.signature(&all).unwrap(), artifact()).unwrap();

    let second = cache.decide(&plan, &registry);
    assert!(!second.is_hit(&all));
  }
}
