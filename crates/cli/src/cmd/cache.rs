//! Implementation of the `strata cache` commands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use strata_lib::cache::{CacheEntry, CacheLock, ContentCache, FsStore, LockMode};
use strata_lib::consts::MANIFEST_FILENAME;
use strata_lib::unit::UnitId;

use crate::output::{
  OutputFormat, format_age, format_duration, print_info, print_json, print_stat, print_success, print_warning,
  truncate_hash,
};

use super::Project;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Show which units have a valid cache entry
  Status {
    /// Path to the unit manifest
    #[arg(default_value = MANIFEST_FILENAME)]
    manifest: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove every cache entry
  Clear {
    /// Path to the unit manifest
    #[arg(default_value = MANIFEST_FILENAME)]
    manifest: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

/// Cache state of one unit, judged from its own inputs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum EntryState {
  /// Stored signature matches the current inputs.
  Fresh,
  /// Stored signature no longer matches.
  Stale,
  /// Nothing stored.
  Missing,
  /// An input could not be read.
  Unreadable,
}

#[derive(Serialize)]
struct UnitStatus {
  id: UnitId,
  state: EntryState,
  #[serde(skip_serializing_if = "Option::is_none")]
  signature: Option<String>,
}

#[derive(Serialize)]
struct StatusOutput {
  cache_dir: PathBuf,
  entries: usize,
  units: Vec<UnitStatus>,
}

pub fn cmd_cache(command: CacheCommand, cache_dir: Option<&Path>) -> Result<()> {
  match command {
    CacheCommand::Status { manifest, output } => cache_status(&manifest, cache_dir, output),
    CacheCommand::Clear { manifest, output } => cache_clear(&manifest, cache_dir, output),
  }
}

fn cache_status(manifest: &Path, cache_dir: Option<&Path>, output: OutputFormat) -> Result<()> {
  let project = Project::locate(manifest, cache_dir)?;
  let registry = project
    .load_registry()
    .with_context(|| format!("Failed to load manifest: {}", manifest.display()))?;

  let _lock =
    CacheLock::acquire(&project.cache_dir, LockMode::Shared, "cache status").context("Failed to acquire cache lock")?;

  let mut cache = ContentCache::new(FsStore::new(project.artifacts_dir()), project.root.clone());
  cache.exclude(&project.cache_dir);
  let entries: HashMap<UnitId, CacheEntry> = cache
    .entries()
    .context("Failed to read cache entries")?
    .into_iter()
    .map(|entry| (entry.unit.clone(), entry))
    .collect();

  let units: Vec<UnitStatus> = registry
    .iter()
    .map(|unit| {
      let (state, signature) = match cache.signature(unit) {
        Err(_) => (EntryState::Unreadable, None),
        Ok(signature) => {
          let state = match entries.get(&unit.id) {
            None => EntryState::Missing,
            Some(entry) if entry.signature == signature => EntryState::Fresh,
            Some(_) => EntryState::Stale,
          };
          (state, Some(signature.0))
        }
      };
      UnitStatus {
        id: unit.id.clone(),
        state,
        signature,
      }
    })
    .collect();

  if output.is_json() {
    return print_json(&StatusOutput {
      cache_dir: project.cache_dir,
      entries: entries.len(),
      units,
    });
  }

  for status in &units {
    let signature = status.signature.as_deref().map(truncate_hash).unwrap_or("-");
    let detail = match (status.state, entries.get(&status.id)) {
      (EntryState::Fresh, Some(entry)) => format!(
        "built in {}, {}",
        format_duration(std::time::Duration::from_millis(entry.artifact.duration_ms)),
        format_age(entry.artifact.completed_at_unix)
      ),
      (EntryState::Stale, _) => "inputs changed".to_string(),
      (EntryState::Unreadable, _) => "unreadable input".to_string(),
      _ => "not cached".to_string(),
    };
    println!("  {} {} ({})", status.id, signature, detail);
  }

  let fresh = units.iter().filter(|u| u.state == EntryState::Fresh).count();
  println!();
  print_info(&format!("Cache: {}", project.cache_dir.display()));
  print_stat("Entries", &entries.len().to_string());
  print_stat("Fresh", &format!("{} of {}", fresh, units.len()));

  if units.iter().any(|u| u.state == EntryState::Unreadable) {
    print_warning("Some units have unreadable inputs and will always rebuild");
  }

  Ok(())
}

fn cache_clear(manifest: &Path, cache_dir: Option<&Path>, output: OutputFormat) -> Result<()> {
  let project = Project::locate(manifest, cache_dir)?;

  let _lock =
    CacheLock::acquire(&project.cache_dir, LockMode::Exclusive, "cache clear").context("Failed to acquire cache lock")?;

  let cache = ContentCache::new(FsStore::new(project.artifacts_dir()), project.root.clone());
  let removed = cache.clear().context("Failed to clear cache")?;

  if output.is_json() {
    print_json(&serde_json::json!({ "removed": removed }))?;
  } else {
    print_success(&format!("Removed {} cache entries", removed));
  }

  Ok(())
}
