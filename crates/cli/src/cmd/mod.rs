mod build;
mod cache;
mod history;
mod plan;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use strata_lib::consts::{ARTIFACTS_DIR, CACHE_DIR_NAME, HISTORY_FILENAME};
use strata_lib::unit::{UnitManifest, UnitRegistry};

pub use build::{BuildArgs, cmd_build};
pub use cache::{CacheCommand, cmd_cache};
pub use history::cmd_history;
pub use plan::cmd_plan;

/// Where a manifest lives and where its cache goes.
pub struct Project {
  pub manifest_path: PathBuf,
  /// Directory relative unit paths resolve against.
  pub root: PathBuf,
  pub cache_dir: PathBuf,
}

impl Project {
  /// Locate the project for `manifest`.
  ///
  /// The manifest itself need not exist; only commands that read units load it.
  pub fn locate(manifest: &Path, cache_dir: Option<&Path>) -> Result<Self> {
    let parent = match manifest.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };
    let root = dunce::canonicalize(parent)
      .with_context(|| format!("Failed to resolve manifest directory: {}", parent.display()))?;
    // Absolute and, when it already exists, canonical, so it compares equal to
    // the same directory reached through the manifest root
    let cache_dir = match cache_dir {
      Some(dir) => dunce::canonicalize(dir)
        .or_else(|_| std::path::absolute(dir))
        .with_context(|| format!("Failed to resolve cache directory: {}", dir.display()))?,
      None => root.join(CACHE_DIR_NAME),
    };

    Ok(Self {
      manifest_path: manifest.to_path_buf(),
      root,
      cache_dir,
    })
  }

  pub fn load_registry(&self) -> Result<UnitRegistry> {
    let manifest = UnitManifest::load(&self.manifest_path)?;
    Ok(manifest.into_registry()?)
  }

  pub fn artifacts_dir(&self) -> PathBuf {
    self.cache_dir.join(ARTIFACTS_DIR)
  }

  pub fn history_path(&self) -> PathBuf {
    self.cache_dir.join(HISTORY_FILENAME)
  }
}
