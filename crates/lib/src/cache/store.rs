//! Artifact stores.
//!
//! The cache treats its backing storage as an opaque key → bytes map. Two
//! implementations are provided:
//!
//! - [`MemoryStore`]: a sharded concurrent map, for tests and embedders that
//!   persist entries themselves.
//! - [`FsStore`]: one file per key in a directory.
//!
//! # Storage Layout
//!
//! ```text
//! {cache_dir}/artifacts/
//! ├── <key>.json          # CacheEntry for one unit
//! └── <key>.json.tmp      # in-flight write, renamed into place
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

/// Extension used for entry files in an [`FsStore`].
const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create store directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A key → bytes store holding cache entries.
///
/// Implementations must tolerate concurrent calls for distinct keys.
pub trait ArtifactStore: Send + Sync {
  /// Fetch the bytes stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  /// Store `bytes` under `key`, replacing any previous value.
  fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<(), StoreError>;

  /// All stored keys, sorted.
  fn keys(&self) -> Result<Vec<String>, StoreError>;

  /// Remove every entry, returning how many were removed.
  fn clear(&self) -> Result<usize, StoreError> {
    let keys = self.keys()?;
    for key in &keys {
      self.remove(key)?;
    }
    Ok(keys.len())
  }
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    (**self).get(key)
  }

  fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
    (**self).put(key, bytes)
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    (**self).remove(key)
  }

  fn keys(&self) -> Result<Vec<String>, StoreError> {
    (**self).keys()
  }

  fn clear(&self) -> Result<usize, StoreError> {
    (**self).clear()
  }
}

/// In-memory store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl ArtifactStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(self.entries.get(key).map(|entry| entry.value().clone()))
  }

  fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
    self.entries.insert(key.to_string(), bytes.to_vec());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.entries.remove(key);
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, StoreError> {
    let mut keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
    keys.sort();
    Ok(keys)
  }
}

/// Filesystem store: one JSON file per key.
///
/// Writes go to a temp file that is renamed into place, so readers never see
/// a partially written entry.
#[derive(Debug, Clone)]
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  /// Create a store rooted at `base_path`. The directory is created lazily.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn entry_path(&self, key: &str) -> PathBuf {
    self.base_path.join(format!("{}.{}", key, ENTRY_EXTENSION))
  }

  fn ensure_dir(&self) -> Result<(), StoreError> {
    fs::create_dir_all(&self.base_path).map_err(|source| StoreError::CreateDir {
      path: self.base_path.clone(),
      source,
    })
  }
}

impl ArtifactStore for FsStore {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let path = self.entry_path(key);
    match fs::read(&path) {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(StoreError::Read { path, source }),
    }
  }

  fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
    self.ensure_dir()?;

    let path = self.entry_path(key);
    let temp_path = self.base_path.join(format!("{}.{}.tmp", key, ENTRY_EXTENSION));

    fs::write(&temp_path, bytes).map_err(|source| StoreError::Write {
      path: temp_path.clone(),
      source,
    })?;
    fs::rename(&temp_path, &path).map_err(|source| StoreError::Write { path, source })?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let path = self.entry_path(key);
    match fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(StoreError::Remove { path, source }),
    }
  }

  fn keys(&self) -> Result<Vec<String>, StoreError> {
    let read_dir = match fs::read_dir(&self.base_path) {
      Ok(read_dir) => read_dir,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(StoreError::Read {
          path: self.base_path.clone(),
          source,
        });
      }
    };

    let mut keys = Vec::new();
    for entry in read_dir {
      let entry = entry.map_err(|source| StoreError::Read {
        path: self.base_path.clone(),
        source,
      })?;
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
      {
        keys.push(stem.to_string());
      }
    }

    keys.sort();
    Ok(keys)
  }
}
