//! JSON unit manifests.
//!
//! The manifest is the hand-off format between an external analyzer and the
//! engine:
//!
//! ```json
//! {
//!   "units": [
//!     {
//!       "id": "core",
//!       "dependencies": [],
//!       "action": { "command": "make", "cwd": "core", "timeout_secs": 600 },
//!       "inputs": ["core/src", "core/Makefile"]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative `cwd` and `inputs` paths are interpreted against the directory
//! that contains the manifest.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BuildUnit, RegistryError, UnitRegistry};

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Registry(#[from] RegistryError),
}

/// The list of units produced by an analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitManifest {
  #[serde(default)]
  pub units: Vec<BuildUnit>,
}

impl UnitManifest {
  /// Load a manifest from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    Self::parse(&content).map_err(|source| ManifestError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Parse a manifest from JSON text.
  pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(content)
  }

  /// Move the units into a registry, rejecting duplicate ids.
  pub fn into_registry(self) -> Result<UnitRegistry, ManifestError> {
    Ok(UnitRegistry::from_units(self.units)?)
  }
}
