//! Build units and the registry that holds them.
//!
//! A build unit is one independently buildable piece of a project: an opaque
//! action, the units it depends on, and the input paths that make up its
//! content signature. Units are registered once per invocation and never
//! mutated afterwards.

pub mod manifest;
pub mod types;

use std::collections::BTreeMap;

use thiserror::Error;

pub use manifest::{ManifestError, UnitManifest};
pub use types::{Action, BuildUnit, UnitId};

/// Errors raised while registering units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
  /// Two units were registered under the same id.
  #[error("duplicate build unit: {0}")]
  DuplicateUnit(UnitId),
}

/// The set of build units for one invocation, keyed and ordered by id.
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
  units: BTreeMap<UnitId, BuildUnit>,
}

impl UnitRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a registry from a list of units.
  ///
  /// Fails on the first duplicate id.
  pub fn from_units(units: impl IntoIterator<Item = BuildUnit>) -> Result<Self, RegistryError> {
    let mut registry = Self::new();
    for unit in units {
      registry.register(unit)?;
    }
    Ok(registry)
  }

  /// Register a unit.
  ///
  /// Repeated dependency ids are collapsed, keeping the first occurrence so the
  /// declared order is preserved.
  pub fn register(&mut self, mut unit: BuildUnit) -> Result<(), RegistryError> {
    if self.units.contains_key(&unit.id) {
      return Err(RegistryError::DuplicateUnit(unit.id));
    }

    let mut seen = std::collections::HashSet::new();
    unit.dependencies.retain(|dep| seen.insert(dep.clone()));

    self.units.insert(unit.id.clone(), unit);
    Ok(())
  }

  pub fn get(&self, id: &UnitId) -> Option<&BuildUnit> {
    self.units.get(id)
  }

  pub fn contains(&self, id: &UnitId) -> bool {
    self.units.contains_key(id)
  }

  /// Iterate over units in id order.
  pub fn iter(&self) -> impl Iterator<Item = &BuildUnit> {
    self.units.values()
  }

  /// Iterate over unit ids in lexicographic order.
  pub fn ids(&self) -> impl Iterator<Item = &UnitId> {
    self.units.keys()
  }

  pub fn len(&self) -> usize {
    self.units.len()
  }

  pub fn is_empty(&self) -> bool {
    self.units.is_empty()
  }
}
