//! Build unit types.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier of a build unit, usually a name or a project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for UnitId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for UnitId {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl From<String> for UnitId {
  fn from(value: String) -> Self {
    Self(value)
  }
}

/// The opaque step that builds a unit.
///
/// When `args` is empty, `command` is handed to the platform shell as a script.
/// Otherwise `command` is executed directly with `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
  pub command: String,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub args: Vec<String>,

  /// Working directory, resolved against the invocation root when relative.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cwd: Option<String>,

  /// Timeout in seconds. Falls back to the configured default when absent.
  #[serde(default, alias = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
  pub timeout_secs: Option<u64>,
}

impl Action {
  /// An action that runs `script` through the shell with no explicit cwd or timeout.
  pub fn shell(script: impl Into<String>) -> Self {
    Self {
      command: script.into(),
      args: Vec::new(),
      cwd: None,
      timeout_secs: None,
    }
  }

  pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  pub fn with_timeout_secs(mut self, secs: u64) -> Self {
    self.timeout_secs = Some(secs);
    self
  }

  /// Whether the command is run through the shell.
  pub fn uses_shell(&self) -> bool {
    self.args.is_empty()
  }

  /// The timeout for this action, or `default` when none is declared.
  pub fn timeout(&self, default: Duration) -> Duration {
    self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
  }

  /// The directory the action runs in.
  pub fn working_dir(&self, root: &Path) -> PathBuf {
    match &self.cwd {
      Some(cwd) => root.join(cwd),
      None => root.to_path_buf(),
    }
  }

  /// Human-readable form of the command line, for logs and errors.
  pub fn display_command(&self) -> String {
    if self.args.is_empty() {
      self.command.clone()
    } else {
      format!("{} {}", self.command, self.args.join(" "))
    }
  }
}

/// One independently buildable piece of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildUnit {
  pub id: UnitId,

  /// Declared dependencies, in declaration order.
  #[serde(default)]
  pub dependencies: Vec<UnitId>,

  pub action: Action,

  /// Input paths that make up the unit's content signature.
  ///
  /// Kept sorted so the signature does not depend on declaration order.
  #[serde(default, alias = "input_paths", alias = "inputPaths")]
  pub inputs: BTreeSet<String>,
}
