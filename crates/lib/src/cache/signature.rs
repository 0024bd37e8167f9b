//! Content signatures.
//!
//! A signature is a SHA-256 digest over, in order:
//! 1. a versioned preamble,
//! 2. the action's canonical form: command, each argument, working directory,
//! 3. for each declared input in sorted order, its declared relative name and
//!    the hash of its content.
//!
//! Every field is written with a name and a length prefix, so no two different
//! field sequences produce the same byte stream. File timestamps, the unit id,
//! and the action timeout never participate: two units with the same action and
//! the same input bytes share a signature on any machine.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::consts::SIGNATURE_VERSION;
use crate::unit::BuildUnit;
use crate::util::hash::hash_path;

use super::types::{CacheError, Signature};

fn write_field(hasher: &mut Sha256, name: &str, value: &str) {
  hasher.update(name.as_bytes());
  hasher.update(b"\0");
  hasher.update((value.len() as u64).to_le_bytes());
  hasher.update(value.as_bytes());
}

/// Compute the signature of `unit`, reading relative inputs from `root`.
///
/// Paths in `exclude` are skipped inside directory inputs. Fails with
/// `UnreadableInput` for the first input that cannot be hashed.
pub fn compute_signature(unit: &BuildUnit, root: &Path, exclude: &[&Path]) -> Result<Signature, CacheError> {
  let mut hasher = Sha256::new();
  hasher.update(format!("strata-signature:v{}\n", SIGNATURE_VERSION).as_bytes());

  let action = &unit.action;
  write_field(&mut hasher, "command", &action.command);
  for arg in &action.args {
    write_field(&mut hasher, "arg", arg);
  }
  write_field(&mut hasher, "cwd", action.cwd.as_deref().unwrap_or(""));

  for input in &unit.inputs {
    let content = hash_path(&root.join(input), exclude).map_err(|source| CacheError::UnreadableInput {
      unit: unit.id.clone(),
      path: input.clone(),
      source,
    })?;
    write_field(&mut hasher, "input", &input.replace('\\', "/"));
    write_field(&mut hasher, "content", &content.0);
  }

  Ok(Signature(hex::encode(hasher.finalize())))
}
