//! Implementation of the `strata plan` command.
//!
//! Resolves a manifest and prints its execution levels without running anything.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use strata_lib::graph::resolve;
use strata_lib::unit::UnitId;

use crate::output::{self, OutputFormat, print_json, print_stat, print_success};

use super::Project;

#[derive(Serialize)]
struct PlanOutput<'a> {
  units: usize,
  max_width: usize,
  levels: &'a [Vec<UnitId>],
}

pub fn cmd_plan(manifest: &Path, output: OutputFormat) -> Result<()> {
  let project = Project::locate(manifest, None)?;
  let registry = project
    .load_registry()
    .with_context(|| format!("Failed to load manifest: {}", manifest.display()))?;
  let plan = resolve(&registry).context("Failed to resolve dependencies")?;

  if output.is_json() {
    return print_json(&PlanOutput {
      units: plan.unit_count(),
      max_width: plan.max_width(),
      levels: plan.levels(),
    });
  }

  for (index, level) in plan.levels().iter().enumerate() {
    println!("Level {}:", index);
    for id in level {
      let dependencies = plan.graph().dependencies(id);
      if dependencies.is_empty() {
        println!("  {} {}", output::symbols::INFO, id);
      } else {
        let names: Vec<&str> = dependencies.iter().map(UnitId::as_str).collect();
        println!("  {} {} {} {}", output::symbols::INFO, id, output::symbols::ARROW, names.join(", "));
      }
    }
  }

  println!();
  print_success("Plan resolved");
  print_stat("Units", &plan.unit_count().to_string());
  print_stat("Levels", &plan.levels().len().to_string());
  print_stat("Widest level", &plan.max_width().to_string());

  Ok(())
}
