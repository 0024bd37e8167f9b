//! Implementation of the `strata history` command.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use strata_lib::history::BuildHistory;

use crate::output::{OutputFormat, format_duration, format_ratio, format_timestamp, print_info, print_json, print_stat};

use super::Project;

pub fn cmd_history(manifest: &Path, cache_dir: Option<&Path>, output: OutputFormat) -> Result<()> {
  let project = Project::locate(manifest, cache_dir)?;
  let history = BuildHistory::load(&project.history_path());
  let stats = history.statistics();

  if output.is_json() {
    return print_json(&serde_json::json!({
      "statistics": stats,
      "hint": history.hint(),
    }));
  }

  if stats.total_builds == 0 {
    print_info("No builds recorded yet. Run 'strata build' to record one.");
    return Ok(());
  }

  print_info(&format!("Last {} builds", stats.total_builds));
  print_stat("Succeeded", &format!("{} ({})", stats.successful_builds, format_ratio(stats.success_rate)));
  print_stat(
    "Average duration",
    &format_duration(Duration::from_millis(stats.average_duration_ms as u64)),
  );
  print_stat("Average cache hit ratio", &format_ratio(stats.average_cache_hit_ratio));
  if let Some(last) = history.records.back() {
    print_stat("Last build", &format_timestamp(last.started_at_unix));
  }

  println!();
  println!("Strategies:");
  for (strategy, totals) in &stats.strategies {
    println!(
      "  {}: {} runs, {} succeeded, avg {}",
      strategy,
      totals.runs(),
      format_ratio(totals.success_rate()),
      format_duration(Duration::from_millis(totals.average_duration_ms() as u64))
    );
  }

  if let Some(hint) = history.hint()
    && let Some(preferred) = hint.preferred_strategy
  {
    println!();
    print_info(&format!("Preferred strategy: {}", preferred));
  }

  Ok(())
}
