//! Implementation of the `strata build` command.
//!
//! Loads a unit manifest and builds it against the project's cache:
//! - Takes the exclusive cache lock
//! - Loads the build history and derives a scheduling hint
//! - Runs the orchestrator, cancelling on Ctrl-C
//! - Records the outcome in the history

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strata_lib::cache::{CacheLock, FsStore, LockMode};
use strata_lib::execute::{BuildStatus, ExecuteConfig};
use strata_lib::history::BuildHistory;
use strata_lib::orchestrator::{BuildReport, Orchestrator};
use strata_lib::strategy::StrategyRequest;

use crate::output::{OutputFormat, format_duration, format_ratio, print_json, print_stat, print_success, print_unit};

use super::Project;

/// Options of a build invocation.
pub struct BuildArgs {
  pub strategy: StrategyRequest,
  pub jobs: Option<usize>,
  pub timeout: Option<Duration>,
  pub use_cache: bool,
}

pub fn cmd_build(manifest: &Path, cache_dir: Option<&Path>, args: BuildArgs, output: OutputFormat) -> Result<()> {
  let project = Project::locate(manifest, cache_dir)?;
  let registry = project
    .load_registry()
    .with_context(|| format!("Failed to load manifest: {}", manifest.display()))?;

  let _lock =
    CacheLock::acquire(&project.cache_dir, LockMode::Exclusive, "build").context("Failed to acquire cache lock")?;

  let history_path = project.history_path();
  let mut history = BuildHistory::load(&history_path);

  let mut config = ExecuteConfig {
    root: project.root.clone(),
    jobs: args.jobs,
    use_cache: args.use_cache,
    cache_dir: Some(project.cache_dir.clone()),
    ..ExecuteConfig::default()
  };
  if let Some(timeout) = args.timeout {
    config.default_timeout = timeout;
  }

  let mut orchestrator = Orchestrator::new(FsStore::new(project.artifacts_dir()), config).with_hint(history.hint());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let cancel = CancellationToken::new();
  let interrupt = cancel.clone();
  rt.spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, waiting for running units to finish");
      interrupt.cancel();
    }
  });

  let report = rt
    .block_on(orchestrator.run(&registry, args.strategy, &cancel))
    .context("Build failed")?;

  history.record(&report);
  if let Err(e) = history.save(&history_path) {
    warn!(error = %e, "failed to save build history");
  }
  info!(path = %history_path.display(), "history updated");

  if output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
  }

  if !report.success {
    let incomplete = report.problems().count();
    bail!("{} of {} units did not complete", incomplete, report.results.len());
  }

  Ok(())
}

fn print_report(report: &BuildReport) {
  for result in &report.results {
    let detail = match (&result.status, &result.error) {
      (BuildStatus::SkippedCached, _) => "(cached)".to_string(),
      (_, Some(error)) => format!("({})", error),
      _ => format!("({})", format_duration(result.duration)),
    };
    print_unit(result.status, result.id.as_str(), &detail);
  }

  println!();
  if report.success {
    print_success("Build complete!");
  }
  print_stat("Strategy", &format!("{} (limit {})", report.strategy, report.concurrency_limit));
  print_stat("Built", &report.count(BuildStatus::Success).to_string());
  print_stat("Cached", &report.count(BuildStatus::SkippedCached).to_string());
  if !report.success {
    print_stat("Failed", &report.count(BuildStatus::Failure).to_string());
    print_stat("Skipped", &report.count(BuildStatus::SkippedDependencyFailed).to_string());
    print_stat("Cancelled", &report.count(BuildStatus::Cancelled).to_string());
  }
  print_stat("Cache hit ratio", &format_ratio(report.cache_hit_ratio));
  print_stat("Duration", &format_duration(Duration::from_millis(report.duration_ms)));
}
