//! Level-by-level execution of build units.
//!
//! This module provides the scheduler that runs an [`ExecutionPlan`]. It handles:
//! - Strict level ordering: a level is fully drained before the next starts
//! - Bounded concurrency within a level
//! - Failure propagation: dependents of a failed unit are never run
//! - Cooperative cancellation
//! - Recording successes in the content cache as they complete

pub mod process;
pub mod types;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{ArtifactRecord, ArtifactStore, CacheDecisions, ContentCache};
use crate::graph::ExecutionPlan;
use crate::unit::{BuildUnit, UnitId, UnitRegistry};

pub use process::{ProcessExecutor, run_action};
pub use types::{
  ActionOutput, BuildResult, BuildStatus, ExecuteConfig, ExecuteError, ScheduleOptions, available_parallelism,
};

/// Runs the action of a single unit.
///
/// The scheduler owns ordering, concurrency, and failure propagation;
/// implementations only run one action and report how it went.
pub trait UnitExecutor: Send + Sync + 'static {
  fn execute(&self, unit: &BuildUnit) -> impl Future<Output = Result<ActionOutput, ExecuteError>> + Send;
}

type TaskOutcome = (UnitId, Result<ActionOutput, ExecuteError>, Duration);

/// Execute every unit of `plan`, level by level.
///
/// # Arguments
///
/// * `plan` - Resolved levels
/// * `registry` - The units being built
/// * `decisions` - Cache verdicts for this invocation
/// * `options` - Concurrency limit and whether hits are skipped
/// * `executor` - Runs individual actions
/// * `cache` - Receives successful results
/// * `cancel` - Stops new units from starting once cancelled
///
/// # Returns
///
/// One result per unit, in level order.
pub async fn run<E, S>(
  plan: &ExecutionPlan,
  registry: &UnitRegistry,
  decisions: &CacheDecisions,
  options: &ScheduleOptions,
  executor: Arc<E>,
  cache: &ContentCache<S>,
  cancel: &CancellationToken,
) -> Vec<BuildResult>
where
  E: UnitExecutor,
  S: ArtifactStore,
{
  let limit = options.concurrency_limit.max(1);
  info!(
    units = plan.unit_count(),
    levels = plan.levels().len(),
    concurrency_limit = limit,
    skip_cached = options.skip_cached,
    "starting execution"
  );

  let semaphore = Arc::new(Semaphore::new(limit));
  let mut blocked: HashSet<UnitId> = HashSet::new();
  let mut results = Vec::with_capacity(plan.unit_count());

  for (level_idx, level) in plan.levels().iter().enumerate() {
    debug!(level = level_idx, units = level.len(), "executing level");

    let mut level_results: BTreeMap<UnitId, BuildResult> = BTreeMap::new();
    let mut join_set: JoinSet<TaskOutcome> = JoinSet::new();
    let mut task_units = HashMap::new();

    for id in level {
      let Some(unit) = registry.get(id) else {
        continue;
      };
      let signature = decisions.signature(id).cloned();

      if cancel.is_cancelled() {
        blocked.insert(id.clone());
        level_results.insert(
          id.clone(),
          BuildResult::not_run(id.clone(), BuildStatus::Cancelled, Some(ExecuteError::Cancelled), signature),
        );
        continue;
      }

      if let Some(dependency) = unit.dependencies.iter().find(|dep| blocked.contains(*dep)) {
        warn!(unit = %id, dependency = %dependency, "skipping unit due to failed dependency");
        blocked.insert(id.clone());
        level_results.insert(
          id.clone(),
          BuildResult::not_run(
            id.clone(),
            BuildStatus::SkippedDependencyFailed,
            Some(ExecuteError::DependencyFailed {
              dependency: dependency.clone(),
            }),
            signature,
          ),
        );
        continue;
      }

      if options.skip_cached && decisions.is_hit(id) {
        debug!(unit = %id, "skipping cached unit");
        level_results.insert(
          id.clone(),
          BuildResult::not_run(id.clone(), BuildStatus::SkippedCached, None, signature),
        );
        continue;
      }

      let unit = unit.clone();
      let executor = executor.clone();
      let semaphore = semaphore.clone();
      let cancel = cancel.clone();

      let handle = join_set.spawn(async move {
        // Units still waiting for a permit give up once cancelled
        let permit = tokio::select! {
          biased;
          _ = cancel.cancelled() => None,
          permit = semaphore.acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
          return (unit.id, Err(ExecuteError::Cancelled), Duration::ZERO);
        };

        let started = Instant::now();
        let outcome = executor.execute(&unit).await;
        (unit.id, outcome, started.elapsed())
      });
      task_units.insert(handle.id(), id.clone());
    }

    while let Some(joined) = join_set.join_next_with_id().await {
      let (id, outcome, duration) = match joined {
        Ok((_, outcome)) => outcome,
        Err(e) => {
          let Some(id) = task_units.get(&e.id()).cloned() else {
            error!(error = %e, "unit task failed");
            continue;
          };
          error!(unit = %id, error = %e, "unit task panicked");
          let failure = Err(ExecuteError::Io {
            message: format!("unit task panicked: {}", e),
          });
          (id, failure, Duration::ZERO)
        }
      };

      let signature = decisions.signature(&id).cloned();
      let result = match outcome {
        Ok(output) => {
          info!(unit = %id, duration_ms = duration.as_millis() as u64, "unit succeeded");
          if let Some(signature) = &signature {
            let artifact = ArtifactRecord::completed(output.exit_code, duration, output.stdout);
            if let Err(e) = cache.store(&id, signature, artifact) {
              warn!(unit = %id, error = %e, "failed to store cache entry");
            }
          }
          BuildResult {
            id: id.clone(),
            status: BuildStatus::Success,
            exit_code: Some(output.exit_code),
            duration,
            error: None,
            signature,
          }
        }
        Err(ExecuteError::Cancelled) => {
          debug!(unit = %id, "unit cancelled before start");
          blocked.insert(id.clone());
          BuildResult::not_run(id.clone(), BuildStatus::Cancelled, Some(ExecuteError::Cancelled), signature)
        }
        Err(e) => {
          error!(unit = %id, error = %e, "unit failed");
          blocked.insert(id.clone());
          let exit_code = match &e {
            ExecuteError::Failed { code } => *code,
            _ => None,
          };
          BuildResult {
            id: id.clone(),
            status: BuildStatus::Failure,
            exit_code,
            duration,
            error: Some(e),
            signature,
          }
        }
      };
      level_results.insert(id, result);
    }

    results.extend(level_results.into_values());
  }

  info!(
    succeeded = count(&results, BuildStatus::Success),
    cached = count(&results, BuildStatus::SkippedCached),
    failed = count(&results, BuildStatus::Failure),
    skipped = count(&results, BuildStatus::SkippedDependencyFailed),
    cancelled = count(&results, BuildStatus::Cancelled),
    "execution complete"
  );

  results
}

fn count(results: &[BuildResult], status: BuildStatus) -> usize {
  results.iter().filter(|r| r.status == status).count()
}
