//! Composition root for one build invocation.
//!
//! The orchestrator resolves the plan, decides cache hits, picks the strategy
//! and concurrency limit, runs the scheduler, and condenses the results into
//! a [`BuildReport`]. It alone decides whether an invocation succeeded.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::{ArtifactStore, ContentCache};
use crate::execute::{
  self, BuildResult, BuildStatus, ExecuteConfig, ProcessExecutor, UnitExecutor, available_parallelism,
};
use crate::graph::{ExecutionPlan, GraphError, resolve};
use crate::strategy::{self, SchedulingHint, Strategy, StrategyRequest};
use crate::unit::{UnitId, UnitRegistry};

#[derive(Debug, Error)]
pub enum OrchestrateError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// The plan was resolved from a different registry.
  #[error("execution plan does not match the registry: unit {unit} is missing")]
  PlanMismatch { unit: UnitId },
}

/// Outcome of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
  pub strategy: Strategy,
  pub concurrency_limit: usize,
  /// One result per unit, in level order.
  pub results: Vec<BuildResult>,
  /// True iff no unit failed, was skipped for a failed dependency, or was cancelled.
  pub success: bool,
  /// Fraction of units with a verified cache hit, whatever the strategy did
  /// with them; 1.0 for an empty build.
  pub cache_hit_ratio: f64,
  pub duration_ms: u64,
}

impl BuildReport {
  pub fn count(&self, status: BuildStatus) -> usize {
    self.results.iter().filter(|r| r.status == status).count()
  }

  pub fn result(&self, id: &UnitId) -> Option<&BuildResult> {
    self.results.iter().find(|r| &r.id == id)
  }

  /// Results that did not complete, in level order.
  pub fn problems(&self) -> impl Iterator<Item = &BuildResult> {
    self.results.iter().filter(|r| !r.status.is_ok())
  }
}

/// Runs build invocations against one content cache.
///
/// Invocations take `&mut self`, so two never overlap on the same cache.
pub struct Orchestrator<S> {
  cache: ContentCache<S>,
  config: ExecuteConfig,
  hint: Option<SchedulingHint>,
}

impl<S: ArtifactStore> Orchestrator<S> {
  pub fn new(store: S, config: ExecuteConfig) -> Self {
    let mut cache = ContentCache::new(store, config.root.clone());
    cache.set_enabled(config.use_cache);
    if let Some(cache_dir) = &config.cache_dir {
      cache.exclude(cache_dir);
    }
    Self {
      cache,
      config,
      hint: None,
    }
  }

  /// Attach advice from earlier invocations. Read-only; may be stale.
  pub fn with_hint(mut self, hint: Option<SchedulingHint>) -> Self {
    self.hint = hint;
    self
  }

  pub fn cache(&self) -> &ContentCache<S> {
    &self.cache
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  /// Resolve `registry` and build it with subprocess actions.
  pub async fn run(
    &mut self,
    registry: &UnitRegistry,
    request: StrategyRequest,
    cancel: &CancellationToken,
  ) -> Result<BuildReport, OrchestrateError> {
    let plan = resolve(registry)?;
    let executor = Arc::new(ProcessExecutor::new(&self.config));
    self.run_build(&plan, registry, request, executor, cancel).await
  }

  /// Build an already resolved plan with the given executor.
  pub async fn run_build<E: UnitExecutor>(
    &mut self,
    plan: &ExecutionPlan,
    registry: &UnitRegistry,
    request: StrategyRequest,
    executor: Arc<E>,
    cancel: &CancellationToken,
  ) -> Result<BuildReport, OrchestrateError> {
    if let Some(unit) = plan.ordered_units().find(|id| !registry.contains(id)) {
      return Err(OrchestrateError::PlanMismatch { unit: unit.clone() });
    }
    if let Some(unit) = registry.ids().find(|id| plan.level_of(id).is_none()) {
      return Err(OrchestrateError::PlanMismatch { unit: unit.clone() });
    }

    let started = Instant::now();
    let hint = self.hint.as_ref();

    let decisions = self.cache.decide(plan, registry);
    let strategy = match request {
      StrategyRequest::Auto => strategy::select(plan.max_width(), decisions.hit_ratio(), hint),
      StrategyRequest::Explicit(strategy) => strategy,
    };
    let limit = strategy::parallel_limit(self.config.jobs, hint, available_parallelism());
    let options = strategy.schedule(limit);

    info!(
      %strategy,
      requested = ?request,
      concurrency_limit = options.concurrency_limit,
      verified_hits = decisions.hit_count(),
      units = plan.unit_count(),
      "starting build"
    );

    let results = execute::run(plan, registry, &decisions, &options, executor, &self.cache, cancel).await;

    let success = results.iter().all(|r| r.status.is_ok());
    let cache_hit_ratio = decisions.hit_ratio();
    let duration_ms = started.elapsed().as_millis() as u64;

    info!(success, cache_hit_ratio, duration_ms, "build finished");

    Ok(BuildReport {
      strategy,
      concurrency_limit: options.concurrency_limit,
      results,
      success,
      cache_hit_ratio,
      duration_ms,
    })
  }
}
