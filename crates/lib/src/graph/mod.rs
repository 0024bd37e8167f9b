//! Dependency graph resolution.
//!
//! This module validates the dependency edges declared by a [`UnitRegistry`],
//! rejects cycles, and computes the execution levels the scheduler runs.
//!
//! Levels are computed by peeling the graph layer by layer (Kahn's algorithm
//! on layers). Level 0 holds units without dependencies; level `k` holds units
//! whose dependencies all sit in levels `< k`. Each unit lands in the earliest
//! level it can, which maximises the work available to run in parallel.

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

use crate::unit::{UnitId, UnitRegistry};

/// Errors that make a registry unschedulable.
///
/// Both are fatal to the whole invocation: no partial plan is ever produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// A unit declares a dependency that is not in the registry.
  #[error("unit {unit} depends on unknown unit {missing}")]
  UnknownDependency { unit: UnitId, missing: UnitId },

  /// The dependency edges form a cycle.
  ///
  /// `path` starts and ends with the same unit; each unit depends on the next.
  #[error("dependency cycle detected: {}", format_path(.path))]
  CyclicDependency { path: Vec<UnitId> },
}

fn format_path(path: &[UnitId]) -> String {
  path.iter().map(UnitId::as_str).collect::<Vec<_>>().join(" -> ")
}

/// Validated dependency edges between units.
///
/// Edges run from a dependency to its dependent, so incoming neighbours are
/// dependencies and outgoing neighbours are dependents.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
  graph: DiGraph<UnitId, ()>,
  nodes: HashMap<UnitId, NodeIndex>,
}

impl DependencyGraph {
  /// Build the graph, checking that every declared dependency exists.
  fn from_registry(registry: &UnitRegistry) -> Result<Self, GraphError> {
    let mut graph = DiGraph::with_capacity(registry.len(), 0);
    let mut nodes = HashMap::with_capacity(registry.len());

    for id in registry.ids() {
      let idx = graph.add_node(id.clone());
      nodes.insert(id.clone(), idx);
    }

    for unit in registry.iter() {
      let dependent_idx = nodes[&unit.id];
      for dep in &unit.dependencies {
        let Some(&dep_idx) = nodes.get(dep) else {
          return Err(GraphError::UnknownDependency {
            unit: unit.id.clone(),
            missing: dep.clone(),
          });
        };
        graph.add_edge(dep_idx, dependent_idx, ());
      }
    }

    Ok(Self { graph, nodes })
  }

  /// Neighbours of a node in one direction, sorted by id.
  fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
    let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
    neighbors.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
    neighbors
  }

  fn ids_of(&self, indices: impl IntoIterator<Item = NodeIndex>) -> Vec<UnitId> {
    indices.into_iter().map(|idx| self.graph[idx].clone()).collect()
  }

  /// Reject cycles with an iterative depth-first search.
  ///
  /// Each node is unmarked, `Visiting` while it is on the DFS stack, or
  /// `Visited` once all of its dependencies are finished. Reaching a node that
  /// is still `Visiting` means the stack from that node onward is a cycle.
  fn verify_acyclic(&self) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
      Visiting,
      Visited,
    }

    let mut marks: HashMap<NodeIndex, Mark> = HashMap::with_capacity(self.graph.node_count());
    let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
    roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

    for root in roots {
      if marks.contains_key(&root) {
        continue;
      }

      // Pending dependencies are stored reversed so `pop` yields them in id order
      let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = Vec::new();
      marks.insert(root, Mark::Visiting);
      stack.push((root, self.pending_dependencies(root)));

      while let Some((node, pending)) = stack.last_mut() {
        let node = *node;
        let Some(next) = pending.pop() else {
          marks.insert(node, Mark::Visited);
          stack.pop();
          continue;
        };

        match marks.get(&next) {
          Some(Mark::Visited) => {}
          Some(Mark::Visiting) => {
            let start = stack.iter().position(|(idx, _)| *idx == next).unwrap_or(0);
            let mut path = self.ids_of(stack[start..].iter().map(|(idx, _)| *idx));
            path.push(self.graph[next].clone());
            return Err(GraphError::CyclicDependency { path });
          }
          None => {
            marks.insert(next, Mark::Visiting);
            stack.push((next, self.pending_dependencies(next)));
          }
        }
      }
    }

    Ok(())
  }

  fn pending_dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut deps = self.sorted_neighbors(idx, Direction::Incoming);
    deps.reverse();
    deps
  }

  /// Compute execution levels by peeling zero in-degree layers.
  fn levels(&self) -> Result<Vec<Vec<UnitId>>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut frontier: Vec<NodeIndex> = in_degree
      .iter()
      .filter(|(_, deg)| **deg == 0)
      .map(|(idx, _)| *idx)
      .collect();

    let mut levels = Vec::new();
    let mut placed = 0;

    while !frontier.is_empty() {
      let mut next = Vec::new();
      for &idx in &frontier {
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&dependent) {
            *deg = deg.saturating_sub(1);
            if *deg == 0 {
              next.push(dependent);
            }
          }
        }
      }

      placed += frontier.len();
      let mut level = self.ids_of(frontier);
      level.sort();
      levels.push(level);
      frontier = next;
    }

    if placed != self.graph.node_count() {
      // verify_acyclic runs first, so this only trips if the two disagree
      return Err(GraphError::CyclicDependency { path: Vec::new() });
    }

    Ok(levels)
  }

  /// Direct dependencies of a unit, sorted by id.
  pub fn dependencies(&self, id: &UnitId) -> Vec<UnitId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    self.ids_of(self.sorted_neighbors(idx, Direction::Incoming))
  }

  /// Direct dependents of a unit, sorted by id.
  pub fn dependents(&self, id: &UnitId) -> Vec<UnitId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    self.ids_of(self.sorted_neighbors(idx, Direction::Outgoing))
  }

  /// Every unit that depends on `id`, directly or transitively.
  ///
  /// `id` itself is not included.
  pub fn transitive_dependents(&self, id: &UnitId) -> BTreeSet<UnitId> {
    let mut reached = BTreeSet::new();
    let Some(&start) = self.nodes.get(id) else {
      return reached;
    };

    let mut queue = VecDeque::from([start]);
    while let Some(idx) = queue.pop_front() {
      for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
        if reached.insert(self.graph[dependent].clone()) {
          queue.push_back(dependent);
        }
      }
    }

    reached
  }

  pub fn contains(&self, id: &UnitId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }
}

/// A validated graph together with its execution levels.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
  levels: Vec<Vec<UnitId>>,
  graph: DependencyGraph,
}

impl ExecutionPlan {
  /// Levels in execution order; ids within a level are sorted.
  pub fn levels(&self) -> &[Vec<UnitId>] {
    &self.levels
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  pub fn unit_count(&self) -> usize {
    self.graph.len()
  }

  /// Number of units in each level.
  pub fn level_widths(&self) -> Vec<usize> {
    self.levels.iter().map(Vec::len).collect()
  }

  /// Width of the widest level, or 0 for an empty plan.
  pub fn max_width(&self) -> usize {
    self.levels.iter().map(Vec::len).max().unwrap_or(0)
  }

  /// All unit ids in execution order.
  pub fn ordered_units(&self) -> impl Iterator<Item = &UnitId> {
    self.levels.iter().flatten()
  }

  /// Index of the level containing `id`.
  pub fn level_of(&self, id: &UnitId) -> Option<usize> {
    self.levels.iter().position(|level| level.binary_search(id).is_ok())
  }
}

/// Resolve a registry into an execution plan.
///
/// Checks referential integrity, rejects cycles, and computes levels. This is
/// a pure function of the registry.
pub fn resolve(registry: &UnitRegistry) -> Result<ExecutionPlan, GraphError> {
  let graph = DependencyGraph::from_registry(registry)?;
  graph.verify_acyclic()?;
  let levels = graph.levels()?;

  debug!(
    units = graph.len(),
    levels = levels.len(),
    "resolved dependency graph"
  );

  Ok(ExecutionPlan { levels, graph })
}
