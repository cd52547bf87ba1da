use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, trace};

use crate::graph::{GraphError, TargetGraph};
use crate::target::{RuleType, TargetId, TargetNode};

/// Synthetic edges linking each target with its declared tests.
///
/// Edges run both ways: a change to a target reaches its tests, and a change
/// to a test reaches the target under test.
fn test_edges(graph: &TargetGraph) -> Result<BTreeMap<&TargetId, BTreeSet<&TargetId>>, GraphError> {
  let mut edges: BTreeMap<&TargetId, BTreeSet<&TargetId>> = BTreeMap::new();
  for node in graph.nodes() {
    for test in &node.tests {
      let Some(test_node) = graph.get(test) else {
        return Err(GraphError::DanglingTestReference {
          test: test.clone(),
          tested: node.id.clone(),
        });
      };
      edges.entry(&test_node.id).or_default().insert(&node.id);
      edges.entry(&node.id).or_default().insert(&test_node.id);
    }
  }
  Ok(edges)
}

/// Every target transitively depending on `seeds`, the seeds included.
///
/// Breadth-first over reverse parse-dependency edges, plus test edges when
/// `include_test_edges` is set. Each target is visited once.
pub fn dependent_closure<'g>(
  graph: &'g TargetGraph,
  seeds: impl IntoIterator<Item = &'g TargetNode>,
  include_test_edges: bool,
) -> Result<BTreeSet<TargetId>, GraphError> {
  let tests = if include_test_edges {
    test_edges(graph)?
  } else {
    BTreeMap::new()
  };

  let mut visited: BTreeSet<TargetId> = BTreeSet::new();
  let mut queue: VecDeque<&TargetId> = VecDeque::new();

  for seed in seeds {
    if visited.insert(seed.id.clone()) {
      queue.push_back(&seed.id);
    }
  }
  let seed_count = visited.len();

  while let Some(id) = queue.pop_front() {
    let dependents = graph.incoming(id)?.into_iter().map(|n| &n.id);
    let linked_tests = tests.get(id).into_iter().flatten().copied();

    for next in dependents.chain(linked_tests) {
      if visited.insert(next.clone()) {
        trace!(from = %id, to = %next, "dependent edge");
        queue.push_back(next);
      }
    }
  }

  debug!(seeds = seed_count, closure = visited.len(), "computed dependent closure");
  Ok(visited)
}

/// Allow-lists applied after the closure. `None` lets everything through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchFilter {
  pub targets: Option<BTreeSet<TargetId>>,
  pub rule_types: Option<BTreeSet<RuleType>>,
}

impl MatchFilter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Restrict to these targets; an empty set means no restriction.
  pub fn with_targets(mut self, targets: impl IntoIterator<Item = TargetId>) -> Self {
    let targets: BTreeSet<TargetId> = targets.into_iter().collect();
    self.targets = (!targets.is_empty()).then_some(targets);
    self
  }

  /// Restrict to these rule types; an empty set means no restriction.
  pub fn with_rule_types(mut self, rule_types: impl IntoIterator<Item = RuleType>) -> Self {
    let rule_types: BTreeSet<RuleType> = rule_types.into_iter().collect();
    self.rule_types = (!rule_types.is_empty()).then_some(rule_types);
    self
  }

  pub fn matches(&self, node: &TargetNode) -> bool {
    let target_allowed = self.targets.as_ref().is_none_or(|t| t.contains(&node.id));
    let type_allowed = self.rule_types.as_ref().is_none_or(|t| t.contains(&node.rule_type));
    target_allowed && type_allowed
  }
}
