use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::graph::{DepKind, GraphError, TargetGraph};
use crate::target::TargetId;

/// A dependency cycle, in edge order, with the first target repeated at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle(pub Vec<TargetId>);

impl fmt::Display for Cycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names: Vec<&str> = self.0.iter().map(TargetId::fully_qualified_name).collect();
    f.write_str(&names.join(" -> "))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraversalError {
  #[error("cycle detected in target graph: {0}")]
  DependencyCycle(Cycle),

  #[error(transparent)]
  Graph(#[from] GraphError),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  OnStack,
  Done,
}

/// Depth-first post-order over parse dependencies reachable from `roots`.
///
/// Every dependency is emitted before any target that depends on it. Roots
/// and dependencies are visited in identifier order, so the output is
/// deterministic. Fails on the first cycle found.
pub fn post_order<'g>(
  graph: &'g TargetGraph,
  roots: impl IntoIterator<Item = &'g TargetId>,
) -> Result<Vec<TargetId>, TraversalError> {
  post_order_by(graph, roots, DepKind::Parse)
}

/// [`post_order`] following `kind` edges.
pub fn post_order_by<'g>(
  graph: &'g TargetGraph,
  roots: impl IntoIterator<Item = &'g TargetId>,
  kind: DepKind,
) -> Result<Vec<TargetId>, TraversalError> {
  let mut roots: Vec<&TargetId> = roots.into_iter().collect();
  roots.sort();

  let mut marks: HashMap<&'g TargetId, Mark> = HashMap::new();
  let mut order: Vec<TargetId> = Vec::new();

  for root in roots {
    let root = graph.node(root)?;
    if marks.contains_key(&root.id) {
      continue;
    }
    marks.insert(&root.id, Mark::OnStack);
    let mut stack = vec![(&root.id, root.deps(kind).iter())];

    while let Some((_, deps)) = stack.last_mut() {
      match deps.next() {
        Some(dep) => match marks.get(dep) {
          Some(Mark::Done) => {}
          Some(Mark::OnStack) => {
            let start = stack.iter().position(|(id, _)| *id == dep).unwrap_or(0);
            let mut cycle: Vec<TargetId> = stack[start..].iter().map(|(id, _)| (*id).clone()).collect();
            cycle.push(dep.clone());
            return Err(TraversalError::DependencyCycle(Cycle(cycle)));
          }
          None => {
            let node = graph.node(dep)?;
            marks.insert(&node.id, Mark::OnStack);
            stack.push((&node.id, node.deps(kind).iter()));
          }
        },
        None => {
          if let Some((id, _)) = stack.pop() {
            marks.insert(id, Mark::Done);
            order.push(id.clone());
          }
        }
      }
    }
  }

  debug!(targets = order.len(), "ordered targets dependencies-first");
  Ok(order)
}
