//! Read-only view over a parsed target graph.
//!
//! The graph is produced by the (external) build-file parser; this module
//! only indexes it:
//! - Node lookup by [`TargetId`]
//! - Forward edges (declared build or parse dependencies)
//! - Reverse edges (dependents), precomputed at construction
//! - Induced subgraphs and renderable dependency graphs
//!
//! Every dependency must resolve to a node in the graph; construction fails
//! with [`GraphError::TargetNotInGraph`] otherwise.

mod manifest;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;

use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::{debug, trace};

use crate::target::{InvalidTargetError, TargetId, TargetNode, UnknownRuleType};

pub use manifest::{GraphManifest, TargetDecl};

/// Which dependency notion an edge follows.
///
/// Build dependencies feed rule keys; parse dependencies (a superset) feed
/// target hashes and the dependent closure. The two are never assumed equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
  Build,
  Parse,
}

impl TargetNode {
  pub fn deps(&self, kind: DepKind) -> &BTreeSet<TargetId> {
    match kind {
      DepKind::Build => &self.build_deps,
      DepKind::Parse => &self.parse_deps,
    }
  }
}

/// Errors raised while building or querying a target graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// A referenced target has no node. Indicates a parser/graph inconsistency.
  #[error("{}", not_in_graph_message(.target, .referenced_by.as_ref()))]
  TargetNotInGraph {
    target: TargetId,
    referenced_by: Option<TargetId>,
  },

  /// A declared test target has no node.
  #[error("'{test}' (test of '{tested}') is not in the target graph.")]
  DanglingTestReference { test: TargetId, tested: TargetId },

  #[error("target '{0}' is declared more than once")]
  DuplicateTarget(TargetId),

  #[error(transparent)]
  InvalidTarget(#[from] InvalidTargetError),

  #[error(transparent)]
  UnknownRuleType(#[from] UnknownRuleType),

  #[error("failed to load graph manifest {path}: {message}")]
  Manifest { path: String, message: String },
}

fn not_in_graph_message(target: &TargetId, referenced_by: Option<&TargetId>) -> String {
  match referenced_by {
    Some(from) => format!("'{}' (dependency of '{}') is not in the target graph.", target, from),
    None => format!("'{}' is not in the target graph.", target),
  }
}

impl GraphError {
  pub fn not_in_graph(target: &TargetId) -> Self {
    GraphError::TargetNotInGraph {
      target: target.clone(),
      referenced_by: None,
    }
  }
}

/// An immutable target graph with a precomputed reverse-edge index.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
  nodes: BTreeMap<TargetId, TargetNode>,

  /// dependency -> targets whose parse deps include it.
  reverse_edges: BTreeMap<TargetId, BTreeSet<TargetId>>,
}

impl TargetGraph {
  /// Index a set of parsed nodes.
  ///
  /// # Errors
  ///
  /// - `DuplicateTarget` if two nodes share an identifier
  /// - `TargetNotInGraph` if any dependency does not resolve
  pub fn new(nodes: impl IntoIterator<Item = TargetNode>) -> Result<Self, GraphError> {
    let mut by_id = BTreeMap::new();
    for mut node in nodes {
      node.normalize();
      let id = node.id.clone();
      if by_id.insert(id.clone(), node).is_some() {
        return Err(GraphError::DuplicateTarget(id));
      }
    }

    let mut reverse_edges: BTreeMap<TargetId, BTreeSet<TargetId>> = BTreeMap::new();
    for (id, node) in &by_id {
      for dep in &node.parse_deps {
        if !by_id.contains_key(dep) {
          return Err(GraphError::TargetNotInGraph {
            target: dep.clone(),
            referenced_by: Some(id.clone()),
          });
        }
        reverse_edges.entry(dep.clone()).or_default().insert(id.clone());
      }
    }

    debug!(targets = by_id.len(), "indexed target graph");

    Ok(Self {
      nodes: by_id,
      reverse_edges,
    })
  }

  /// Load a graph from a JSON manifest on disk.
  pub fn load(path: &Path) -> Result<Self, GraphError> {
    GraphManifest::load(path)?.into_graph()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn contains(&self, id: &TargetId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn get(&self, id: &TargetId) -> Option<&TargetNode> {
    self.nodes.get(id)
  }

  /// Look up a node; absence is a `TargetNotInGraph` error.
  pub fn node(&self, id: &TargetId) -> Result<&TargetNode, GraphError> {
    self.nodes.get(id).ok_or_else(|| GraphError::not_in_graph(id))
  }

  /// All nodes, ordered by identifier.
  pub fn nodes(&self) -> impl Iterator<Item = &TargetNode> {
    self.nodes.values()
  }

  pub fn ids(&self) -> impl Iterator<Item = &TargetId> {
    self.nodes.keys()
  }

  /// Resolve a set of identifiers to nodes, failing on the first absent one.
  pub fn get_all<'a>(&self, ids: impl IntoIterator<Item = &'a TargetId>) -> Result<Vec<&TargetNode>, GraphError> {
    ids.into_iter().map(|id| self.node(id)).collect()
  }

  /// Targets that declare `id` as a parse dependency.
  pub fn incoming(&self, id: &TargetId) -> Result<Vec<&TargetNode>, GraphError> {
    self.node(id)?;
    match self.reverse_edges.get(id) {
      Some(dependents) => self.get_all(dependents),
      None => Ok(Vec::new()),
    }
  }

  /// Direct dependencies of `id` of the given kind.
  pub fn dependencies(&self, id: &TargetId, kind: DepKind) -> Result<Vec<&TargetNode>, GraphError> {
    let node = self.node(id)?;
    self.get_all(node.deps(kind))
  }

  /// The subgraph induced by everything reachable from `roots` over parse deps.
  pub fn subgraph<'a>(&self, roots: impl IntoIterator<Item = &'a TargetId>) -> Result<TargetGraph, GraphError> {
    let mut seen: BTreeSet<TargetId> = BTreeSet::new();
    let mut queue: VecDeque<TargetId> = VecDeque::new();

    for root in roots {
      self.node(root)?;
      if seen.insert(root.clone()) {
        queue.push_back(root.clone());
      }
    }

    while let Some(id) = queue.pop_front() {
      let node = self.node(&id)?;
      for dep in &node.parse_deps {
        if seen.insert(dep.clone()) {
          trace!(from = %id, to = %dep, "subgraph edge");
          queue.push_back(dep.clone());
        }
      }
    }

    let nodes: Vec<TargetNode> = seen.iter().filter_map(|id| self.nodes.get(id).cloned()).collect();
    TargetGraph::new(nodes)
  }

  /// The dependency graph restricted to `ids`, for DOT/JSON rendering.
  ///
  /// Edges point from a target to its dependency; edges leaving `ids` are
  /// dropped. Node insertion follows identifier order so rendering is stable.
  pub fn dependency_graph(&self, ids: &BTreeSet<TargetId>, kind: DepKind) -> Result<DiGraph<TargetId, ()>, GraphError> {
    let mut graph = DiGraph::new();
    let mut indices: HashMap<&TargetId, NodeIndex> = HashMap::new();

    for id in ids {
      self.node(id)?;
      indices.insert(id, graph.add_node(id.clone()));
    }

    for id in ids {
      let from = indices[id];
      for dep in self.node(id)?.deps(kind) {
        if let Some(&to) = indices.get(dep) {
          graph.add_edge(from, to, ());
        }
      }
    }

    Ok(graph)
  }
}
