//! Target selection.
//!
//! Turns a set of referenced files and explicit allow-lists into the set of
//! targets a query operates on:
//!
//! 1. [`ReferencedFiles`] splits raw path arguments by project root
//! 2. [`direct_owners`] finds the targets owning the referenced files
//! 3. [`dependent_closure`] expands them to everything depending on them
//! 4. [`MatchFilter`] intersects with explicit target and rule-type lists
//!
//! [`post_order`] provides the cycle-checked dependency-first order that
//! hashing folds over.

mod closure;
mod owners;
mod referenced;
mod traversal;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::QueryConfig;
use crate::graph::{GraphError, TargetGraph};
use crate::rulekey::RuleKeyError;
use crate::target::{TargetId, TargetNode};
use crate::targethash::TargetHashError;

pub use closure::{MatchFilter, dependent_closure};
pub use owners::{BuildFileTree, DirectOwnerPredicate, FilesystemBuildFileTree, InMemoryBuildFileTree, direct_owners};
pub use referenced::ReferencedFiles;
pub use traversal::{Cycle, TraversalError, post_order, post_order_by};

/// Any failure that aborts a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Traversal(#[from] TraversalError),

  #[error(transparent)]
  RuleKey(#[from] RuleKeyError),

  #[error(transparent)]
  TargetHash(#[from] TargetHashError),

  #[error("invalid query: {0}")]
  InvalidQuery(String),

  #[error("query task failed: {0}")]
  Task(String),
}

/// Select the targets affected by `referenced`, filtered by `filter`.
///
/// `referenced` is `None` when no files were given, in which case every
/// target is a starting point. When files were given but none of them lies
/// under the project root, nothing matches.
///
/// The result is keyed by fully qualified target name.
pub fn select_matching_targets<'g>(
  graph: &'g TargetGraph,
  referenced: Option<&ReferencedFiles>,
  filter: &MatchFilter,
  config: &QueryConfig,
) -> Result<BTreeMap<String, &'g TargetNode>, GraphError> {
  if referenced.is_some_and(ReferencedFiles::all_outside_root) {
    info!("all referenced files are outside the project root or missing");
    return Ok(BTreeMap::new());
  }

  let owners = match referenced.filter(|r| !r.under_root.is_empty()) {
    Some(files) => {
      let tree = InMemoryBuildFileTree::from_graph(graph);
      direct_owners(graph, &tree, &files.under_root, &config.build_file_name)
    }
    None => graph.nodes().collect(),
  };
  debug!(owners = owners.len(), "selected direct owners");

  let closure = dependent_closure(graph, owners, config.detect_test_changes)?;

  let mut matching = BTreeMap::new();
  for id in &closure {
    let node = graph.node(id)?;
    if filter.matches(node) {
      matching.insert(id.fully_qualified_name().to_string(), node);
    }
  }

  info!(closure = closure.len(), matching = matching.len(), "selected matching targets");
  Ok(matching)
}

/// `ids` plus the declared tests of every target reachable from them.
pub fn with_explicit_tests<'a>(
  graph: &TargetGraph,
  ids: impl IntoIterator<Item = &'a TargetId>,
) -> Result<BTreeSet<TargetId>, GraphError> {
  let mut selected: BTreeSet<TargetId> = ids.into_iter().cloned().collect();
  let reachable = graph.subgraph(selected.iter())?;

  let mut tests = BTreeSet::new();
  for node in reachable.nodes() {
    for test in &node.tests {
      if !graph.contains(test) {
        return Err(GraphError::DanglingTestReference {
          test: test.clone(),
          tested: node.id.clone(),
        });
      }
      tests.insert(test.clone());
    }
  }

  debug!(tests = tests.len(), "added explicit test targets");
  selected.extend(tests);
  Ok(selected)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::RuleType;
  use std::path::PathBuf;

  fn id(s: &str) -> TargetId {
    s.parse().unwrap()
  }

  fn graph() -> TargetGraph {
    TargetGraph::new([
      TargetNode::new(id("//lib:lib"), RuleType::JavaLibrary)
        .with_inputs(["lib/Lib.java"])
        .with_tests([id("//lib:test")]),
      TargetNode::new(id("//lib:test"), RuleType::JavaTest).with_build_deps([id("//lib:lib")]),
      TargetNode::new(id("//app:app"), RuleType::JavaBinary)
        .with_inputs(["app/Main.java"])
        .with_build_deps([id("//lib:lib")]),
      TargetNode::new(id("//other:other"), RuleType::Genrule).with_inputs(["other/gen.sh"]),
    ])
    .unwrap()
  }

  fn referenced(paths: &[&str]) -> ReferencedFiles {
    ReferencedFiles {
      under_root: paths.iter().map(PathBuf::from).collect(),
      outside_or_missing: BTreeSet::new(),
    }
  }

  fn keys(map: &BTreeMap<String, &TargetNode>) -> Vec<String> {
    map.keys().cloned().collect()
  }

  #[test]
  fn no_referenced_files_selects_everything() {
    let graph = graph();
    let matching = select_matching_targets(&graph, None, &MatchFilter::new(), &QueryConfig::default()).unwrap();
    assert_eq!(matching.len(), 4);
  }

  #[test]
  fn changed_input_selects_dependents() {
    let graph = graph();
    let files = referenced(&["lib/Lib.java"]);
    let matching =
      select_matching_targets(&graph, Some(&files), &MatchFilter::new(), &QueryConfig::default()).unwrap();
    assert_eq!(keys(&matching), vec!["//app:app", "//lib:lib", "//lib:test"]);
  }

  #[test]
  fn filters_apply_after_closure() {
    let graph = graph();
    let files = referenced(&["lib/Lib.java"]);

    let by_type = MatchFilter::new().with_rule_types([RuleType::JavaBinary]);
    let matching = select_matching_targets(&graph, Some(&files), &by_type, &QueryConfig::default()).unwrap();
    assert_eq!(keys(&matching), vec!["//app:app"]);

    let by_target = MatchFilter::new().with_targets([id("//other:other"), id("//lib:lib")]);
    let matching = select_matching_targets(&graph, Some(&files), &by_target, &QueryConfig::default()).unwrap();
    assert_eq!(keys(&matching), vec!["//lib:lib"]);
  }

  #[test]
  fn files_outside_root_select_nothing() {
    let graph = graph();
    let files = ReferencedFiles {
      under_root: BTreeSet::new(),
      outside_or_missing: [PathBuf::from("/elsewhere/file.txt")].into_iter().collect(),
    };
    let matching =
      select_matching_targets(&graph, Some(&files), &MatchFilter::new(), &QueryConfig::default()).unwrap();
    assert!(matching.is_empty());
  }

  #[test]
  fn explicit_tests_are_added() {
    let graph = graph();
    let selected = with_explicit_tests(&graph, [&id("//app:app")]).unwrap();
    let names: Vec<String> = selected.iter().map(|i| i.to_string()).collect();
    assert_eq!(names, vec!["//app:app", "//lib:test"]);
  }

  #[test]
  fn dangling_explicit_test_fails() {
    let graph =
      TargetGraph::new([TargetNode::new(id("//a:a"), RuleType::JavaLibrary).with_tests([id("//a:gone")])]).unwrap();
    let err = with_explicit_tests(&graph, [&id("//a:a")]).unwrap_err();
    assert!(matches!(err, GraphError::DanglingTestReference { .. }));
  }
}
