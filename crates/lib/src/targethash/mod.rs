//! Target hashes for change detection.
//!
//! A target hash is computed in two phases:
//!
//! 1. **Base hash** per target, over its name, rule type, attributes and the
//!    hash of every input as reported by a [`FileHashLoader`]. Base hashes are
//!    independent and computed in parallel.
//! 2. **Folding** in dependency-first order: each target's hash is its base
//!    hash followed by the folded hashes of its parse dependencies and, when
//!    test detection is enabled, the base hashes of its declared tests.
//!
//! Tests contribute their base hash rather than their folded hash. A test
//! normally depends on the target it tests, so its folded hash does not yet
//! exist when the target under test is folded.

mod loader;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{GraphError, TargetGraph};
use crate::query::{TraversalError, post_order};
use crate::target::{TargetId, TargetNode};
use crate::util::hash::{DigestBuilder, FileHashError, Sha256Sum};

pub use loader::{CachedFileHashLoader, ContentFileHashLoader, FileHashLoader, PathFileHashLoader, loader_for};

const BASE_DOMAIN: &str = "keyway.target-hash.base";
const FOLD_DOMAIN: &str = "keyway.target-hash.fold";

/// Folded hash of a target, its dependencies and optionally its tests.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetHash(pub Sha256Sum);

impl fmt::Display for TargetHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl fmt::Debug for TargetHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TargetHash({})", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetHashError {
  /// A dependency was folded out of order. Always a traversal bug.
  #[error("cannot find hash for target '{dependency}' while hashing '{target}'")]
  MissingHashDependency { target: TargetId, dependency: TargetId },

  #[error("failed to hash input {path} of '{target}': {source}")]
  FileHash {
    target: TargetId,
    path: PathBuf,
    #[source]
    source: FileHashError,
  },

  #[error("failed to start hashing workers: {0}")]
  WorkerPool(String),

  #[error(transparent)]
  Traversal(#[from] TraversalError),

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Computes target hashes over a graph.
pub struct TargetGraphHasher<'g> {
  graph: &'g TargetGraph,
  loader: Arc<dyn FileHashLoader>,
  detect_test_changes: bool,
  parallelism: usize,
}

impl<'g> TargetGraphHasher<'g> {
  pub fn new(graph: &'g TargetGraph, loader: Arc<dyn FileHashLoader>) -> Self {
    Self {
      graph,
      loader,
      detect_test_changes: false,
      parallelism: 1,
    }
  }

  /// Fold declared tests into the targets they test.
  pub fn with_tests(mut self, detect_test_changes: bool) -> Self {
    self.detect_test_changes = detect_test_changes;
    self
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  /// Hash of a single target, without dependencies.
  pub fn base_hash(&self, node: &TargetNode) -> Result<Sha256Sum, TargetHashError> {
    let mut builder = DigestBuilder::new(BASE_DOMAIN);
    builder
      .str("name", node.id.fully_qualified_name())
      .str("rule_type", node.rule_type.as_str());

    for (name, value) in &node.attributes {
      builder.str("attr", name).json("value", value);
    }

    for input in &node.inputs {
      let hash = self.loader.hash(input).map_err(|source| TargetHashError::FileHash {
        target: node.id.clone(),
        path: input.clone(),
        source,
      })?;
      builder.str("input", &input.to_string_lossy()).digest("input_hash", &hash);
    }

    Ok(builder.finish())
  }

  /// Hash every target in `roots` and everything they depend on.
  ///
  /// The returned map covers the roots and all their transitive parse
  /// dependencies.
  pub fn hash_targets<'a>(
    &self,
    roots: impl IntoIterator<Item = &'a TargetId>,
  ) -> Result<BTreeMap<TargetId, TargetHash>, TargetHashError> {
    let roots: Vec<&TargetId> = roots.into_iter().collect();
    let order = post_order(self.graph, roots.iter().copied())?;

    let mut to_hash: BTreeSet<&TargetId> = order.iter().collect();
    if self.detect_test_changes {
      for id in &order {
        let node = self.graph.node(id)?;
        for test in &node.tests {
          if !self.graph.contains(test) {
            return Err(
              GraphError::DanglingTestReference {
                test: test.clone(),
                tested: id.clone(),
              }
              .into(),
            );
          }
          to_hash.insert(test);
        }
      }
    }

    let base_hashes = self.base_hashes(to_hash)?;
    debug!(targets = base_hashes.len(), "computed base hashes");

    let mut folded: BTreeMap<TargetId, TargetHash> = BTreeMap::new();
    for id in &order {
      let hash = self.fold(id, &base_hashes, &folded)?;
      folded.insert(id.clone(), hash);
    }

    info!(
      requested = roots.len(),
      hashed = folded.len(),
      tests = self.detect_test_changes,
      "computed target hashes"
    );
    Ok(folded)
  }

  fn base_hashes(&self, ids: BTreeSet<&TargetId>) -> Result<BTreeMap<TargetId, Sha256Sum>, TargetHashError> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(self.parallelism)
      .build()
      .map_err(|e| TargetHashError::WorkerPool(e.to_string()))?;

    let ids: Vec<&TargetId> = ids.into_iter().collect();
    pool.install(|| {
      ids
        .par_iter()
        .map(|id| -> Result<(TargetId, Sha256Sum), TargetHashError> {
          let node = self.graph.node(id)?;
          Ok(((*id).clone(), self.base_hash(node)?))
        })
        .collect()
    })
  }

  fn fold(
    &self,
    id: &TargetId,
    base_hashes: &BTreeMap<TargetId, Sha256Sum>,
    folded: &BTreeMap<TargetId, TargetHash>,
  ) -> Result<TargetHash, TargetHashError> {
    let missing = |dependency: &TargetId| TargetHashError::MissingHashDependency {
      target: id.clone(),
      dependency: dependency.clone(),
    };

    let node = self.graph.node(id)?;
    let base = base_hashes.get(id).ok_or_else(|| missing(id))?;

    let mut builder = DigestBuilder::new(FOLD_DOMAIN);
    builder.digest("base", base);

    for dep in &node.parse_deps {
      let dep_hash = folded.get(dep).ok_or_else(|| missing(dep))?;
      builder.str("dep", dep.fully_qualified_name()).digest("dep_hash", &dep_hash.0);
    }

    if self.detect_test_changes {
      for test in &node.tests {
        let test_hash = base_hashes.get(test).ok_or_else(|| missing(test))?;
        builder.str("test", test.fully_qualified_name()).digest("test_hash", test_hash);
      }
    }

    Ok(TargetHash(builder.finish()))
  }
}
