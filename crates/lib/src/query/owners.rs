use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::graph::TargetGraph;
use crate::target::TargetNode;

/// Locates the package enclosing a path.
pub trait BuildFileTree {
  /// Base path of the nearest package containing `path` (the path itself
  /// included), relative to the project root.
  fn base_path_of_ancestor(&self, path: &Path) -> Option<PathBuf>;
}

/// Package tree derived from the base paths of the targets in a graph.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBuildFileTree {
  packages: BTreeSet<PathBuf>,
}

impl InMemoryBuildFileTree {
  pub fn new(packages: impl IntoIterator<Item = PathBuf>) -> Self {
    Self {
      packages: packages.into_iter().collect(),
    }
  }

  pub fn from_graph(graph: &TargetGraph) -> Self {
    Self::new(graph.ids().map(|id| id.base_path_buf()))
  }
}

impl BuildFileTree for InMemoryBuildFileTree {
  fn base_path_of_ancestor(&self, path: &Path) -> Option<PathBuf> {
    path
      .ancestors()
      .find(|candidate| self.packages.contains(*candidate))
      .map(Path::to_path_buf)
  }
}

/// Package tree backed by build files on disk.
#[derive(Debug, Clone)]
pub struct FilesystemBuildFileTree {
  root: PathBuf,
  build_file_name: String,
}

impl FilesystemBuildFileTree {
  pub fn new(root: impl Into<PathBuf>, build_file_name: impl Into<String>) -> Self {
    Self {
      root: root.into(),
      build_file_name: build_file_name.into(),
    }
  }
}

impl BuildFileTree for FilesystemBuildFileTree {
  fn base_path_of_ancestor(&self, path: &Path) -> Option<PathBuf> {
    path
      .ancestors()
      .find(|candidate| self.root.join(candidate).join(&self.build_file_name).is_file())
      .map(Path::to_path_buf)
  }
}

/// Matches targets that directly own one of a set of referenced files.
///
/// A target owns a file when its package is the nearest package enclosing
/// the file, and it either declares an input that prefixes the file or the
/// file is the package's build file. Requiring both keeps sibling targets in
/// the same package from matching each other's inputs.
pub struct DirectOwnerPredicate<'a> {
  referenced: &'a BTreeSet<PathBuf>,
  candidate_base_paths: BTreeSet<PathBuf>,
  build_file_name: &'a str,
}

impl<'a> DirectOwnerPredicate<'a> {
  pub fn new(tree: &dyn BuildFileTree, referenced: &'a BTreeSet<PathBuf>, build_file_name: &'a str) -> Self {
    let candidate_base_paths: BTreeSet<PathBuf> =
      referenced.iter().filter_map(|p| tree.base_path_of_ancestor(p)).collect();
    debug!(
      referenced = referenced.len(),
      packages = candidate_base_paths.len(),
      "resolved owning packages"
    );
    Self {
      referenced,
      candidate_base_paths,
      build_file_name,
    }
  }

  pub fn test(&self, node: &TargetNode) -> bool {
    let base_path = node.id.base_path_buf();
    if !self.candidate_base_paths.contains(&base_path) {
      return false;
    }

    let owns_input = node
      .inputs
      .iter()
      .any(|input| self.referenced.iter().any(|r| r.starts_with(input)));

    owns_input || self.referenced.contains(&base_path.join(self.build_file_name))
  }
}

/// Direct owners of `referenced` in `graph`.
///
/// An empty `referenced` set selects every node.
pub fn direct_owners<'g>(
  graph: &'g TargetGraph,
  tree: &dyn BuildFileTree,
  referenced: &BTreeSet<PathBuf>,
  build_file_name: &str,
) -> Vec<&'g TargetNode> {
  if referenced.is_empty() {
    return graph.nodes().collect();
  }
  let predicate = DirectOwnerPredicate::new(tree, referenced, build_file_name);
  graph.nodes().filter(|node| predicate.test(node)).collect()
}
