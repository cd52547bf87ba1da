//! Query configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default name of the build definition file in each package.
pub const DEFAULT_BUILD_FILE_NAME: &str = "BUCK";

/// How input files contribute to a target hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileHashMode {
  /// Hash the path and the file content.
  #[default]
  PathsAndContents,
  /// Hash the path only; content is never read.
  PathsOnly,
}

impl fmt::Display for FileHashMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FileHashMode::PathsAndContents => f.write_str("PATHS_AND_CONTENTS"),
      FileHashMode::PathsOnly => f.write_str("PATHS_ONLY"),
    }
  }
}

impl FromStr for FileHashMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().replace('-', "_").as_str() {
      "PATHS_AND_CONTENTS" => Ok(FileHashMode::PathsAndContents),
      "PATHS_ONLY" => Ok(FileHashMode::PathsOnly),
      other => Err(format!("unknown file hash mode: {}", other)),
    }
  }
}

/// Settings shared by every query over one target graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
  /// Maximum number of rule keys or base hashes computed in parallel.
  pub parallelism: usize,

  /// Name of the build definition file, used for ownership checks.
  pub build_file_name: String,

  /// Treat "is tested by" as a dependency edge.
  pub detect_test_changes: bool,

  pub file_hash_mode: FileHashMode,

  /// Paths that hash as modified in `PathsOnly` mode (relative to the root).
  pub modified_paths: BTreeSet<PathBuf>,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      build_file_name: DEFAULT_BUILD_FILE_NAME.to_string(),
      detect_test_changes: false,
      file_hash_mode: FileHashMode::default(),
      modified_paths: BTreeSet::new(),
    }
  }
}

impl QueryConfig {
  /// Parallelism clamped to at least one worker.
  pub fn workers(&self) -> usize {
    self.parallelism.max(1)
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
