use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{RuleType, TargetId};

/// A single target as produced by the build-file parser.
///
/// `parse_deps` is always a superset of `build_deps`: it additionally holds
/// dependencies only visible before action-graph construction, and is what
/// target hashing walks. Rule keys walk `build_deps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetNode {
  pub id: TargetId,
  pub rule_type: RuleType,
  pub build_deps: BTreeSet<TargetId>,
  pub parse_deps: BTreeSet<TargetId>,
  /// Tests declared by this target (`tests = [...]`), empty when none.
  pub tests: BTreeSet<TargetId>,
  /// Input paths relative to the project root.
  pub inputs: BTreeSet<PathBuf>,
  pub attributes: BTreeMap<String, serde_json::Value>,
}

impl TargetNode {
  pub fn new(id: TargetId, rule_type: RuleType) -> Self {
    Self {
      id,
      rule_type,
      build_deps: BTreeSet::new(),
      parse_deps: BTreeSet::new(),
      tests: BTreeSet::new(),
      inputs: BTreeSet::new(),
      attributes: BTreeMap::new(),
    }
  }

  /// Add build dependencies; they are mirrored into the parse dependencies.
  pub fn with_build_deps(mut self, deps: impl IntoIterator<Item = TargetId>) -> Self {
    for dep in deps {
      self.parse_deps.insert(dep.clone());
      self.build_deps.insert(dep);
    }
    self
  }

  /// Add dependencies that only exist at parse time.
  pub fn with_parse_deps(mut self, deps: impl IntoIterator<Item = TargetId>) -> Self {
    self.parse_deps.extend(deps);
    self
  }

  pub fn with_tests(mut self, tests: impl IntoIterator<Item = TargetId>) -> Self {
    self.tests.extend(tests);
    self
  }

  pub fn with_inputs<P: Into<PathBuf>>(mut self, inputs: impl IntoIterator<Item = P>) -> Self {
    self.inputs.extend(inputs.into_iter().map(Into::into));
    self
  }

  pub fn with_attribute(mut self, name: &str, value: serde_json::Value) -> Self {
    self.attributes.insert(name.to_string(), value);
    self
  }

  pub fn declares_tests(&self) -> bool {
    !self.tests.is_empty()
  }

  /// Restore the `build_deps ⊆ parse_deps` invariant after direct field edits.
  pub(crate) fn normalize(&mut self) {
    let build_deps: Vec<TargetId> = self.build_deps.iter().cloned().collect();
    self.parse_deps.extend(build_deps);
  }
}
