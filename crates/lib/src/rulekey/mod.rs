//! Rule keys: content-addressed identities of build recipes.
//!
//! A rule key covers a target's name, rule type, attributes, the content of
//! its inputs and the rule keys of its build dependencies. Equal rule keys
//! mean the build outputs are interchangeable.
//!
//! [`RuleKeyFactory`] turns one target plus its dependency keys into a key;
//! [`ParallelRuleKeyCalculator`] drives a factory across the graph, computing
//! every target at most once.

mod calculator;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::GraphError;
use crate::query::Cycle;
use crate::target::{TargetId, TargetNode};
use crate::targethash::FileHashLoader;
use crate::util::hash::{DigestBuilder, FileHashError, Sha256Sum};

pub use calculator::{ComputationState, ParallelRuleKeyCalculator};

const RULE_KEY_DOMAIN: &str = "keyway.rule-key";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(pub Sha256Sum);

impl fmt::Display for RuleKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl fmt::Debug for RuleKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "RuleKey({})", self.0)
  }
}

/// Failure computing a rule key.
///
/// Cloneable: a failed computation hands the same error to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleKeyError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("failed to hash input {path} of '{target}': {source}")]
  FileHash {
    target: TargetId,
    path: PathBuf,
    #[source]
    source: FileHashError,
  },

  #[error("build dependency cycle: {0}")]
  DependencyCycle(Cycle),

  #[error("rule key computation for '{target}' failed: {message}")]
  Task { target: TargetId, message: String },

  #[error("rule key task failed: {0}")]
  Join(String),
}

/// Builds the rule key of one target from its already-computed dependency keys.
pub trait RuleKeyFactory: Send + Sync {
  /// `deps` holds one entry per build dependency, ordered by identifier.
  fn build(&self, node: &TargetNode, deps: &[(TargetId, RuleKey)]) -> Result<RuleKey, RuleKeyError>;
}

/// Rule keys over the target definition and its input contents.
pub struct DefaultRuleKeyFactory {
  loader: Arc<dyn FileHashLoader>,
}

impl DefaultRuleKeyFactory {
  pub fn new(loader: Arc<dyn FileHashLoader>) -> Self {
    Self { loader }
  }
}

impl RuleKeyFactory for DefaultRuleKeyFactory {
  fn build(&self, node: &TargetNode, deps: &[(TargetId, RuleKey)]) -> Result<RuleKey, RuleKeyError> {
    let mut builder = DigestBuilder::new(RULE_KEY_DOMAIN);
    builder
      .str("name", node.id.fully_qualified_name())
      .str("rule_type", node.rule_type.as_str());

    for (name, value) in &node.attributes {
      builder.str("attr", name).json("value", value);
    }

    for input in &node.inputs {
      let hash = self.loader.hash(input).map_err(|source| RuleKeyError::FileHash {
        target: node.id.clone(),
        path: input.clone(),
        source,
      })?;
      builder.str("input", &input.to_string_lossy()).digest("input_hash", &hash);
    }

    for (dep, key) in deps {
      builder.str("dep", dep.fully_qualified_name()).digest("dep_key", &key.0);
    }

    Ok(RuleKey(builder.finish()))
  }
}
