//! Per-target results for "show" queries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::QueryConfig;
use crate::graph::TargetGraph;
use crate::query::{QueryError, with_explicit_tests};
use crate::rulekey::{DefaultRuleKeyFactory, ParallelRuleKeyCalculator, RuleKey};
use crate::target::{RuleType, TargetId};
use crate::targethash::{CachedFileHashLoader, ContentFileHashLoader, TargetGraphHasher, TargetHash, loader_for};

/// What a show query computes besides the rule type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShowMode {
  #[default]
  Plain,
  RuleKeys {
    /// Also report every build dependency reachable from the targets.
    transitive: bool,
  },
  TargetHashes,
}

impl ShowMode {
  /// Resolve command-line style flags. Transitive rule keys imply rule keys.
  pub fn from_flags(rule_keys: bool, transitive_rule_keys: bool, target_hashes: bool) -> Result<Self, QueryError> {
    let rule_keys = rule_keys || transitive_rule_keys;
    match (rule_keys, target_hashes) {
      (true, true) => Err(QueryError::InvalidQuery(
        "cannot show rule keys and target hashes at the same time".to_string(),
      )),
      (true, false) => Ok(ShowMode::RuleKeys {
        transitive: transitive_rule_keys,
      }),
      (false, true) => Ok(ShowMode::TargetHashes),
      (false, false) => Ok(ShowMode::Plain),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetResult {
  pub rule_type: RuleType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rule_key: Option<RuleKey>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_hash: Option<TargetHash>,
}

impl TargetResult {
  fn plain(rule_type: RuleType) -> Self {
    Self {
      rule_type,
      rule_key: None,
      target_hash: None,
    }
  }
}

/// Compute show results for `targets`.
///
/// In rule-key mode every calculation starts before any is awaited. With
/// transitive rule keys, or with target hashes and test detection, the result
/// also holds entries for the extra targets that were pulled in.
pub async fn compute_show_results(
  graph: Arc<TargetGraph>,
  targets: &[TargetId],
  mode: ShowMode,
  config: &QueryConfig,
  root: &Path,
) -> Result<BTreeMap<TargetId, TargetResult>, QueryError> {
  let mut results = BTreeMap::new();

  match mode {
    ShowMode::Plain => {
      for id in targets {
        results.insert(id.clone(), TargetResult::plain(graph.node(id)?.rule_type));
      }
    }

    ShowMode::RuleKeys { transitive } => {
      let loader = Arc::new(CachedFileHashLoader::new(Arc::new(ContentFileHashLoader::new(root))));
      let factory = Arc::new(DefaultRuleKeyFactory::new(loader));
      let calculator = ParallelRuleKeyCalculator::new(graph.clone(), factory, config.workers())?;

      let keys = if transitive {
        calculator.calculate_transitive(targets).await?
      } else {
        calculator.calculate_all(targets).await?
      };

      for (id, key) in keys {
        let mut result = TargetResult::plain(graph.node(&id)?.rule_type);
        result.rule_key = Some(key);
        results.insert(id, result);
      }
    }

    ShowMode::TargetHashes => {
      let selected: BTreeSet<TargetId> = if config.detect_test_changes {
        with_explicit_tests(&graph, targets)?
      } else {
        targets.iter().cloned().collect()
      };

      let loader = loader_for(config, root);
      let detect_test_changes = config.detect_test_changes;
      let workers = config.workers();
      let hashing_graph = graph.clone();
      let roots: Vec<TargetId> = selected.iter().cloned().collect();

      let hashes = tokio::task::spawn_blocking(move || {
        TargetGraphHasher::new(&hashing_graph, loader)
          .with_tests(detect_test_changes)
          .with_parallelism(workers)
          .hash_targets(&roots)
      })
      .await
      .map_err(|e| QueryError::Task(e.to_string()))??;

      for id in selected {
        let mut result = TargetResult::plain(graph.node(&id)?.rule_type);
        result.target_hash = hashes.get(&id).copied();
        results.insert(id, result);
      }
    }
  }

  info!(targets = targets.len(), results = results.len(), "computed show results");
  Ok(results)
}
