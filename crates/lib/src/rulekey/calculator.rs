use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, try_join_all};
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, trace};

use super::{RuleKey, RuleKeyError, RuleKeyFactory};
use crate::graph::{DepKind, TargetGraph};
use crate::query::{TraversalError, post_order_by};
use crate::target::TargetId;

type Pending = Shared<BoxFuture<'static, Result<RuleKey, RuleKeyError>>>;

/// One memo entry.
///
/// The computation runs in its own task, spawned when the entry is claimed,
/// so it finishes even if every caller stops waiting. `settled` is written by
/// that task; `pending` is what callers await.
#[derive(Clone)]
struct Slot {
  settled: Arc<OnceCell<Result<RuleKey, RuleKeyError>>>,
  pending: Pending,
}

/// Where a target's rule key computation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputationState {
  Unrequested,
  InProgress,
  Done(RuleKey),
  /// Failures are final for the lifetime of the calculator.
  Failed(RuleKeyError),
}

/// Computes rule keys across a target graph, each target at most once.
///
/// Dependencies are computed concurrently as separate tasks. A worker permit
/// is held only while the factory runs, after all dependency keys are known,
/// so a small pool slows deep graphs down but cannot starve them.
///
/// Cloning is cheap and shares the memo.
#[derive(Clone)]
pub struct ParallelRuleKeyCalculator {
  inner: Arc<Inner>,
}

struct Inner {
  graph: Arc<TargetGraph>,
  factory: Arc<dyn RuleKeyFactory>,
  memo: DashMap<TargetId, Slot>,
  permits: Semaphore,
}

impl ParallelRuleKeyCalculator {
  /// Create a calculator over `graph`.
  ///
  /// # Errors
  ///
  /// `DependencyCycle` if build dependencies form a cycle; waiting on a
  /// cyclic computation would never finish.
  pub fn new(
    graph: Arc<TargetGraph>,
    factory: Arc<dyn RuleKeyFactory>,
    parallelism: usize,
  ) -> Result<Self, RuleKeyError> {
    post_order_by(&graph, graph.ids(), DepKind::Build).map_err(|e| match e {
      TraversalError::DependencyCycle(cycle) => RuleKeyError::DependencyCycle(cycle),
      TraversalError::Graph(e) => RuleKeyError::Graph(e),
    })?;

    Ok(Self {
      inner: Arc::new(Inner {
        graph,
        factory,
        memo: DashMap::new(),
        permits: Semaphore::new(parallelism.max(1)),
      }),
    })
  }

  /// Rule key of `id`, computing it and its build dependencies on first use.
  ///
  /// Must be polled inside a tokio runtime; computations are spawned as tasks.
  /// Dropping the returned future does not cancel the computation.
  pub fn calculate(&self, id: &TargetId) -> BoxFuture<'static, Result<RuleKey, RuleKeyError>> {
    let this = self.clone();
    let id = id.clone();
    async move { this.slot(&id).pending.await }.boxed()
  }

  /// Rule keys of all `ids`. Every computation is started before any is awaited.
  pub async fn calculate_all<'a>(
    &self,
    ids: impl IntoIterator<Item = &'a TargetId>,
  ) -> Result<BTreeMap<TargetId, RuleKey>, RuleKeyError> {
    let mut join_set = JoinSet::new();
    for id in ids {
      let pending = self.calculate(id);
      let id = id.clone();
      join_set.spawn(async move { (id, pending.await) });
    }

    let mut keys = BTreeMap::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((id, Ok(key))) => {
          keys.insert(id, key);
        }
        Ok((_, Err(e))) => {
          join_set.detach_all();
          return Err(e);
        }
        Err(e) => {
          join_set.detach_all();
          return Err(RuleKeyError::Join(e.to_string()));
        }
      }
    }
    Ok(keys)
  }

  /// Rule keys of `roots` and of every build dependency reachable from them.
  pub async fn calculate_transitive<'a>(
    &self,
    roots: impl IntoIterator<Item = &'a TargetId>,
  ) -> Result<BTreeMap<TargetId, RuleKey>, RuleKeyError> {
    let roots: Vec<&TargetId> = roots.into_iter().collect();
    let mut keys = self.calculate_all(roots.iter().copied()).await?;

    let mut seen: BTreeSet<TargetId> = keys.keys().cloned().collect();
    let mut queue: VecDeque<TargetId> = seen.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
      for dep in &self.inner.graph.node(&id)?.build_deps {
        if seen.insert(dep.clone()) {
          // Already memoized by the root computations.
          let key = self.calculate(dep).await?;
          keys.insert(dep.clone(), key);
          queue.push_back(dep.clone());
        }
      }
    }

    info!(roots = roots.len(), keys = keys.len(), "computed transitive rule keys");
    Ok(keys)
  }

  pub fn state(&self, id: &TargetId) -> ComputationState {
    let Some(slot) = self.inner.memo.get(id) else {
      return ComputationState::Unrequested;
    };
    match slot.value().settled.get() {
      None => ComputationState::InProgress,
      Some(Ok(key)) => ComputationState::Done(*key),
      Some(Err(e)) => ComputationState::Failed(e.clone()),
    }
  }

  /// Claim or join the memo entry for `id`. The shard lock makes the
  /// check-and-spawn atomic.
  fn slot(&self, id: &TargetId) -> Slot {
    self
      .inner
      .memo
      .entry(id.clone())
      .or_insert_with(|| self.spawn_computation(id.clone()))
      .value()
      .clone()
  }

  fn spawn_computation(&self, id: TargetId) -> Slot {
    trace!(target_id = %id, "starting rule key computation");
    let settled = Arc::new(OnceCell::new());

    let this = self.clone();
    let cell = settled.clone();
    let target = id.clone();
    let handle = tokio::spawn(async move {
      let result = this.compute(target).await;
      // Only this task writes the cell.
      let _ = cell.set(result.clone());
      result
    });

    let pending = handle
      .map(move |joined| {
        joined.unwrap_or_else(|e| {
          Err(RuleKeyError::Task {
            target: id,
            message: e.to_string(),
          })
        })
      })
      .boxed()
      .shared();

    Slot { settled, pending }
  }

  async fn compute(&self, id: TargetId) -> Result<RuleKey, RuleKeyError> {
    let deps: Vec<TargetId> = self.inner.graph.node(&id)?.build_deps.iter().cloned().collect();

    for dep in &deps {
      trace!(target_id = %id, dep = %dep, "requesting dependency rule key");
    }
    let keys = try_join_all(deps.iter().map(|dep| self.calculate(dep))).await?;
    let dep_keys: Vec<(TargetId, RuleKey)> = deps.into_iter().zip(keys).collect();

    let task_error = |message: String| RuleKeyError::Task {
      target: id.clone(),
      message,
    };

    let _permit = self.inner.permits.acquire().await.map_err(|e| task_error(e.to_string()))?;
    let inner = self.inner.clone();
    let target = id.clone();
    let key = tokio::task::spawn_blocking(move || {
      let node = inner.graph.node(&target)?;
      inner.factory.build(node, &dep_keys)
    })
    .await
    .map_err(|e| task_error(e.to_string()))??;

    debug!(target_id = %id, rule_key = %key, "computed rule key");
    Ok(key)
  }
}
