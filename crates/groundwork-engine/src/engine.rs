//! The apply engine.
//!
//! Walks a run's dependency graph, reconciling each resource node against
//! the provider as soon as its upstream dependencies resolve. Independent
//! subtrees proceed in parallel under a configurable concurrency bound.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use groundwork_graph::{Graph, PropertyValue, ResourceId, ResourceNode, ResourceState, Run};
use groundwork_output::OutputError;
use groundwork_provider::{ApplyRequest, Provider};

use crate::error::EngineError;
use crate::events::{ApplyEvent, ApplyNotifier, NoopNotifier};
use crate::report::{
  ApplyRecord, ApplyReport, DestroyRecord, DestroyReport, ResourceRecord, RunState,
};

/// Tuning knobs for a run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
  /// Maximum provider calls in flight at once.
  pub concurrency: usize,
  /// After the first failure, stop scheduling even independent nodes.
  /// Dependents of a failed node are never attempted regardless.
  pub fail_fast: bool,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      concurrency: 8,
      fail_fast: false,
    }
  }
}

/// Apply state of one node. `Resolved` and `Failed` are terminal; nodes
/// still `Pending` when the run stops scheduling are reported as skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
  Pending,
  Applying,
  Resolved,
  Failed,
}

struct Applied {
  record: ApplyRecord,
  resolved: serde_json::Map<String, Value>,
}

struct TaskOutcome {
  id: ResourceId,
  result: Result<Applied, String>,
}

/// The apply engine.
///
/// Generic over `N: ApplyNotifier` to allow different observation
/// strategies. Use [`ApplyEngine::new`] for a default engine with no-op
/// notifications, or [`ApplyEngine::with_notifier`] to observe events.
pub struct ApplyEngine<N: ApplyNotifier = NoopNotifier> {
  provider: Arc<dyn Provider>,
  options: EngineOptions,
  notifier: N,
}

impl ApplyEngine<NoopNotifier> {
  pub fn new(provider: Arc<dyn Provider>, options: EngineOptions) -> Self {
    Self::with_notifier(provider, options, NoopNotifier)
  }
}

impl<N: ApplyNotifier> ApplyEngine<N> {
  pub fn with_notifier(provider: Arc<dyn Provider>, options: EngineOptions, notifier: N) -> Self {
    Self {
      provider,
      options,
      notifier,
    }
  }

  /// Reconcile every node in the run against the provider.
  ///
  /// Graph validation runs first; any construction error aborts before a
  /// single remote call. A node is applied only once all of its upstream
  /// dependencies are `Resolved`. A failing node marks its transitive
  /// dependents `Failed` without attempting them, while independent subtrees
  /// run to completion, so the report carries the maximal safe partial
  /// result. Re-applying against `prior` is idempotent: nodes whose desired
  /// properties match the prior record outside `ignore_fields` issue no
  /// remote call.
  pub async fn apply(
    &self,
    mut run: Run,
    prior: RunState,
    cancel: CancellationToken,
  ) -> Result<ApplyReport, EngineError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let graph = Graph::build(&run)?;

    info!(
      run_id = %run_id,
      run = %run.name(),
      nodes = run.nodes().len(),
      "apply_started"
    );
    self.notifier.notify(ApplyEvent::RunStarted {
      run_id: run_id.clone(),
      run_name: run.name().to_string(),
    });

    let prior = Arc::new(prior);
    let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
    let mut status: HashMap<ResourceId, NodeStatus> = run
      .nodes()
      .iter()
      .map(|node| (node.id.clone(), NodeStatus::Pending))
      .collect();
    let mut records: BTreeMap<String, ApplyRecord> = BTreeMap::new();
    let mut next_state = RunState::new();
    let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
    let mut failed_any = false;
    let mut cancelled = false;

    loop {
      let halted = cancelled || (self.options.fail_fast && failed_any);
      if !halted {
        for node in run.nodes() {
          if status[&node.id] != NodeStatus::Pending {
            continue;
          }
          let ready = graph
            .upstream(&node.id)
            .iter()
            .all(|up| status[up] == NodeStatus::Resolved);
          if !ready {
            continue;
          }
          // A node only starts once it holds a permit, so nothing new is in
          // flight after the run stops scheduling.
          let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
            break;
          };

          status.insert(node.id.clone(), NodeStatus::Applying);
          info!(run_id = %run_id, resource = %node.id, "node_started");
          self.notifier.notify(ApplyEvent::NodeStarted {
            run_id: run_id.clone(),
            id: node.id.clone(),
          });

          let provider = Arc::clone(&self.provider);
          let prior = Arc::clone(&prior);
          let node = node.clone();
          tasks.spawn(async move {
            let _permit = permit;
            apply_node(provider, node, prior).await
          });
        }
      }

      if tasks.is_empty() {
        break;
      }

      tokio::select! {
        joined = tasks.join_next() => {
          let outcome = match joined {
            Some(Ok(outcome)) => outcome,
            Some(Err(join_error)) => {
              return Err(EngineError::Worker {
                message: join_error.to_string(),
              });
            }
            None => continue,
          };
          self.finish_node(
            outcome,
            &run_id,
            &graph,
            &mut run,
            &mut status,
            &mut records,
            &mut next_state,
            &mut failed_any,
          );
        }
        _ = cancel.cancelled(), if !cancelled => {
          cancelled = true;
          warn!(run_id = %run_id, "apply cancelled; draining in-flight nodes");
        }
      }
    }

    if cancelled {
      self.notifier.notify(ApplyEvent::RunFailed {
        run_id: run_id.clone(),
        error: "run cancelled".to_string(),
      });
      return Err(EngineError::Cancelled);
    }

    // Nodes never scheduled (fail-fast stopped the run before they started).
    let unattempted: Vec<ResourceId> = status
      .iter()
      .filter(|(_, status)| **status == NodeStatus::Pending)
      .map(|(id, _)| id.clone())
      .collect();
    for id in unattempted {
      if let Some(slot) = run.take_slot(&id) {
        slot.fail(OutputError::Interrupted {
          node: id.to_string(),
        });
      }
      warn!(run_id = %run_id, resource = %id, "node_skipped");
      self.notifier.notify(ApplyEvent::NodeSkipped {
        run_id: run_id.clone(),
        id: id.clone(),
      });
      records.insert(id.to_string(), ApplyRecord::Skipped);
    }

    // Failed or skipped nodes that exist remotely from the prior run keep
    // their record; the resource is still out there.
    for node in run.nodes() {
      if !records
        .get(&node.id.to_string())
        .is_some_and(ApplyRecord::is_resolved)
      {
        if let Some(record) = prior.get(&node.id) {
          next_state.insert(&node.id, record.clone());
        }
      }
    }

    let mut exports = BTreeMap::new();
    for (name, output) in run.exports() {
      match output.wait().await {
        Ok(value) => {
          exports.insert(name.clone(), value);
        }
        Err(err) => {
          warn!(run_id = %run_id, export = %name, error = %err, "export unresolved; omitting");
        }
      }
    }

    let report = ApplyReport {
      run_id: run_id.clone(),
      records,
      exports,
      state: next_state,
    };
    if report.is_success() {
      info!(run_id = %run_id, resolved = report.records.len(), "apply_completed");
      self.notifier.notify(ApplyEvent::RunCompleted { run_id });
    } else {
      let first_failure = report
        .failures()
        .next()
        .map(|(id, _, error)| format!("{id}: {error}"))
        .unwrap_or_else(|| "nodes were skipped".to_string());
      error!(run_id = %run_id, error = %first_failure, "apply_failed");
      self.notifier.notify(ApplyEvent::RunFailed {
        run_id,
        error: first_failure,
      });
    }
    Ok(report)
  }

  #[allow(clippy::too_many_arguments)]
  fn finish_node(
    &self,
    outcome: TaskOutcome,
    run_id: &str,
    graph: &Graph,
    run: &mut Run,
    status: &mut HashMap<ResourceId, NodeStatus>,
    records: &mut BTreeMap<String, ApplyRecord>,
    next_state: &mut RunState,
    failed_any: &mut bool,
  ) {
    let TaskOutcome { id, result } = outcome;
    match result {
      Ok(applied) => {
        status.insert(id.clone(), NodeStatus::Resolved);
        if let Some(state) = applied.record.state() {
          if let Some(slot) = run.take_slot(&id) {
            slot.resolve(state.clone());
          }
          next_state.insert(
            &id,
            ResourceRecord {
              id: state.id.clone(),
              properties: applied.resolved,
              attrs: state.attrs.clone(),
            },
          );
        }
        info!(run_id = %run_id, resource = %id, "node_resolved");
        self.notifier.notify(ApplyEvent::NodeResolved {
          run_id: run_id.to_string(),
          id: id.clone(),
          record: applied.record.clone(),
        });
        records.insert(id.to_string(), applied.record);
      }
      Err(message) => {
        *failed_any = true;
        status.insert(id.clone(), NodeStatus::Failed);
        if let Some(slot) = run.take_slot(&id) {
          slot.fail(OutputError::ResourceFailed {
            node: id.to_string(),
            message: message.clone(),
          });
        }
        error!(run_id = %run_id, resource = %id, error = %message, "node_failed");
        self.notifier.notify(ApplyEvent::NodeFailed {
          run_id: run_id.to_string(),
          id: id.clone(),
          root: id.clone(),
          error: message.clone(),
        });
        records.insert(
          id.to_string(),
          ApplyRecord::Failed {
            error: message.clone(),
            root: id.clone(),
          },
        );

        // Fail-fast propagation: everything downstream is unreachable now.
        for dependent in graph.transitive_dependents(&id) {
          if status.get(&dependent) != Some(&NodeStatus::Pending) {
            continue;
          }
          status.insert(dependent.clone(), NodeStatus::Failed);
          let cause = format!("upstream resource '{id}' failed: {message}");
          if let Some(slot) = run.take_slot(&dependent) {
            slot.fail(OutputError::ResourceFailed {
              node: dependent.to_string(),
              message: cause.clone(),
            });
          }
          warn!(run_id = %run_id, resource = %dependent, root = %id, "node_failed_upstream");
          self.notifier.notify(ApplyEvent::NodeFailed {
            run_id: run_id.to_string(),
            id: dependent.clone(),
            root: id.clone(),
            error: cause.clone(),
          });
          records.insert(
            dependent.to_string(),
            ApplyRecord::Failed {
              error: cause,
              root: id.clone(),
            },
          );
        }
      }
    }
  }

  /// Tear down every recorded node of the run, dependents before their
  /// dependencies.
  ///
  /// Protected nodes are never passed to the provider's delete; they are
  /// recorded as `Protected` and leave the teardown unsuccessful, so a
  /// protected topology fails closed until the policy is lifted explicitly.
  pub async fn destroy(
    &self,
    run: &Run,
    state: &RunState,
    cancel: CancellationToken,
  ) -> Result<DestroyReport, EngineError> {
    let graph = Graph::build(run)?;
    info!(run = %run.name(), nodes = run.nodes().len(), "destroy_started");

    let mut records = BTreeMap::new();
    for id in graph.order().iter().rev() {
      if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }
      let Some(record) = state.get(id) else {
        continue;
      };
      let protect = run.get(id).is_some_and(|node| node.policy.protect);
      if protect {
        warn!(resource = %id, "refusing to delete protected resource");
        records.insert(id.to_string(), DestroyRecord::Protected);
        continue;
      }
      match self.provider.delete(&id.kind, &id.name, &record.id).await {
        Ok(()) => {
          info!(resource = %id, "node_deleted");
          records.insert(id.to_string(), DestroyRecord::Deleted);
        }
        Err(err) => {
          error!(resource = %id, error = %err, "delete_failed");
          records.insert(
            id.to_string(),
            DestroyRecord::Failed {
              error: err.to_string(),
            },
          );
        }
      }
    }

    let report = DestroyReport { records };
    if report.is_success() {
      info!(run = %run.name(), "destroy_completed");
    } else {
      warn!(run = %run.name(), "destroy finished with protected or failed nodes");
    }
    Ok(report)
  }
}

/// Resolve a node's property bag and reconcile it against the provider.
///
/// Blocks only on the node's own upstream outputs, which the scheduler has
/// already driven to a terminal state.
async fn apply_node(
  provider: Arc<dyn Provider>,
  node: ResourceNode,
  prior: Arc<RunState>,
) -> TaskOutcome {
  let mut resolved = serde_json::Map::new();
  for (field, value) in &node.properties {
    match value {
      PropertyValue::Literal(value) => {
        resolved.insert(field.clone(), value.clone());
      }
      PropertyValue::Dynamic(output) => match output.wait().await {
        Ok(value) => {
          resolved.insert(field.clone(), value);
        }
        Err(err) => {
          return TaskOutcome {
            id: node.id.clone(),
            result: Err(format!("input '{field}' unresolved: {err}")),
          };
        }
      },
    }
  }

  match prior.get(&node.id) {
    Some(record) if !properties_differ(&resolved, &record.properties, &node.policy.ignore_fields) => {
      let state = ResourceState {
        id: record.id.clone(),
        attrs: record.attrs.clone(),
      };
      TaskOutcome {
        id: node.id,
        result: Ok(Applied {
          record: ApplyRecord::Unchanged { state },
          resolved,
        }),
      }
    }
    record => {
      let prior_id = record.map(|record| record.id.clone());
      let updating = prior_id.is_some();
      let request = ApplyRequest {
        kind: node.id.kind.clone(),
        name: node.id.name.clone(),
        properties: resolved.clone(),
        prior_id,
        ignore_fields: node.policy.ignore_fields.clone(),
      };
      match provider.create_or_update(request).await {
        Ok(state) => {
          let record = if updating {
            ApplyRecord::Updated { state }
          } else {
            ApplyRecord::Created { state }
          };
          TaskOutcome {
            id: node.id,
            result: Ok(Applied { record, resolved }),
          }
        }
        Err(err) => TaskOutcome {
          id: node.id,
          result: Err(err.to_string()),
        },
      }
    }
  }
}

/// Whether desired properties diverge from the prior record, ignoring the
/// node's `ignore_fields`.
fn properties_differ(
  desired: &serde_json::Map<String, Value>,
  prior: &serde_json::Map<String, Value>,
  ignore: &BTreeSet<String>,
) -> bool {
  desired
    .keys()
    .chain(prior.keys())
    .filter(|field| !ignore.contains(*field))
    .any(|field| desired.get(field) != prior.get(field))
}
