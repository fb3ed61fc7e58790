//! Apply events and notifiers for observability.
//!
//! Events are emitted while the engine reconciles a run, letting consumers
//! observe progress, persist outcomes, or stream to UIs.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use groundwork_graph::ResourceId;

use crate::report::ApplyRecord;

/// Events emitted during an apply run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApplyEvent {
  /// The run has started; the graph validated cleanly.
  RunStarted { run_id: String, run_name: String },

  /// A node's provider call is about to be issued.
  NodeStarted { run_id: String, id: ResourceId },

  /// A node reached `Resolved`.
  NodeResolved {
    run_id: String,
    id: ResourceId,
    record: ApplyRecord,
  },

  /// A node reached `Failed`, either from its own provider call or by
  /// propagation from the causal root.
  NodeFailed {
    run_id: String,
    id: ResourceId,
    root: ResourceId,
    error: String,
  },

  /// A node was never attempted because the run stopped scheduling.
  NodeSkipped { run_id: String, id: ResourceId },

  /// Every node resolved.
  RunCompleted { run_id: String },

  /// At least one node failed or was skipped.
  RunFailed { run_id: String, error: String },
}

/// Trait for receiving apply events.
///
/// The engine calls `notify` for each event - implementations decide what to
/// do with them (persist, broadcast, log, ignore, etc.).
pub trait ApplyNotifier: Send + Sync {
  fn notify(&self, event: ApplyEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ApplyNotifier for NoopNotifier {
  fn notify(&self, _event: ApplyEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls the engine; event volume is a
/// handful per node.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ApplyEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ApplyEvent>) -> Self {
    Self { sender }
  }
}

impl ApplyNotifier for ChannelNotifier {
  fn notify(&self, event: ApplyEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
