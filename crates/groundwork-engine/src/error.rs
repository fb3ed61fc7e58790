use thiserror::Error;

use groundwork_graph::GraphError;

/// Errors that abort an apply or destroy run as a whole.
///
/// Per-node provider failures are not run errors: they are recorded in the
/// report so independent subtrees can still complete.
#[derive(Debug, Error)]
pub enum EngineError {
  /// Graph construction failed; nothing was sent to the provider.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// The run was cancelled. In-flight applies were drained first.
  #[error("run cancelled")]
  Cancelled,

  /// A worker task panicked.
  #[error("apply worker failed: {message}")]
  Worker { message: String },
}
