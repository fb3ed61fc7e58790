use thiserror::Error;

/// Failure carried by an output instead of a value.
///
/// Failures propagate through `map`/`zip`/`join` without invoking any
/// transform, so a single failed resource poisons exactly the outputs derived
/// from it and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
  /// The resource producing this output failed to apply.
  #[error("resource '{node}' failed: {message}")]
  ResourceFailed { node: String, message: String },

  /// The producing slot was dropped before the run resolved it.
  #[error("output of '{node}' was never resolved")]
  Interrupted { node: String },
}

impl OutputError {
  /// The resource node the failure originated from.
  pub fn node(&self) -> &str {
    match self {
      Self::ResourceFailed { node, .. } => node,
      Self::Interrupted { node } => node,
    }
  }
}
