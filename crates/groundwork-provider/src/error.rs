use thiserror::Error;

/// Failure from a remote provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
  #[error("remote call failed for {kind} '{name}': {message}")]
  CallFailed {
    kind: String,
    name: String,
    message: String,
  },
}

impl ProviderError {
  pub fn call_failed(
    kind: impl Into<String>,
    name: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    Self::CallFailed {
      kind: kind.into(),
      name: name.into(),
      message: message.into(),
    }
  }
}
