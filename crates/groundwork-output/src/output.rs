use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::OutputError;

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, OutputError>>>;

/// A value produced by a resource operation, possibly not yet known.
///
/// An output is either already resolved or pending on one or more upstream
/// resource nodes. It can be transformed (`map`) and combined (`zip`, `join`)
/// without blocking; only the apply engine awaits it, via [`Output::wait`],
/// at the point a dependent node is about to be applied.
///
/// Cloning is cheap: all clones share the same resolution, and once resolved
/// the value is immutable.
pub struct Output<T> {
  /// Resource node ids this value is derived from, in derivation order.
  deps: Arc<[String]>,
  inner: SharedResult<T>,
}

impl<T> Clone for Output<T> {
  fn clone(&self) -> Self {
    Self {
      deps: self.deps.clone(),
      inner: self.inner.clone(),
    }
  }
}

impl<T> fmt::Debug for Output<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Output")
      .field("deps", &self.deps)
      .finish_non_exhaustive()
  }
}

impl<T> Output<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// An output that is already resolved to `value`.
  pub fn resolved(value: T) -> Self {
    Self {
      deps: Arc::from(Vec::new()),
      inner: futures::future::ready(Ok(value)).boxed().shared(),
    }
  }

  /// An output that carries `error` instead of a value.
  pub fn failed(error: OutputError) -> Self {
    Self {
      deps: Arc::from(Vec::new()),
      inner: futures::future::ready(Err(error)).boxed().shared(),
    }
  }

  /// Create a pending output for the resource node `producer`, together with
  /// the slot the apply engine uses to resolve it exactly once.
  ///
  /// If the slot is dropped without resolving (the run aborted before the
  /// node was applied), the output resolves to [`OutputError::Interrupted`].
  pub fn deferred(producer: impl Into<String>) -> (OutputSlot<T>, Self) {
    let node = producer.into();
    let (sender, receiver) = oneshot::channel::<Result<T, OutputError>>();

    let interrupted = node.clone();
    let inner = async move {
      match receiver.await {
        Ok(result) => result,
        Err(_) => Err(OutputError::Interrupted { node: interrupted }),
      }
    }
    .boxed()
    .shared();

    let output = Self {
      deps: Arc::from(vec![node]),
      inner,
    };
    (OutputSlot { sender }, output)
  }

  /// Transform the resolved value with `f`, without blocking.
  ///
  /// A failed input short-circuits: `f` is never invoked and the failure is
  /// carried through unchanged.
  pub fn map<U, F>(&self, f: F) -> Output<U>
  where
    U: Clone + Send + Sync + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    let inner = self.inner.clone();
    Output {
      deps: self.deps.clone(),
      inner: async move { inner.await.map(f) }.boxed().shared(),
    }
  }

  /// Combine two outputs into one that resolves once both have resolved.
  ///
  /// If either input fails, the combined output fails with the first failure;
  /// a second failure is suppressed but logged.
  pub fn zip<U>(&self, other: &Output<U>) -> Output<(T, U)>
  where
    U: Clone + Send + Sync + 'static,
  {
    let left = self.inner.clone();
    let right = other.inner.clone();
    let deps: Vec<String> = self
      .deps
      .iter()
      .chain(other.deps.iter())
      .cloned()
      .collect();

    Output {
      deps: Arc::from(deps),
      inner: async move {
        let (left, right) = futures::join!(left, right);
        match (left, right) {
          (Ok(left), Ok(right)) => Ok((left, right)),
          (Err(first), Ok(_)) | (Ok(_), Err(first)) => Err(first),
          (Err(first), Err(suppressed)) => {
            warn!(error = %suppressed, "suppressing secondary output failure");
            Err(first)
          }
        }
      }
      .boxed()
      .shared(),
    }
  }

  /// Combine any number of outputs into one that resolves to their values in
  /// order, once every input has resolved.
  ///
  /// The first failure wins; later failures are suppressed but logged.
  pub fn join(outputs: impl IntoIterator<Item = Output<T>>) -> Output<Vec<T>> {
    let outputs: Vec<Output<T>> = outputs.into_iter().collect();
    let deps: Vec<String> = outputs
      .iter()
      .flat_map(|output| output.deps.iter().cloned())
      .collect();
    let inners: Vec<SharedResult<T>> =
      outputs.into_iter().map(|output| output.inner).collect();

    Output {
      deps: Arc::from(deps),
      inner: async move {
        let results = futures::future::join_all(inners).await;
        let mut values = Vec::with_capacity(results.len());
        let mut first: Option<OutputError> = None;
        for result in results {
          match result {
            Ok(value) => values.push(value),
            Err(error) if first.is_none() => first = Some(error),
            Err(suppressed) => {
              warn!(error = %suppressed, "suppressing secondary output failure");
            }
          }
        }
        match first {
          Some(error) => Err(error),
          None => Ok(values),
        }
      }
      .boxed()
      .shared(),
    }
  }

  /// Await the resolved value.
  ///
  /// This is the apply engine's accessor, used once a node's upstream
  /// dependencies are known to be resolved. Stack-declaration code must not
  /// call it; composition stays non-blocking through `map`/`zip`/`join`.
  pub async fn wait(&self) -> Result<T, OutputError> {
    self.inner.clone().await
  }
}

impl<T> Output<T> {
  /// Ids of the resource nodes this output is derived from.
  pub fn dependencies(&self) -> &[String] {
    &self.deps
  }
}

/// Resolve-once handle for a deferred output.
///
/// Held by the run for each declared node and consumed by the apply engine
/// when the node reaches a terminal state.
#[derive(Debug)]
pub struct OutputSlot<T> {
  sender: oneshot::Sender<Result<T, OutputError>>,
}

impl<T> OutputSlot<T> {
  /// Resolve the output to `value`, waking every consumer.
  pub fn resolve(self, value: T) {
    let _ = self.sender.send(Ok(value));
  }

  /// Resolve the output to a failure, waking every consumer.
  pub fn fail(self, error: OutputError) {
    let _ = self.sender.send(Err(error));
  }
}
