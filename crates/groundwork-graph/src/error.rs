use thiserror::Error;

use crate::node::ResourceId;

/// Graph-construction errors, all detected before any provider call.
#[derive(Debug, Error)]
pub enum GraphError {
  /// The same (kind, name) pair was declared twice in one run.
  #[error("resource '{id}' declared more than once")]
  DuplicateDeclaration { id: ResourceId },

  /// The dependency graph contains a cycle; the path names every node on it.
  #[error("dependency cycle detected: {}", .path.join(" -> "))]
  CycleDetected { path: Vec<String> },

  /// A property bag, parent, or ordering hint references a node that was
  /// never declared in this run.
  #[error("resource '{consumer}' references '{missing}', which was never declared")]
  UnresolvedReference { consumer: ResourceId, missing: String },
}
