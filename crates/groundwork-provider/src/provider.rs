use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;

use groundwork_graph::ResourceState;

use crate::error::ProviderError;

/// One reconcile request: the resolved desired state of a single resource.
///
/// `prior_id` distinguishes create from update: `None` means no remote
/// identifier is recorded for this logical name yet. `ignore_fields` names
/// property-bag fields the provider's own diff must not flag, so external
/// mutation of those fields never triggers a spurious update.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
  pub kind: String,
  pub name: String,
  pub properties: serde_json::Map<String, Value>,
  pub prior_id: Option<String>,
  pub ignore_fields: BTreeSet<String>,
}

/// The remote provisioning API, reduced to the two operations the apply
/// engine needs. Implementations translate a property bag into remote calls
/// and report back the identifier and resolved attributes.
#[async_trait]
pub trait Provider: Send + Sync {
  /// Create the resource, or update it in place when `prior_id` is set.
  async fn create_or_update(&self, request: ApplyRequest) -> Result<ResourceState, ProviderError>;

  /// Delete the resource. The engine never calls this for protected nodes.
  async fn delete(&self, kind: &str, name: &str, id: &str) -> Result<(), ProviderError>;
}
