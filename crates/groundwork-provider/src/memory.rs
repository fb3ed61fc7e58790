use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use groundwork_graph::ResourceState;

use crate::error::ProviderError;
use crate::provider::{ApplyRequest, Provider};

type ComputedAttrs =
  Box<dyn Fn(&str, &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> + Send + Sync>;

/// One remote call as the provider observed it, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
  Create { kind: String, name: String },
  Update { kind: String, name: String },
  Delete { kind: String, name: String },
}

impl ProviderCall {
  pub fn kind(&self) -> &str {
    match self {
      Self::Create { kind, .. } | Self::Update { kind, .. } | Self::Delete { kind, .. } => kind,
    }
  }

  pub fn name(&self) -> &str {
    match self {
      Self::Create { name, .. } | Self::Update { name, .. } | Self::Delete { name, .. } => name,
    }
  }
}

#[derive(Default)]
struct MemoryState {
  sequence: u64,
  records: HashMap<(String, String), ResourceState>,
  calls: Vec<ProviderCall>,
  failures: HashMap<(String, String), String>,
}

/// An in-process provider.
///
/// Fabricates sequential identifiers from the resource kind, echoes the
/// requested properties back as attributes (plus a `name` attribute, the way
/// a real provider reports the resource's own name), and keeps a call log.
/// Per-kind computed-attribute hooks fill in values only the remote side
/// would know, and scripted failures let tests exercise the engine's
/// failure propagation.
#[derive(Default)]
pub struct MemoryProvider {
  state: Mutex<MemoryState>,
  computed: HashMap<String, ComputedAttrs>,
}

impl MemoryProvider {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register computed attributes for every resource of `kind`, merged over
  /// the echoed properties after each create/update.
  pub fn with_computed<F>(mut self, kind: impl Into<String>, attrs: F) -> Self
  where
    F: Fn(&str, &serde_json::Map<String, Value>) -> serde_json::Map<String, Value>
      + Send
      + Sync
      + 'static,
  {
    self.computed.insert(kind.into(), Box::new(attrs));
    self
  }

  /// Script the next and all further calls for (kind, name) to fail.
  pub fn fail_on(
    &self,
    kind: impl Into<String>,
    name: impl Into<String>,
    message: impl Into<String>,
  ) {
    let mut state = self.lock();
    state
      .failures
      .insert((kind.into(), name.into()), message.into());
  }

  /// Every remote call issued so far, in order.
  pub fn calls(&self) -> Vec<ProviderCall> {
    self.lock().calls.clone()
  }

  /// Calls issued for a single resource kind, in order.
  pub fn calls_for(&self, kind: &str) -> Vec<ProviderCall> {
    self
      .lock()
      .calls
      .iter()
      .filter(|call| call.kind() == kind)
      .cloned()
      .collect()
  }

  /// The currently recorded remote state for (kind, name), if any.
  pub fn record(&self, kind: &str, name: &str) -> Option<ResourceState> {
    self
      .lock()
      .records
      .get(&(kind.to_string(), name.to_string()))
      .cloned()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
    // A poisoned lock means a panicking test; the state is still usable.
    match self.state.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  fn next_id(state: &mut MemoryState, kind: &str) -> String {
    let prefix = kind
      .rsplit(':')
      .next()
      .unwrap_or(kind)
      .to_ascii_lowercase();
    state.sequence += 1;
    format!("{}-{:06x}", prefix, state.sequence)
  }
}

#[async_trait]
impl Provider for MemoryProvider {
  async fn create_or_update(&self, request: ApplyRequest) -> Result<ResourceState, ProviderError> {
    let key = (request.kind.clone(), request.name.clone());
    let mut state = self.lock();

    state.calls.push(match request.prior_id {
      None => ProviderCall::Create {
        kind: request.kind.clone(),
        name: request.name.clone(),
      },
      Some(_) => ProviderCall::Update {
        kind: request.kind.clone(),
        name: request.name.clone(),
      },
    });

    if let Some(message) = state.failures.get(&key) {
      return Err(ProviderError::call_failed(
        &request.kind,
        &request.name,
        message.clone(),
      ));
    }

    let id = match &request.prior_id {
      Some(id) => id.clone(),
      None => Self::next_id(&mut state, &request.kind),
    };

    let mut attrs = request.properties.clone();
    attrs
      .entry("name".to_string())
      .or_insert_with(|| Value::String(request.name.clone()));
    if let Some(computed) = self.computed.get(&request.kind) {
      attrs.extend(computed(&request.name, &request.properties));
    }

    let resolved = ResourceState { id, attrs };
    debug!(kind = %request.kind, name = %request.name, id = %resolved.id, "memory provider reconciled");
    state.records.insert(key, resolved.clone());
    Ok(resolved)
  }

  async fn delete(&self, kind: &str, name: &str, _id: &str) -> Result<(), ProviderError> {
    let key = (kind.to_string(), name.to_string());
    let mut state = self.lock();
    state.calls.push(ProviderCall::Delete {
      kind: kind.to_string(),
      name: name.to_string(),
    });
    if let Some(message) = state.failures.get(&key) {
      return Err(ProviderError::call_failed(kind, name, message.clone()));
    }
    state.records.remove(&key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;
  use serde_json::json;

  fn request(kind: &str, name: &str, prior_id: Option<&str>) -> ApplyRequest {
    let mut properties = serde_json::Map::new();
    properties.insert("cidr_block".to_string(), json!("10.0.0.0/16"));
    ApplyRequest {
      kind: kind.to_string(),
      name: name.to_string(),
      properties,
      prior_id: prior_id.map(str::to_string),
      ignore_fields: BTreeSet::new(),
    }
  }

  #[tokio::test]
  async fn create_fabricates_a_kind_prefixed_id() {
    let provider = MemoryProvider::new();
    let state = provider
      .create_or_update(request("aws:ec2:Vpc", "primary", None))
      .await
      .unwrap();
    assert!(state.id.starts_with("vpc-"));
    assert_eq!(state.attrs["cidr_block"], "10.0.0.0/16");
    assert_eq!(state.attrs["name"], "primary");
  }

  #[tokio::test]
  async fn update_keeps_the_prior_id() {
    let provider = MemoryProvider::new();
    let state = provider
      .create_or_update(request("aws:ec2:Vpc", "primary", Some("vpc-00cafe")))
      .await
      .unwrap();
    assert_eq!(state.id, "vpc-00cafe");
    assert_eq!(
      provider.calls(),
      vec![ProviderCall::Update {
        kind: "aws:ec2:Vpc".to_string(),
        name: "primary".to_string(),
      }],
    );
  }

  #[tokio::test]
  async fn computed_attrs_are_merged() {
    let provider = MemoryProvider::new().with_computed("aws:eks:Cluster", |name, _| {
      let mut attrs = serde_json::Map::new();
      attrs.insert(
        "endpoint".to_string(),
        Value::String(format!("https://{name}.eks.local")),
      );
      attrs
    });
    let state = provider
      .create_or_update(request("aws:eks:Cluster", "megocluster", None))
      .await
      .unwrap();
    assert_eq!(state.attrs["endpoint"], "https://megocluster.eks.local");
  }

  #[tokio::test]
  async fn scripted_failure_is_returned_and_logged() {
    let provider = MemoryProvider::new();
    provider.fail_on("aws:ec2:Subnet", "primary-1a", "cidr conflict");
    let err = provider
      .create_or_update(request("aws:ec2:Subnet", "primary-1a", None))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("cidr conflict"));
    assert_eq!(provider.calls().len(), 1);
    assert!(provider.record("aws:ec2:Subnet", "primary-1a").is_none());
  }

  #[tokio::test]
  async fn delete_removes_the_record() {
    let provider = MemoryProvider::new();
    let state = provider
      .create_or_update(request("aws:ec2:Vpc", "primary", None))
      .await
      .unwrap();
    provider
      .delete("aws:ec2:Vpc", "primary", &state.id)
      .await
      .unwrap();
    assert!(provider.record("aws:ec2:Vpc", "primary").is_none());
  }
}
