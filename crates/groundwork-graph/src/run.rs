use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use groundwork_output::{Output, OutputSlot};

use crate::error::GraphError;
use crate::node::{Policy, PropertyValue, ResourceId, ResourceNode, ResourceOptions, ResourceState};

/// One provisioning run: the registry every stack declares its resource
/// nodes against, plus the named outputs exported to whatever invoked it.
///
/// The run replaces any ambient "current deployment" singleton: stacks
/// receive `&mut Run` explicitly, and one graph exists per run by
/// construction. Declarations are append-only; only the apply engine, which
/// takes the run by value, mutates apply state.
pub struct Run {
  name: String,
  nodes: Vec<ResourceNode>,
  index: HashMap<ResourceId, usize>,
  slots: HashMap<ResourceId, OutputSlot<ResourceState>>,
  exports: BTreeMap<String, Output<Value>>,
}

impl Run {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      nodes: Vec::new(),
      index: HashMap::new(),
      slots: HashMap::new(),
      exports: BTreeMap::new(),
    }
  }

  /// The run's name (the environment/stack being provisioned).
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Register a resource node and return the handle to its eventual
  /// observable state.
  ///
  /// Declaration never contacts the provider; it only records the node and
  /// the edges implied by its options and property outputs. Re-declaring an
  /// already-declared (kind, name) pair fails with
  /// [`GraphError::DuplicateDeclaration`] and leaves the first declaration
  /// in place.
  pub fn declare(
    &mut self,
    kind: impl Into<String>,
    name: impl Into<String>,
    properties: BTreeMap<String, PropertyValue>,
    options: ResourceOptions,
  ) -> Result<ResourceHandle, GraphError> {
    let id = ResourceId::new(kind, name);
    if self.index.contains_key(&id) {
      return Err(GraphError::DuplicateDeclaration { id });
    }

    let (slot, state) = Output::deferred(id.to_string());
    self.index.insert(id.clone(), self.nodes.len());
    self.slots.insert(id.clone(), slot);
    self.nodes.push(ResourceNode {
      id: id.clone(),
      properties,
      parent: options.parent,
      depends_on: options.depends_on,
      policy: Policy {
        protect: options.protect,
        ignore_fields: options.ignore_fields,
      },
    });

    Ok(ResourceHandle { id, state })
  }

  /// Register a named run artifact, resolved and surfaced after apply.
  pub fn export(&mut self, name: impl Into<String>, value: Output<Value>) {
    self.exports.insert(name.into(), value);
  }

  /// Declared nodes, in declaration order.
  pub fn nodes(&self) -> &[ResourceNode] {
    &self.nodes
  }

  pub fn get(&self, id: &ResourceId) -> Option<&ResourceNode> {
    self.index.get(id).map(|&slot| &self.nodes[slot])
  }

  pub fn contains(&self, id: &ResourceId) -> bool {
    self.index.contains_key(id)
  }

  /// Registered exports, by name.
  pub fn exports(&self) -> &BTreeMap<String, Output<Value>> {
    &self.exports
  }

  /// Take the resolve-once slot for a node. Used by the apply engine when
  /// the node reaches a terminal state; a second take returns `None`.
  pub fn take_slot(&mut self, id: &ResourceId) -> Option<OutputSlot<ResourceState>> {
    self.slots.remove(id)
  }
}

/// The output bundle of a declared node: its eventual provider identifier
/// and resolved attributes.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
  id: ResourceId,
  state: Output<ResourceState>,
}

impl ResourceHandle {
  /// The declared (kind, name) identity.
  pub fn resource_id(&self) -> &ResourceId {
    &self.id
  }

  /// The provider-assigned identifier, available once applied.
  pub fn id(&self) -> Output<String> {
    self.state.map(|state| state.id)
  }

  /// A single resolved attribute; `Null` if the provider never set it.
  pub fn attr(&self, field: &str) -> Output<Value> {
    let field = field.to_string();
    self
      .state
      .map(move |state| state.attrs.get(&field).cloned().unwrap_or(Value::Null))
  }

  /// A resolved attribute coerced to a string. Non-string values render as
  /// JSON; missing attributes render empty.
  pub fn attr_string(&self, field: &str) -> Output<String> {
    self.attr(field).map(|value| match value {
      Value::String(value) => value,
      Value::Null => String::new(),
      other => other.to_string(),
    })
  }

  /// The full eventual state. Consumed by combinators that need both the
  /// identifier and attributes at once.
  pub fn state(&self) -> &Output<ResourceState> {
    &self.state
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  use crate::node::properties;
  use serde_json::json;

  #[test]
  fn duplicate_declaration_keeps_first_node() {
    let mut run = Run::new("test");
    run
      .declare(
        "aws:ec2:Vpc",
        "primary",
        properties([("cidr_block", "10.0.0.0/16".into())]),
        ResourceOptions::new(),
      )
      .unwrap();

    let err = run
      .declare(
        "aws:ec2:Vpc",
        "primary",
        properties([("cidr_block", "10.1.0.0/16".into())]),
        ResourceOptions::new(),
      )
      .unwrap_err();

    assert!(matches!(err, GraphError::DuplicateDeclaration { .. }));
    assert_eq!(run.nodes().len(), 1);
    let kept = run.get(&ResourceId::new("aws:ec2:Vpc", "primary")).unwrap();
    match &kept.properties["cidr_block"] {
      PropertyValue::Literal(value) => assert_eq!(value, "10.0.0.0/16"),
      PropertyValue::Dynamic(_) => panic!("expected literal"),
    }
  }

  #[test]
  fn same_name_different_kind_is_allowed() {
    let mut run = Run::new("test");
    run
      .declare("aws:ec2:Subnet", "primary-1a", BTreeMap::new(), ResourceOptions::new())
      .unwrap();
    run
      .declare(
        "aws:ec2:RouteTableAssociation",
        "primary-1a",
        BTreeMap::new(),
        ResourceOptions::new(),
      )
      .unwrap();
    assert_eq!(run.nodes().len(), 2);
  }

  #[tokio::test]
  async fn handle_outputs_resolve_from_slot() {
    let mut run = Run::new("test");
    let vpc = run
      .declare("aws:ec2:Vpc", "primary", BTreeMap::new(), ResourceOptions::new())
      .unwrap();

    let id_output = vpc.id();
    let cidr = vpc.attr_string("cidr_block");
    let missing = vpc.attr("nonexistent");

    let slot = run.take_slot(vpc.resource_id()).unwrap();
    let mut attrs = serde_json::Map::new();
    attrs.insert("cidr_block".to_string(), json!("10.0.0.0/16"));
    slot.resolve(ResourceState {
      id: "vpc-000001".to_string(),
      attrs,
    });

    assert_eq!(id_output.wait().await.as_deref(), Ok("vpc-000001"));
    assert_eq!(cidr.wait().await.as_deref(), Ok("10.0.0.0/16"));
    assert_eq!(missing.wait().await, Ok(Value::Null));
  }

  #[test]
  fn slot_can_only_be_taken_once() {
    let mut run = Run::new("test");
    let vpc = run
      .declare("aws:ec2:Vpc", "primary", BTreeMap::new(), ResourceOptions::new())
      .unwrap();
    assert!(run.take_slot(vpc.resource_id()).is_some());
    assert!(run.take_slot(vpc.resource_id()).is_none());
  }
}
