use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use groundwork_output::Output;

/// Identifies a resource by provider kind and logical name, unique per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
  pub kind: String,
  pub name: String,
}

impl ResourceId {
  pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      name: name.into(),
    }
  }
}

impl fmt::Display for ResourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.kind, self.name)
  }
}

/// A property bag entry: a literal value, or a value produced by another
/// resource in the same run.
#[derive(Debug, Clone)]
pub enum PropertyValue {
  Literal(Value),
  Dynamic(Output<Value>),
}

impl From<Value> for PropertyValue {
  fn from(value: Value) -> Self {
    Self::Literal(value)
  }
}

impl From<&str> for PropertyValue {
  fn from(value: &str) -> Self {
    Self::Literal(Value::String(value.to_string()))
  }
}

impl From<String> for PropertyValue {
  fn from(value: String) -> Self {
    Self::Literal(Value::String(value))
  }
}

impl From<bool> for PropertyValue {
  fn from(value: bool) -> Self {
    Self::Literal(Value::Bool(value))
  }
}

impl From<i64> for PropertyValue {
  fn from(value: i64) -> Self {
    Self::Literal(Value::from(value))
  }
}

impl From<Output<Value>> for PropertyValue {
  fn from(output: Output<Value>) -> Self {
    Self::Dynamic(output)
  }
}

impl From<Output<String>> for PropertyValue {
  fn from(output: Output<String>) -> Self {
    Self::Dynamic(output.map(Value::String))
  }
}

impl From<Output<Vec<String>>> for PropertyValue {
  fn from(output: Output<Vec<String>>) -> Self {
    Self::Dynamic(output.map(Value::from))
  }
}

/// Build a property bag from (field, value) pairs.
///
/// Anything with a `PropertyValue` conversion can be passed via `.into()`:
/// literals, JSON documents, and outputs of other resources.
pub fn properties<K, I>(entries: I) -> BTreeMap<String, PropertyValue>
where
  K: Into<String>,
  I: IntoIterator<Item = (K, PropertyValue)>,
{
  entries
    .into_iter()
    .map(|(field, value)| (field.into(), value))
    .collect()
}

/// Per-resource apply policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
  /// Forbid the engine from ever issuing a delete for this node.
  pub protect: bool,
  /// Fields excluded from the remote-state diff, so provider-side mutation
  /// of them never triggers a spurious update.
  pub ignore_fields: BTreeSet<String>,
}

/// Options attached to a declaration: relationships and policies.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
  pub parent: Option<ResourceId>,
  pub depends_on: Vec<ResourceId>,
  pub protect: bool,
  pub ignore_fields: BTreeSet<String>,
}

impl ResourceOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Options with `protect` already set, the common case for infrastructure
  /// that must survive accidental teardown.
  pub fn protected() -> Self {
    Self {
      protect: true,
      ..Self::default()
    }
  }

  pub fn parent(mut self, parent: &ResourceId) -> Self {
    self.parent = Some(parent.clone());
    self
  }

  pub fn depends_on(mut self, dependency: &ResourceId) -> Self {
    self.depends_on.push(dependency.clone());
    self
  }

  pub fn ignore_fields<I, S>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.ignore_fields.extend(fields.into_iter().map(Into::into));
    self
  }
}

/// A declared desired-state unit, registered in a run and applied by the
/// engine. Never mutated after declaration.
#[derive(Debug, Clone)]
pub struct ResourceNode {
  pub id: ResourceId,
  pub properties: BTreeMap<String, PropertyValue>,
  pub parent: Option<ResourceId>,
  pub depends_on: Vec<ResourceId>,
  pub policy: Policy,
}

/// The observed remote state of an applied resource: the provider-assigned
/// identifier plus the resolved attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
  pub id: String,
  pub attrs: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn resource_id_display_is_kind_slash_name() {
    let id = ResourceId::new("aws:ec2:Vpc", "primary");
    assert_eq!(id.to_string(), "aws:ec2:Vpc/primary");
  }

  #[test]
  fn properties_builder_accepts_mixed_values() {
    let bag = properties([
      ("cidr_block", "10.0.0.0/16".into()),
      ("tags", json!({"Name": "primary"}).into()),
      ("enabled", true.into()),
    ]);
    assert_eq!(bag.len(), 3);
    assert!(matches!(bag["cidr_block"], PropertyValue::Literal(_)));
  }

  #[test]
  fn options_builder_collects_relationships() {
    let vpc = ResourceId::new("aws:ec2:Vpc", "primary");
    let igw = ResourceId::new("aws:ec2:InternetGateway", "primary");
    let options = ResourceOptions::protected()
      .parent(&vpc)
      .depends_on(&igw)
      .ignore_fields(["tags"]);
    assert!(options.protect);
    assert_eq!(options.parent, Some(vpc));
    assert_eq!(options.depends_on, vec![igw]);
    assert!(options.ignore_fields.contains("tags"));
  }
}
