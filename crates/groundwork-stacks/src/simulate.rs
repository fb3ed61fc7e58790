//! Simulated provider wiring for local runs and tests.
//!
//! The remote provisioning API lives outside this repository, so local runs
//! reconcile against a [`MemoryProvider`] taught the attributes only the
//! remote side would know: role ARNs, EIP allocations, launch template
//! versions, and the control plane's endpoint and certificate data.

use serde_json::{json, Value};

use groundwork_provider::MemoryProvider;

/// Stand-in certificate authority data: base64 of a PEM header.
const CERTIFICATE_AUTHORITY: &str = "LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0t";

pub fn provider() -> MemoryProvider {
  MemoryProvider::new()
    .with_computed("aws:iam:Role", |name, _| {
      attrs([(
        "arn",
        Value::String(format!("arn:aws:iam::123456789012:role/{name}")),
      )])
    })
    .with_computed("aws:ec2:Eip", |name, _| {
      attrs([("allocation_id", Value::String(format!("eipalloc-{name}")))])
    })
    .with_computed("aws:ec2:LaunchTemplate", |_, _| {
      attrs([("latest_version", json!(1))])
    })
    .with_computed("aws:eks:Cluster", |name, _| {
      attrs([
        (
          "endpoint",
          Value::String(format!("https://{name}.eks.eu-central-1.example.com")),
        ),
        (
          "certificate_authority",
          Value::String(CERTIFICATE_AUTHORITY.to_string()),
        ),
      ])
    })
}

fn attrs<const N: usize>(entries: [(&str, Value); N]) -> serde_json::Map<String, Value> {
  entries
    .into_iter()
    .map(|(field, value)| (field.to_string(), value))
    .collect()
}
