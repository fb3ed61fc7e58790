use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use groundwork_graph::{ResourceId, ResourceState};

/// Terminal outcome of reconciling one resource node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyRecord {
  /// No prior identifier was recorded; the provider created the resource.
  Created { state: ResourceState },
  /// Desired properties changed outside `ignore_fields`; one update call.
  Updated { state: ResourceState },
  /// Desired state matched the prior record; no remote call was issued.
  Unchanged { state: ResourceState },
  /// The node's own call failed, or an upstream failure propagated to it.
  /// `root` names the causal failure.
  Failed { error: String, root: ResourceId },
  /// Never attempted: the run stopped scheduling after a failure.
  Skipped,
}

impl ApplyRecord {
  pub fn is_resolved(&self) -> bool {
    matches!(self, Self::Created { .. } | Self::Updated { .. } | Self::Unchanged { .. })
  }

  pub fn state(&self) -> Option<&ResourceState> {
    match self {
      Self::Created { state } | Self::Updated { state } | Self::Unchanged { state } => Some(state),
      Self::Failed { .. } | Self::Skipped => None,
    }
  }
}

/// What a run knows about a resource that exists remotely: its identifier,
/// the properties last applied, and the attributes the provider reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
  pub id: String,
  pub properties: serde_json::Map<String, Value>,
  pub attrs: serde_json::Map<String, Value>,
}

/// Recorded remote state for one run, keyed by logical resource.
///
/// Produced by every apply and optionally fed into the next one to drive
/// create-vs-update decisions; it lives only for the process (no cross-run
/// persistence in this core).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
  records: BTreeMap<String, ResourceRecord>,
}

impl RunState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &ResourceId) -> Option<&ResourceRecord> {
    self.records.get(&id.to_string())
  }

  pub fn insert(&mut self, id: &ResourceId, record: ResourceRecord) {
    self.records.insert(id.to_string(), record);
  }

  pub fn records(&self) -> &BTreeMap<String, ResourceRecord> {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

/// Per-outcome counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
  pub created: usize,
  pub updated: usize,
  pub unchanged: usize,
  pub failed: usize,
  pub skipped: usize,
}

/// Result of a complete apply run.
#[derive(Debug, Serialize)]
pub struct ApplyReport {
  pub run_id: String,
  /// Terminal record per node, keyed by `kind/name`.
  pub records: BTreeMap<String, ApplyRecord>,
  /// Named run artifacts whose outputs resolved.
  pub exports: BTreeMap<String, Value>,
  /// Remote state after this run, usable as the next run's prior state.
  pub state: RunState,
}

impl ApplyReport {
  /// True when every node resolved.
  pub fn is_success(&self) -> bool {
    self.records.values().all(ApplyRecord::is_resolved)
  }

  pub fn record(&self, id: &ResourceId) -> Option<&ApplyRecord> {
    self.records.get(&id.to_string())
  }

  pub fn summary(&self) -> ApplySummary {
    let mut summary = ApplySummary::default();
    for record in self.records.values() {
      match record {
        ApplyRecord::Created { .. } => summary.created += 1,
        ApplyRecord::Updated { .. } => summary.updated += 1,
        ApplyRecord::Unchanged { .. } => summary.unchanged += 1,
        ApplyRecord::Failed { .. } => summary.failed += 1,
        ApplyRecord::Skipped => summary.skipped += 1,
      }
    }
    summary
  }

  /// Failed nodes with their causal roots, for scoping a retry.
  pub fn failures(&self) -> impl Iterator<Item = (&String, &ResourceId, &String)> {
    self.records.iter().filter_map(|(id, record)| match record {
      ApplyRecord::Failed { error, root } => Some((id, root, error)),
      _ => None,
    })
  }
}

/// Terminal outcome of tearing down one resource node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DestroyRecord {
  Deleted,
  /// The node is protected; no delete was issued and the teardown fails
  /// closed.
  Protected,
  Failed { error: String },
}

/// Result of a teardown pass.
#[derive(Debug, Serialize)]
pub struct DestroyReport {
  pub records: BTreeMap<String, DestroyRecord>,
}

impl DestroyReport {
  pub fn is_success(&self) -> bool {
    self
      .records
      .values()
      .all(|record| matches!(record, DestroyRecord::Deleted))
  }

  pub fn record(&self, id: &ResourceId) -> Option<&DestroyRecord> {
    self.records.get(&id.to_string())
  }
}
