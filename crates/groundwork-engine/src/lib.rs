//! Groundwork Apply Engine
//!
//! The engine owns the mutable apply state of a run: it validates the
//! dependency graph, reconciles each resource node against the provider once
//! its upstream outputs have resolved, and reports every terminal outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ApplyEngine                          │
//! │  - apply(run, prior, cancel) → ApplyReport                  │
//! │  - destroy(run, state, cancel) → DestroyReport              │
//! │  - readiness scheduling, bounded concurrency, fail-fast     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Provider adapter                       │
//! │  - create_or_update / delete against the remote API         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Scheduling guarantees: a node is never applied before every node whose
//! output it consumes has resolved; nodes with no ordering relationship may
//! apply concurrently, bounded by [`EngineOptions::concurrency`]. A failure
//! marks the whole dependent subtree failed while unrelated subtrees finish,
//! so a retry can be scoped to the failed part of the graph.

mod engine;
mod error;
mod events;
mod report;

pub use engine::{ApplyEngine, EngineOptions};
pub use error::EngineError;
pub use events::{ApplyEvent, ApplyNotifier, ChannelNotifier, NoopNotifier};
pub use report::{
  ApplyRecord, ApplyReport, ApplySummary, DestroyRecord, DestroyReport, ResourceRecord, RunState,
};
