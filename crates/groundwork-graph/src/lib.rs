//! Groundwork Graph
//!
//! This crate provides the declaration side of a provisioning run: resource
//! nodes with property bags and policies, the `Run` registry stacks declare
//! against, and the dependency graph derived from output consumption.
//!
//! Declaration is synchronous and never contacts a provider. A stack calls
//! [`Run::declare`] and receives a [`ResourceHandle`] whose outputs it can
//! wire into later declarations; the edges those references imply, together
//! with explicit parent and `depends_on` links, are collected by
//! [`Graph::build`] into a validated, topologically ordered apply plan. All
//! construction errors (duplicate names, unresolved references, cycles) are
//! detected here, before any remote call is issued.

mod error;
mod graph;
mod node;
mod run;

pub use error::GraphError;
pub use graph::Graph;
pub use node::{
  properties, Policy, PropertyValue, ResourceId, ResourceNode, ResourceOptions, ResourceState,
};
pub use run::{ResourceHandle, Run};
