//! Groundwork Output
//!
//! This crate provides `Output<T>`, a composable value that becomes available
//! only after the resource producing it has been reconciled against the
//! remote provider.
//!
//! Outputs are the glue between declared resources: a stack wires one node's
//! output into another node's property bag without ever blocking, and the
//! apply engine later resolves the chain once the producing node's remote
//! call completes. Every output remembers which resource nodes it was derived
//! from, which is what lets the dependency graph be inferred from plain value
//! consumption.

mod error;
mod output;

pub use error::OutputError;
pub use output::{Output, OutputSlot};
