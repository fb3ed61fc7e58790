//! Groundwork Provider
//!
//! The adapter boundary between the apply engine and a remote provisioning
//! API. The engine hands a [`Provider`] a resolved property bag for one
//! resource at a time; the provider answers with the remote identifier and
//! attribute bag, which flow back into the run's outputs.
//!
//! The remote API itself lives outside this repository. [`MemoryProvider`]
//! is the in-process stand-in used by tests and simulated CLI runs.

mod error;
mod memory;
mod provider;

pub use error::ProviderError;
pub use memory::{MemoryProvider, ProviderCall};
pub use provider::{ApplyRequest, Provider};
