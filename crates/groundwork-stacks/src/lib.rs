//! Groundwork Stacks
//!
//! The concrete topology this repository provisions, composed as four
//! stacks, each declaring its resource nodes against the shared [`Run`] and
//! returning only the outputs the next stage needs:
//!
//! 1. **network** - VPC, per-availability-zone public/private subnets with
//!    NAT egress, and the cluster-facing security group.
//! 2. **identity** - the cluster and node-group IAM roles with their policy
//!    attachments.
//! 3. **cluster** - the managed Kubernetes control plane, worker launch
//!    template, and one spot node group per availability zone.
//! 4. **workloads** - the kubeconfig artifact, the `infra` namespace, and
//!    the ingress controller chart keyed to that kubeconfig.

mod cluster;
mod config;
mod identity;
mod network;
pub mod simulate;
mod workloads;

use groundwork_graph::{GraphError, Run};

pub use cluster::ClusterStack;
pub use config::{DeploymentConfig, ZonePlan};
pub use identity::IdentityStack;
pub use network::NetworkStack;
pub use workloads::WorkloadsStack;

/// The export surfaces of all four stacks.
pub struct Deployment {
  pub network: NetworkStack,
  pub identity: IdentityStack,
  pub cluster: ClusterStack,
  pub workloads: WorkloadsStack,
}

/// Declare the full topology: network, then identity, then cluster, then
/// workloads, each wired from the previous stages' outputs.
pub fn deploy(run: &mut Run, config: &DeploymentConfig) -> Result<Deployment, GraphError> {
  let network = network::deploy(run, config)?;
  let identity = identity::deploy(run, config)?;
  let cluster = cluster::deploy(run, config, &network, &identity)?;
  let workloads = workloads::deploy(run, &cluster)?;
  Ok(Deployment {
    network,
    identity,
    cluster,
    workloads,
  })
}
