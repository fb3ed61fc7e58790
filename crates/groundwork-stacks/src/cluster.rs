//! Cluster stack: the managed Kubernetes control plane, the worker launch
//! template, and one spot node group per availability zone.

use serde_json::{json, Value};

use groundwork_graph::{properties, GraphError, ResourceOptions, Run};
use groundwork_output::Output;

use crate::config::DeploymentConfig;
use crate::identity::IdentityStack;
use crate::network::NetworkStack;

/// The three outputs the workloads stack needs to talk to the cluster.
pub struct ClusterStack {
  pub name: Output<String>,
  pub endpoint: Output<String>,
  pub certificate_authority: Output<String>,
}

pub fn deploy(
  run: &mut Run,
  config: &DeploymentConfig,
  network: &NetworkStack,
  identity: &IdentityStack,
) -> Result<ClusterStack, GraphError> {
  let env = &config.env;
  let cluster_name = &config.cluster_name;

  // The control plane spans every subnet; the node groups pin one private
  // subnet each below.
  let vpc_config = network
    .private_subnet_ids
    .zip(&network.public_subnet_ids)
    .zip(&network.cluster_security_group_id)
    .map(|((private, public), security_group)| {
      let subnet_ids: Vec<String> = private.into_iter().chain(public).collect();
      json!({
        "endpoint_private_access": true,
        "endpoint_public_access": true,
        "public_access_cidrs": ["0.0.0.0/0"],
        "subnet_ids": subnet_ids,
        "security_group_ids": [security_group],
      })
    });

  let cluster = run.declare(
    "aws:eks:Cluster",
    cluster_name,
    properties([
      ("name", cluster_name.as_str().into()),
      ("version", "1.19".into()),
      ("role_arn", identity.cluster_role_arn.clone().into()),
      ("vpc_config", vpc_config.into()),
      (
        "enabled_cluster_log_types",
        json!(["api", "audit", "authenticator", "controllerManager", "scheduler"]).into(),
      ),
      ("tags", json!({ "k8s.io/cluster-autoscaler/enabled": "true" }).into()),
    ]),
    ResourceOptions::protected(),
  )?;

  let launch_template = run.declare(
    "aws:ec2:LaunchTemplate",
    format!("{cluster_name}-{env}-launchTemplate"),
    properties([
      ("description", "Launch template for EKS worker nodes".into()),
      (
        "vpc_security_group_ids",
        network
          .cluster_security_group_id
          .map(|security_group| vec![security_group])
          .into(),
      ),
      (
        "block_device_mappings",
        json!([{
          "device_name": "/dev/xvda",
          "ebs": { "volume_size": 20, "delete_on_termination": "true" },
        }])
        .into(),
      ),
      ("ebs_optimized", "true".into()),
      (
        "tag_specifications",
        json!([{
          "resource_type": "instance",
          "tags": { "Name": format!("{cluster_name}-eksCluster-worker") },
        }])
        .into(),
      ),
    ]),
    ResourceOptions::protected().parent(cluster.resource_id()),
  )?;

  let launch_template_ref = launch_template
    .attr_string("name")
    .zip(&launch_template.attr_string("latest_version"))
    .map(|(name, version)| json!({ "name": name, "version": version }));

  for (index, zone) in config.zones.iter().enumerate() {
    let letter = zone.letter();
    let subnet_ids = network
      .private_subnet_ids
      .map(move |ids| Value::from(ids.get(index).cloned().into_iter().collect::<Vec<_>>()));

    run.declare(
      "aws:eks:NodeGroup",
      format!("{cluster_name}-node-group-{letter}"),
      properties([
        ("cluster_name", cluster.attr_string("name").into()),
        (
          "node_group_name",
          format!("{cluster_name}-spot-node-group-{letter}").into(),
        ),
        ("node_role_arn", identity.node_role_arn.clone().into()),
        ("subnet_ids", subnet_ids.into()),
        ("capacity_type", "SPOT".into()),
        ("disk_size", 20i64.into()),
        ("force_update_version", false.into()),
        ("ami_type", "AL2_x86_64".into()),
        ("instance_types", json!(["t3.micro"]).into()),
        (
          "scaling_config",
          json!({ "desired_size": 2, "max_size": 3, "min_size": 1 }).into(),
        ),
        ("launch_template", launch_template_ref.clone().into()),
        ("tags", json!({ "Name": format!("{cluster_name}-eksCluster-worker") }).into()),
      ]),
      ResourceOptions::protected()
        .parent(cluster.resource_id())
        .ignore_fields(["tags", "scaling_config"]),
    )?;
  }

  Ok(ClusterStack {
    name: cluster.attr_string("name"),
    endpoint: cluster.attr_string("endpoint"),
    certificate_authority: cluster.attr_string("certificate_authority"),
  })
}
