//! Identity stack: the cluster and node-group IAM roles with their managed
//! policy attachments.

use serde_json::{json, Value};

use groundwork_graph::{properties, GraphError, ResourceHandle, ResourceOptions, Run};
use groundwork_output::Output;

use crate::config::DeploymentConfig;

const CLUSTER_POLICIES: [&str; 2] = [
  "arn:aws:iam::aws:policy/AmazonEKSServicePolicy",
  "arn:aws:iam::aws:policy/AmazonEKSClusterPolicy",
];

const NODE_GROUP_POLICIES: [&str; 3] = [
  "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy",
  "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy",
  "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly",
];

/// The control plane assumes the cluster role; worker nodes assume the
/// node-group role.
pub struct IdentityStack {
  pub cluster_role_arn: Output<String>,
  pub node_role_arn: Output<String>,
}

pub fn deploy(run: &mut Run, config: &DeploymentConfig) -> Result<IdentityStack, GraphError> {
  let env = &config.env;
  let cluster = &config.cluster_name;

  let cluster_role = run.declare(
    "aws:iam:Role",
    format!("{cluster}-eks-iam-assumeRole-{env}"),
    properties([(
      "assume_role_policy",
      assume_role_document("2008-10-17", "eks.amazonaws.com").into(),
    )]),
    ResourceOptions::protected(),
  )?;
  attach_policies(
    run,
    &cluster_role,
    &CLUSTER_POLICIES,
    format!("{cluster}-eks-rpa-{env}"),
  )?;

  let node_role = run.declare(
    "aws:iam:Role",
    format!("{cluster}-nodegroup-iam-role-{env}"),
    properties([(
      "assume_role_policy",
      assume_role_document("2012-10-17", "ec2.amazonaws.com").into(),
    )]),
    ResourceOptions::protected(),
  )?;
  attach_policies(
    run,
    &node_role,
    &NODE_GROUP_POLICIES,
    format!("{cluster}-node-gpa-{env}"),
  )?;

  Ok(IdentityStack {
    cluster_role_arn: cluster_role.attr_string("arn"),
    node_role_arn: node_role.attr_string("arn"),
  })
}

fn attach_policies(
  run: &mut Run,
  role: &ResourceHandle,
  policy_arns: &[&str],
  name_prefix: String,
) -> Result<(), GraphError> {
  for (index, policy_arn) in policy_arns.iter().enumerate() {
    run.declare(
      "aws:iam:RolePolicyAttachment",
      format!("{name_prefix}-{index}"),
      properties([
        ("role", role.attr_string("name").into()),
        ("policy_arn", (*policy_arn).into()),
      ]),
      ResourceOptions::protected().parent(role.resource_id()),
    )?;
  }
  Ok(())
}

fn assume_role_document(version: &str, service: &str) -> Value {
  json!({
    "Version": version,
    "Statement": [{
      "Sid": "",
      "Effect": "Allow",
      "Principal": { "Service": service },
      "Action": "sts:AssumeRole",
    }],
  })
}
