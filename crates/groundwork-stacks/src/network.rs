//! Network stack: VPC, per-zone public/private subnets with NAT egress, and
//! the cluster-facing security group.

use serde_json::{json, Value};

use groundwork_graph::{properties, GraphError, ResourceOptions, Run};
use groundwork_output::Output;

use crate::config::DeploymentConfig;

/// Outputs the later stacks consume. Subnet id lists are ordered by zone.
pub struct NetworkStack {
  pub vpc_id: Output<String>,
  pub public_subnet_ids: Output<Vec<String>>,
  pub private_subnet_ids: Output<Vec<String>>,
  pub cluster_security_group_id: Output<String>,
}

pub fn deploy(run: &mut Run, config: &DeploymentConfig) -> Result<NetworkStack, GraphError> {
  let env = &config.env;
  let cluster = &config.cluster_name;

  let vpc = run.declare(
    "aws:ec2:Vpc",
    format!("{cluster}-vpc-{env}"),
    properties([
      ("cidr_block", "10.0.0.0/16".into()),
      ("tags", json!({ "Name": cluster }).into()),
    ]),
    ResourceOptions::protected(),
  )?;

  let public_route_table = run.declare(
    "aws:ec2:RouteTable",
    format!("{cluster}-public-rt-{env}"),
    properties([
      ("vpc_id", vpc.id().into()),
      ("tags", json!({ "Name": format!("{cluster}-public") }).into()),
    ]),
    ResourceOptions::protected().parent(vpc.resource_id()),
  )?;

  let igw = run.declare(
    "aws:ec2:InternetGateway",
    format!("{cluster}-igw-{env}"),
    properties([
      ("vpc_id", vpc.id().into()),
      ("tags", json!({ "Name": format!("{cluster}-primary") }).into()),
    ]),
    ResourceOptions::protected().parent(public_route_table.resource_id()),
  )?;

  run.declare(
    "aws:ec2:Route",
    format!("{cluster}-route-public-{env}"),
    properties([
      ("route_table_id", public_route_table.id().into()),
      ("destination_cidr_block", "0.0.0.0/0".into()),
      ("gateway_id", igw.id().into()),
    ]),
    ResourceOptions::protected().parent(public_route_table.resource_id()),
  )?;

  let mut public_subnet_ids = Vec::new();
  let mut private_subnet_ids = Vec::new();

  for zone in &config.zones {
    let suffix = zone.suffix();
    let public_name = format!("{cluster}-{env}-public-{suffix}");
    let private_name = format!("{cluster}-{env}-private-{suffix}");

    let public_subnet = run.declare(
      "aws:ec2:Subnet",
      &public_name,
      properties([
        ("vpc_id", vpc.id().into()),
        ("availability_zone", zone.zone.as_str().into()),
        ("cidr_block", zone.public_cidr.as_str().into()),
        (
          "tags",
          subnet_tags(cluster, "kubernetes.io/role/elb", format!("primary-public-{suffix}")).into(),
        ),
      ]),
      ResourceOptions::protected()
        .parent(igw.resource_id())
        .ignore_fields(["tags"]),
    )?;

    run.declare(
      "aws:ec2:RouteTableAssociation",
      &public_name,
      properties([
        ("subnet_id", public_subnet.id().into()),
        ("route_table_id", public_route_table.id().into()),
      ]),
      ResourceOptions::protected().parent(public_subnet.resource_id()),
    )?;

    let private_route_table = run.declare(
      "aws:ec2:RouteTable",
      &private_name,
      properties([
        ("vpc_id", vpc.id().into()),
        ("tags", json!({ "Name": "primary-private" }).into()),
      ]),
      ResourceOptions::protected().parent(vpc.resource_id()),
    )?;

    let private_subnet = run.declare(
      "aws:ec2:Subnet",
      &private_name,
      properties([
        ("vpc_id", vpc.id().into()),
        ("availability_zone", zone.zone.as_str().into()),
        ("cidr_block", zone.private_cidr.as_str().into()),
        (
          "tags",
          subnet_tags(
            cluster,
            "kubernetes.io/role/internal-elb",
            format!("primary-private-{suffix}"),
          )
          .into(),
        ),
      ]),
      ResourceOptions::protected().parent(private_route_table.resource_id()),
    )?;

    let eip = run.declare(
      "aws:ec2:Eip",
      &private_name,
      properties([("public_ipv4_pool", "amazon".into())]),
      ResourceOptions::protected().parent(private_subnet.resource_id()),
    )?;

    // NAT needs the internet gateway up even though no property references it.
    let nat = run.declare(
      "aws:ec2:NatGateway",
      &private_name,
      properties([
        ("allocation_id", eip.attr_string("allocation_id").into()),
        ("subnet_id", private_subnet.id().into()),
        ("tags", json!({ "Name": "primary-private" }).into()),
      ]),
      ResourceOptions::protected()
        .parent(private_subnet.resource_id())
        .depends_on(igw.resource_id()),
    )?;

    run.declare(
      "aws:ec2:Route",
      &private_name,
      properties([
        ("route_table_id", private_route_table.id().into()),
        ("destination_cidr_block", "0.0.0.0/0".into()),
        ("nat_gateway_id", nat.id().into()),
      ]),
      ResourceOptions::protected().parent(private_route_table.resource_id()),
    )?;

    public_subnet_ids.push(public_subnet.id());
    private_subnet_ids.push(private_subnet.id());
  }

  let security_group = run.declare(
    "aws:ec2:SecurityGroup",
    format!("{cluster}-{env}-sg"),
    properties([
      ("vpc_id", vpc.id().into()),
      (
        "egress",
        json!([{
          "protocol": "-1",
          "from_port": 0,
          "to_port": 0,
          "cidr_blocks": ["0.0.0.0/0"],
        }])
        .into(),
      ),
      (
        "ingress",
        json!([{
          "protocol": "tcp",
          "from_port": 80,
          "to_port": 80,
          "cidr_blocks": ["0.0.0.0/0"],
        }])
        .into(),
      ),
    ]),
    ResourceOptions::protected().parent(vpc.resource_id()),
  )?;

  Ok(NetworkStack {
    vpc_id: vpc.id(),
    public_subnet_ids: Output::join(public_subnet_ids),
    private_subnet_ids: Output::join(private_subnet_ids),
    cluster_security_group_id: security_group.id(),
  })
}

fn subnet_tags(cluster: &str, role_tag: &str, name: String) -> Value {
  let mut tags = serde_json::Map::new();
  tags.insert("Name".to_string(), Value::String(name));
  tags.insert(role_tag.to_string(), Value::String("1".to_string()));
  tags.insert(
    format!("kubernetes.io/cluster/{cluster}"),
    Value::String("shared".to_string()),
  );
  Value::Object(tags)
}
