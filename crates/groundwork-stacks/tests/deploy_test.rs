//! End-to-end tests: assemble the full topology and reconcile it against the
//! simulated provider.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use groundwork_engine::{ApplyEngine, ApplyRecord, DestroyRecord, EngineOptions, RunState};
use groundwork_graph::Run;
use groundwork_provider::{MemoryProvider, ProviderCall};
use groundwork_stacks::{deploy, simulate, DeploymentConfig};

const ENV: &str = "staging";
const CLUSTER: &str = "megocluster";

/// 26 network nodes, 7 identity nodes, 5 cluster nodes, 2 workload nodes.
const NODE_COUNT: usize = 40;

fn assemble() -> Run {
  let config = DeploymentConfig::new(ENV, CLUSTER);
  let mut run = Run::new(ENV);
  deploy(&mut run, &config).expect("topology must assemble");
  run
}

fn position(calls: &[ProviderCall], kind: &str, name: &str) -> usize {
  calls
    .iter()
    .position(|call| call.kind() == kind && call.name() == name)
    .unwrap_or_else(|| panic!("no call recorded for {kind}/{name}"))
}

#[tokio::test]
async fn full_deployment_resolves_every_node() {
  let provider = Arc::new(simulate::provider());
  let engine = ApplyEngine::new(provider.clone(), EngineOptions::default());

  let report = engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("apply must run");

  assert!(report.is_success());
  assert_eq!(report.records.len(), NODE_COUNT);
  assert_eq!(report.summary().created, NODE_COUNT);

  let calls = provider.calls();
  assert_eq!(calls.len(), NODE_COUNT);

  // Network ordering: VPC first, gateway before every NAT.
  let vpc = position(&calls, "aws:ec2:Vpc", "megocluster-vpc-staging");
  let igw = position(&calls, "aws:ec2:InternetGateway", "megocluster-igw-staging");
  assert!(vpc < igw);
  for suffix in ["1a", "1b", "1c"] {
    let nat = position(
      &calls,
      "aws:ec2:NatGateway",
      &format!("megocluster-staging-private-{suffix}"),
    );
    assert!(igw < nat);
  }

  // Cross-stack ordering: roles and subnets before the control plane, the
  // control plane before its node groups and the workloads.
  let cluster_role = position(
    &calls,
    "aws:iam:Role",
    "megocluster-eks-iam-assumeRole-staging",
  );
  let cluster = position(&calls, "aws:eks:Cluster", "megocluster");
  assert!(cluster_role < cluster);
  for letter in ["a", "b", "c"] {
    let node_group = position(
      &calls,
      "aws:eks:NodeGroup",
      &format!("megocluster-node-group-{letter}"),
    );
    assert!(cluster < node_group);
  }
  let namespace = position(&calls, "kubernetes:core/v1:Namespace", "infra");
  let chart = position(&calls, "kubernetes:helm.sh/v3:Chart", "traefik");
  assert!(cluster < namespace);
  assert!(namespace < chart);
}

#[tokio::test]
async fn control_plane_sees_all_subnets_and_the_security_group() {
  let provider = Arc::new(simulate::provider());
  let engine = ApplyEngine::new(provider.clone(), EngineOptions::default());
  engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("apply must run");

  let cluster = provider.record("aws:eks:Cluster", "megocluster").unwrap();
  let vpc_config = &cluster.attrs["vpc_config"];

  let subnet_ids = vpc_config["subnet_ids"].as_array().unwrap();
  assert_eq!(subnet_ids.len(), 6);
  for scope in ["private", "public"] {
    for suffix in ["1a", "1b", "1c"] {
      let subnet = provider
        .record(
          "aws:ec2:Subnet",
          &format!("megocluster-staging-{scope}-{suffix}"),
        )
        .unwrap();
      assert!(subnet_ids.contains(&Value::String(subnet.id)));
    }
  }

  let security_group = provider
    .record("aws:ec2:SecurityGroup", "megocluster-staging-sg")
    .unwrap();
  assert_eq!(
    vpc_config["security_group_ids"],
    Value::from(vec![security_group.id]),
  );
}

#[tokio::test]
async fn node_groups_pin_their_zone_private_subnet() {
  let provider = Arc::new(simulate::provider());
  let engine = ApplyEngine::new(provider.clone(), EngineOptions::default());
  engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("apply must run");

  for (letter, suffix) in [("a", "1a"), ("b", "1b"), ("c", "1c")] {
    let node_group = provider
      .record("aws:eks:NodeGroup", &format!("megocluster-node-group-{letter}"))
      .unwrap();
    let subnet = provider
      .record(
        "aws:ec2:Subnet",
        &format!("megocluster-staging-private-{suffix}"),
      )
      .unwrap();
    assert_eq!(node_group.attrs["subnet_ids"], Value::from(vec![subnet.id]));
    assert_eq!(node_group.attrs["capacity_type"], "SPOT");
  }
}

#[tokio::test]
async fn kubeconfig_export_is_assembled_from_cluster_outputs() {
  let provider = Arc::new(simulate::provider());
  let engine = ApplyEngine::new(provider.clone(), EngineOptions::default());
  let report = engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("apply must run");

  let kubeconfig = report.exports["kubeconfig"].as_str().unwrap();
  let parsed: Value = serde_json::from_str(kubeconfig).expect("kubeconfig must be valid JSON");
  assert_eq!(
    parsed["clusters"][0]["cluster"]["server"],
    "https://megocluster.eks.eu-central-1.example.com",
  );
  assert!(
    parsed["clusters"][0]["cluster"]["certificate-authority-data"]
      .as_str()
      .unwrap()
      .starts_with("LS0t"),
  );
  assert_eq!(
    parsed["users"][0]["user"]["exec"]["args"][2],
    "megocluster",
  );

  // The chart that consumes the kubeconfig saw the same document.
  let chart = provider
    .record("kubernetes:helm.sh/v3:Chart", "traefik")
    .unwrap();
  assert_eq!(chart.attrs["kubeconfig"].as_str().unwrap(), kubeconfig);
}

#[tokio::test]
async fn redeploy_with_unchanged_topology_is_a_no_op() {
  let provider = Arc::new(simulate::provider());
  let engine = ApplyEngine::new(provider.clone(), EngineOptions::default());

  let first = engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("first apply must run");
  assert_eq!(provider.calls().len(), NODE_COUNT);

  let second = engine
    .apply(assemble(), first.state.clone(), CancellationToken::new())
    .await
    .expect("second apply must run");

  assert!(second.is_success());
  assert_eq!(second.summary().unchanged, NODE_COUNT);
  assert_eq!(provider.calls().len(), NODE_COUNT);
}

#[tokio::test]
async fn teardown_fails_closed_on_protected_infrastructure() {
  let provider = Arc::new(simulate::provider());
  let engine = ApplyEngine::new(provider.clone(), EngineOptions::default());
  let report = engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("apply must run");

  let teardown = assemble();
  let destroy = engine
    .destroy(&teardown, &report.state, CancellationToken::new())
    .await
    .expect("destroy must run");

  assert!(!destroy.is_success());

  // Only the unprotected workload resources are deleted, chart before the
  // namespace it lives in.
  let deletes: Vec<ProviderCall> = provider
    .calls()
    .into_iter()
    .filter(|call| matches!(call, ProviderCall::Delete { .. }))
    .collect();
  assert_eq!(deletes.len(), 2);
  assert_eq!(deletes[0].kind(), "kubernetes:helm.sh/v3:Chart");
  assert_eq!(deletes[1].kind(), "kubernetes:core/v1:Namespace");

  let protected = destroy
    .records
    .values()
    .filter(|record| matches!(record, DestroyRecord::Protected))
    .count();
  assert_eq!(protected, NODE_COUNT - 2);

  // The protected topology is still recorded remotely.
  assert!(provider.record("aws:ec2:Vpc", "megocluster-vpc-staging").is_some());
  assert!(provider.record("kubernetes:core/v1:Namespace", "infra").is_none());
}

#[tokio::test]
async fn control_plane_failure_spares_the_network_but_stops_workloads() {
  let provider = Arc::new(simulate::provider());
  provider.fail_on("aws:eks:Cluster", "megocluster", "insufficient capacity");
  let engine = ApplyEngine::new(provider.clone(), EngineOptions::default());

  let report = engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("apply must run");

  assert!(!report.is_success());
  let summary = report.summary();
  // Cluster, launch template, three node groups, namespace, and chart fail;
  // the 33 network and identity nodes still resolve.
  assert_eq!(summary.failed, 7);
  assert_eq!(summary.created, NODE_COUNT - 7);
  assert!(provider.calls_for("aws:eks:NodeGroup").is_empty());
  assert!(provider.calls_for("kubernetes:helm.sh/v3:Chart").is_empty());

  let failures: Vec<_> = report.failures().collect();
  assert!(
    failures
      .iter()
      .all(|(_, root, _)| root.to_string() == "aws:eks:Cluster/megocluster"),
  );
}

#[tokio::test]
async fn memory_provider_without_hooks_still_converges() {
  // A bare provider (no computed attributes) leaves endpoint and ARN-ish
  // attributes empty, but the graph itself must still apply cleanly.
  let provider = Arc::new(MemoryProvider::new());
  let engine = ApplyEngine::new(provider.clone(), EngineOptions { concurrency: 2, fail_fast: false });

  let report = engine
    .apply(assemble(), RunState::new(), CancellationToken::new())
    .await
    .expect("apply must run");
  assert!(report.is_success());
  assert!(matches!(
    report.records.values().next().unwrap(),
    ApplyRecord::Created { .. },
  ));
}
