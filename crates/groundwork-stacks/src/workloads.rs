//! Workloads stack: the kubeconfig artifact, the `infra` namespace, and the
//! ingress controller chart installed through it.

use minijinja::render;
use serde_json::{json, Value};

use groundwork_graph::{properties, GraphError, ResourceOptions, Run};
use groundwork_output::Output;

use crate::cluster::ClusterStack;

/// Kubeconfig with an exec-based authenticator, per the EKS user guide: the
/// token helper receives the cluster name as its argument.
const KUBECONFIG_TEMPLATE: &str = r#"{
  "apiVersion": "v1",
  "kind": "Config",
  "clusters": [{
    "cluster": {
      "server": "{{ server }}",
      "certificate-authority-data": "{{ certificate_authority }}"
    },
    "name": "kubernetes"
  }],
  "contexts": [{
    "context": { "cluster": "kubernetes", "user": "aws" },
    "name": "aws"
  }],
  "current-context": "aws",
  "users": [{
    "name": "aws",
    "user": {
      "exec": {
        "apiVersion": "client.authentication.k8s.io/v1alpha1",
        "command": "aws-iam-authenticator",
        "args": ["token", "-i", "{{ cluster_name }}"]
      }
    }
  }]
}"#;

pub struct WorkloadsStack {
  pub kubeconfig: Output<String>,
}

pub fn deploy(run: &mut Run, cluster: &ClusterStack) -> Result<WorkloadsStack, GraphError> {
  // All three fields must resolve before the document can exist, which is
  // exactly the ordering the chart below inherits by consuming it.
  let kubeconfig = cluster
    .endpoint
    .zip(&cluster.certificate_authority)
    .zip(&cluster.name)
    .map(|((server, certificate_authority), cluster_name)| {
      render!(
        KUBECONFIG_TEMPLATE,
        server => server,
        certificate_authority => certificate_authority,
        cluster_name => cluster_name
      )
    });
  run.export("kubeconfig", kubeconfig.map(Value::String));

  let namespace = run.declare(
    "kubernetes:core/v1:Namespace",
    "infra",
    properties([
      ("metadata", json!({ "name": "infra" }).into()),
      ("kubeconfig", kubeconfig.clone().into()),
    ]),
    ResourceOptions::new(),
  )?;

  run.declare(
    "kubernetes:helm.sh/v3:Chart",
    "traefik",
    properties([
      ("chart", "nginx-ingress".into()),
      ("version", "9.13.0".into()),
      ("repo", "https://charts.helm.sh/stable".into()),
      ("namespace", "infra".into()),
      ("kubeconfig", kubeconfig.clone().into()),
      ("values", chart_values().into()),
    ]),
    ResourceOptions::new().depends_on(namespace.resource_id()),
  )?;

  Ok(WorkloadsStack { kubeconfig })
}

fn chart_values() -> Value {
  json!({
    "providers": {
      "kubernetesIngress": { "publishedService": { "enabled": true } },
    },
    "ports": {
      "web": { "redirectTo": "websecure" },
    },
    "logs": {
      "general": { "level": "ERROR", "format": "json" },
      "access": {
        "enabled": true,
        "format": "json",
        "fields": {
          "headers": {
            "defaultmode": "keep",
            "names": { "Authorization": "redact" },
          },
        },
      },
    },
    "resources": {
      "limits": { "cpu": "1000m", "memory": "1.25G" },
      "requests": { "cpu": "1000m", "memory": "1.25G" },
    },
    "additionalArguments": [
      "--api.dashboard",
      "--metrics.datadog.address=datadog-statsd:8125",
      "--entryPoints.web.forwardedHeaders.trustedIPs=10.9.0.0/16,10.10.0.0/16",
      "--entryPoints.web.proxyProtocol.trustedIPs=10.9.0.0/16,10.10.0.0/16",
      "--entryPoints.websecure.forwardedHeaders.trustedIPs=10.9.0.0/16,10.10.0.0/16",
      "--entryPoints.websecure.proxyProtocol.trustedIPs=10.9.0.0/16,10.10.0.0/16",
    ],
    "globalArguments": [],
    "service": {
      "loadBalancerSourceRanges": ["10.10.0.0/16"],
      "annotations": {
        "service.beta.kubernetes.io/aws-load-balancer-backend-protocol": "http",
        "service.beta.kubernetes.io/aws-load-balancer-ssl-ports": "websecure",
        "service.beta.kubernetes.io/aws-load-balancer-connection-idle-timeout": "30",
        "service.beta.kubernetes.io/aws-load-balancer-type": "nlb",
      },
    },
    "podDisruptionBudget": { "enabled": true, "minAvailable": 3 },
    "deployment": { "replicas": 3 },
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kubeconfig_renders_all_three_fields() {
    let rendered = render!(
      KUBECONFIG_TEMPLATE,
      server => "https://example.eks.local",
      certificate_authority => "Q0FEQVRB",
      cluster_name => "megocluster"
    );
    let parsed: Value = serde_json::from_str(&rendered).expect("kubeconfig must be valid JSON");
    assert_eq!(
      parsed["clusters"][0]["cluster"]["server"],
      "https://example.eks.local",
    );
    assert_eq!(
      parsed["clusters"][0]["cluster"]["certificate-authority-data"],
      "Q0FEQVRB",
    );
    assert_eq!(
      parsed["users"][0]["user"]["exec"]["args"],
      json!(["token", "-i", "megocluster"]),
    );
  }
}
