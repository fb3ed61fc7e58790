use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::node::{PropertyValue, ResourceId};
use crate::run::Run;

/// The validated dependency graph of a run: every edge a node's property
/// outputs, parent link, and ordering hints imply, plus a topological apply
/// order.
///
/// Edges point from a dependency to its dependents, so `downstream` of a node
/// is everything that consumes it and `upstream` is everything it consumes.
#[derive(Debug, Clone)]
pub struct Graph {
  order: Vec<ResourceId>,
  adjacency: HashMap<ResourceId, Vec<ResourceId>>,
  reverse: HashMap<ResourceId, Vec<ResourceId>>,
}

impl Graph {
  /// Derive and validate the graph from a run's declarations.
  ///
  /// Fails with [`GraphError::UnresolvedReference`] if any consumed output,
  /// parent, or `depends_on` names a node never declared, and with
  /// [`GraphError::CycleDetected`] (naming the full cycle path) if the edges
  /// do not form a DAG. Nothing is applied until this pass succeeds.
  pub fn build(run: &Run) -> Result<Self, GraphError> {
    let mut by_label: HashMap<String, ResourceId> = HashMap::new();
    for node in run.nodes() {
      by_label.insert(node.id.to_string(), node.id.clone());
    }

    // Collect upstream edges per node, deduplicated: a parent that also
    // produces a consumed output is still one edge.
    let mut upstream: HashMap<ResourceId, BTreeSet<ResourceId>> = HashMap::new();
    for node in run.nodes() {
      let mut dependencies = BTreeSet::new();

      for value in node.properties.values() {
        if let PropertyValue::Dynamic(output) = value {
          for producer in output.dependencies() {
            let producer =
              by_label
                .get(producer)
                .cloned()
                .ok_or_else(|| GraphError::UnresolvedReference {
                  consumer: node.id.clone(),
                  missing: producer.clone(),
                })?;
            if producer != node.id {
              dependencies.insert(producer);
            }
          }
        }
      }

      for explicit in node.parent.iter().chain(node.depends_on.iter()) {
        if !run.contains(explicit) {
          return Err(GraphError::UnresolvedReference {
            consumer: node.id.clone(),
            missing: explicit.to_string(),
          });
        }
        if *explicit != node.id {
          dependencies.insert(explicit.clone());
        }
      }

      upstream.insert(node.id.clone(), dependencies);
    }

    let mut adjacency: HashMap<ResourceId, Vec<ResourceId>> = HashMap::new();
    let mut reverse: HashMap<ResourceId, Vec<ResourceId>> = HashMap::new();
    for node in run.nodes() {
      adjacency.entry(node.id.clone()).or_default();
      reverse.entry(node.id.clone()).or_default();
    }
    for node in run.nodes() {
      for dependency in &upstream[&node.id] {
        adjacency
          .get_mut(dependency)
          .expect("dependency validated above")
          .push(node.id.clone());
        reverse
          .get_mut(&node.id)
          .expect("node initialized above")
          .push(dependency.clone());
      }
    }

    let order = topological_order(run, &adjacency, &reverse)?;

    Ok(Self {
      order,
      adjacency,
      reverse,
    })
  }

  /// Apply order: every node appears after all of its dependencies.
  pub fn order(&self) -> &[ResourceId] {
    &self.order
  }

  /// Direct dependencies of a node.
  pub fn upstream(&self, id: &ResourceId) -> &[ResourceId] {
    self.reverse.get(id).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Direct dependents of a node.
  pub fn downstream(&self, id: &ResourceId) -> &[ResourceId] {
    self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Every node reachable downstream of `id`, i.e. everything that must not
  /// be applied once `id` has failed.
  pub fn transitive_dependents(&self, id: &ResourceId) -> Vec<ResourceId> {
    let mut seen: HashSet<&ResourceId> = HashSet::new();
    let mut queue: VecDeque<&ResourceId> = self.downstream(id).iter().collect();
    let mut dependents = Vec::new();
    while let Some(next) = queue.pop_front() {
      if seen.insert(next) {
        dependents.push(next.clone());
        queue.extend(self.downstream(next).iter());
      }
    }
    dependents
  }
}

/// Kahn's algorithm, seeded in declaration order so unrelated nodes keep a
/// stable relative order.
fn topological_order(
  run: &Run,
  adjacency: &HashMap<ResourceId, Vec<ResourceId>>,
  reverse: &HashMap<ResourceId, Vec<ResourceId>>,
) -> Result<Vec<ResourceId>, GraphError> {
  let mut in_degree: HashMap<&ResourceId, usize> = run
    .nodes()
    .iter()
    .map(|node| (&node.id, reverse[&node.id].len()))
    .collect();

  let mut ready: VecDeque<&ResourceId> = run
    .nodes()
    .iter()
    .map(|node| &node.id)
    .filter(|id| in_degree[*id] == 0)
    .collect();

  let mut order = Vec::with_capacity(run.nodes().len());
  while let Some(id) = ready.pop_front() {
    order.push(id.clone());
    for dependent in &adjacency[id] {
      let degree = in_degree
        .get_mut(dependent)
        .expect("all edges point at declared nodes");
      *degree -= 1;
      if *degree == 0 {
        ready.push_back(dependent);
      }
    }
  }

  if order.len() < run.nodes().len() {
    return Err(GraphError::CycleDetected {
      path: find_cycle(run, adjacency),
    });
  }
  Ok(order)
}

/// Walk the graph depth-first until a back edge closes a cycle, and return
/// that cycle's path with the entry node repeated at the end.
fn find_cycle(run: &Run, adjacency: &HashMap<ResourceId, Vec<ResourceId>>) -> Vec<String> {
  let mut visited: HashSet<&ResourceId> = HashSet::new();

  for node in run.nodes() {
    if visited.contains(&node.id) {
      continue;
    }
    let mut stack: Vec<(&ResourceId, usize)> = vec![(&node.id, 0)];
    let mut on_path: Vec<&ResourceId> = vec![&node.id];
    visited.insert(&node.id);

    while !stack.is_empty() {
      let (current, child_index) = {
        let frame = stack.last_mut().expect("stack checked non-empty");
        let advanced = (frame.0, frame.1);
        frame.1 += 1;
        advanced
      };
      match adjacency[current].get(child_index) {
        Some(child) => {
          if let Some(entry) = on_path.iter().position(|id| *id == child) {
            let mut path: Vec<String> = on_path[entry..].iter().map(|id| id.to_string()).collect();
            path.push(child.to_string());
            return path;
          }
          if visited.insert(child) {
            stack.push((child, 0));
            on_path.push(child);
          }
        }
        None => {
          stack.pop();
          on_path.pop();
        }
      }
    }
  }

  // Kahn said there is a cycle; the DFS above must find one.
  Vec::new()
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::node::{properties, ResourceOptions};

  fn declare(run: &mut Run, kind: &str, name: &str, options: ResourceOptions) -> crate::run::ResourceHandle {
    run.declare(kind, name, BTreeMap::new(), options).unwrap()
  }

  #[test]
  fn output_consumption_becomes_an_edge() {
    let mut run = Run::new("test");
    let vpc = declare(&mut run, "aws:ec2:Vpc", "primary", ResourceOptions::new());
    let subnet = run
      .declare(
        "aws:ec2:Subnet",
        "primary-1a",
        properties([("vpc_id", vpc.id().into())]),
        ResourceOptions::new(),
      )
      .unwrap();

    let graph = Graph::build(&run).unwrap();
    assert_eq!(graph.upstream(subnet.resource_id()), [vpc.resource_id().clone()]);
    assert_eq!(graph.downstream(vpc.resource_id()), [subnet.resource_id().clone()]);
  }

  #[test]
  fn order_respects_dependencies() {
    let mut run = Run::new("test");
    let vpc = declare(&mut run, "aws:ec2:Vpc", "primary", ResourceOptions::new());
    let subnet = run
      .declare(
        "aws:ec2:Subnet",
        "primary-1a",
        properties([("vpc_id", vpc.id().into())]),
        ResourceOptions::new(),
      )
      .unwrap();
    let route = run
      .declare(
        "aws:ec2:Route",
        "private-1a",
        properties([("subnet_id", subnet.id().into())]),
        ResourceOptions::new(),
      )
      .unwrap();

    let graph = Graph::build(&run).unwrap();
    let position = |id: &ResourceId| {
      graph
        .order()
        .iter()
        .position(|other| other == id)
        .unwrap()
    };
    assert!(position(vpc.resource_id()) < position(subnet.resource_id()));
    assert!(position(subnet.resource_id()) < position(route.resource_id()));
  }

  #[test]
  fn parent_and_depends_on_are_edges() {
    let mut run = Run::new("test");
    let vpc = declare(&mut run, "aws:ec2:Vpc", "primary", ResourceOptions::new());
    let igw = declare(
      &mut run,
      "aws:ec2:InternetGateway",
      "primary",
      ResourceOptions::new().parent(vpc.resource_id()),
    );
    let nat = declare(
      &mut run,
      "aws:ec2:NatGateway",
      "primary-1a",
      ResourceOptions::new().depends_on(igw.resource_id()),
    );

    let graph = Graph::build(&run).unwrap();
    assert_eq!(graph.upstream(igw.resource_id()), [vpc.resource_id().clone()]);
    assert_eq!(graph.upstream(nat.resource_id()), [igw.resource_id().clone()]);
  }

  #[test]
  fn cycle_is_reported_with_full_path() {
    let mut run = Run::new("test");
    let a = ResourceId::new("test:Node", "a");
    let b = ResourceId::new("test:Node", "b");
    let c = ResourceId::new("test:Node", "c");
    run
      .declare("test:Node", "a", BTreeMap::new(), ResourceOptions::new().depends_on(&c))
      .unwrap();
    run
      .declare("test:Node", "b", BTreeMap::new(), ResourceOptions::new().depends_on(&a))
      .unwrap();
    run
      .declare("test:Node", "c", BTreeMap::new(), ResourceOptions::new().depends_on(&b))
      .unwrap();

    let err = Graph::build(&run).unwrap_err();
    match err {
      GraphError::CycleDetected { path } => {
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), path.last());
        assert!(path.contains(&a.to_string()));
        assert!(path.contains(&b.to_string()));
        assert!(path.contains(&c.to_string()));
      }
      other => panic!("expected cycle, got {other:?}"),
    }
  }

  #[test]
  fn unresolved_reference_is_rejected() {
    let mut run = Run::new("test");
    let ghost = ResourceId::new("aws:ec2:Vpc", "ghost");
    run
      .declare(
        "aws:ec2:Subnet",
        "primary-1a",
        BTreeMap::new(),
        ResourceOptions::new().depends_on(&ghost),
      )
      .unwrap();

    let err = Graph::build(&run).unwrap_err();
    assert!(matches!(err, GraphError::UnresolvedReference { .. }));
  }

  #[test]
  fn unresolved_output_reference_is_rejected() {
    let mut other = Run::new("other");
    let foreign = other
      .declare("aws:ec2:Vpc", "foreign", BTreeMap::new(), ResourceOptions::new())
      .unwrap();

    let mut run = Run::new("test");
    run
      .declare(
        "aws:ec2:Subnet",
        "primary-1a",
        properties([("vpc_id", foreign.id().into())]),
        ResourceOptions::new(),
      )
      .unwrap();

    let err = Graph::build(&run).unwrap_err();
    assert!(matches!(err, GraphError::UnresolvedReference { .. }));
  }

  #[test]
  fn transitive_dependents_cover_the_whole_subtree() {
    let mut run = Run::new("test");
    let vpc = declare(&mut run, "aws:ec2:Vpc", "primary", ResourceOptions::new());
    let subnet = run
      .declare(
        "aws:ec2:Subnet",
        "primary-1a",
        properties([("vpc_id", vpc.id().into())]),
        ResourceOptions::new(),
      )
      .unwrap();
    let route = run
      .declare(
        "aws:ec2:Route",
        "private-1a",
        properties([("subnet_id", subnet.id().into())]),
        ResourceOptions::new(),
      )
      .unwrap();
    let unrelated = declare(&mut run, "aws:iam:Role", "node", ResourceOptions::new());

    let graph = Graph::build(&run).unwrap();
    let dependents = graph.transitive_dependents(vpc.resource_id());
    assert!(dependents.contains(subnet.resource_id()));
    assert!(dependents.contains(route.resource_id()));
    assert!(!dependents.contains(unrelated.resource_id()));
  }
}
