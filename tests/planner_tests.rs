//! End-to-end planning tests.
//!
//! These drive the planner from YAML configurations and check the resulting
//! resource graph, outputs and acceptance behaviour.

use std::collections::HashSet;
use std::time::Duration;

use tempfile::TempDir;
use transitmesh::config_loader::parse_config;
use transitmesh::graph::{Resource, ResourceGraph, ResourceId, ResourceKind, RouteTarget};
use transitmesh::manifest::{AcceptanceSummary, Manifest, PlanOutputs};
use transitmesh::orchestrator::{
    generate_plan_manifest, plan_topology, write_acceptance_report, ACCEPTANCE_FILE, MANIFEST_FILE, OUTPUTS_FILE,
};
use transitmesh::peering::{AcceptancePolicy, AcceptanceTask, ApprovalError, LinkState};
use transitmesh::remote_access::RemoteAccessState;
use transitmesh::PlanError;

const THREE_REGIONS: &str = r#"
general:
  name: capstone
regions:
  - name: us-east-1
    address_block: 172.16.0.0/16
    primary: true
    availability_zones: 1
  - name: eu-west-1
    address_block: 172.17.0.0/16
    availability_zones: 1
  - name: ap-southeast-1
    address_block: 172.18.0.0/16
    availability_zones: 1
acceptance:
  backoff: 0s
"#;

fn never_failing(_: &ResourceId, _: &str) -> Result<(), ApprovalError> {
    Ok(())
}

/// Subnet routes toward another network's block through a hub
fn cross_network_routes(graph: &ResourceGraph) -> Vec<(ResourceId, String)> {
    graph
        .of_kind(ResourceKind::Route)
        .filter_map(|node| match &node.resource {
            Resource::Route {
                route_table,
                destination,
                target: RouteTarget::Hub(_),
            } => Some((route_table.clone(), destination.to_string())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_three_region_full_mesh() {
    let config = parse_config(THREE_REGIONS).unwrap();
    let mut plan = plan_topology(&config).unwrap();
    let graph = plan.graph();

    assert_eq!(graph.count(ResourceKind::Network), 3);
    assert_eq!(graph.count(ResourceKind::Hub), 3);
    assert_eq!(graph.count(ResourceKind::PeeringAttachment), 3);
    assert_eq!(graph.count(ResourceKind::CustomerGateway), 0);
    assert_eq!(cross_network_routes(graph).len(), 12);

    // One static hub route per remote network on every hub
    assert_eq!(graph.count(ResourceKind::HubRoute), 6);

    let link_ids: Vec<&str> = plan.links().iter().map(|link| link.id().as_str()).collect();
    assert_eq!(
        link_ids,
        vec![
            "us-east-1/peering/eu-west-1",
            "us-east-1/peering/ap-southeast-1",
            "eu-west-1/peering/ap-southeast-1",
        ]
    );
    assert!(plan
        .links()
        .iter()
        .all(|link| link.state() == LinkState::PendingAcceptance));

    let task = AcceptanceTask::new(*plan.policy(), never_failing);
    let summary = plan.accept_peering_links(&task);
    assert_eq!(summary.accepted, 3);
    assert!(summary.reports.iter().all(|report| report.attempts == 1));
    assert!(plan.links().iter().all(|link| link.state() == LinkState::Accepted));
}

#[test]
fn test_routes_are_symmetric_across_regions() {
    let config = parse_config(THREE_REGIONS).unwrap();
    let plan = plan_topology(&config).unwrap();
    let routes: HashSet<(ResourceId, String)> = cross_network_routes(plan.graph()).into_iter().collect();

    for local in plan.networks() {
        for remote in plan.networks() {
            if local.region() == remote.region() {
                continue;
            }
            for subnet in local.subnets() {
                assert!(
                    routes.contains(&(subnet.route_table.clone(), remote.address_block().to_string())),
                    "{} has no route toward {}",
                    subnet.id,
                    remote.region()
                );
            }
        }
    }
}

#[test]
fn test_overlapping_blocks_conflict() {
    let yaml = r#"
regions:
  - name: us-east-1
    address_block: 172.16.0.0/16
  - name: eu-west-1
    address_block: 172.16.128.0/17
"#;
    let config = parse_config(yaml).unwrap();
    match plan_topology(&config) {
        Err(PlanError::AllocationConflict { block, other_block, .. }) => {
            assert_eq!(block, "172.16.128.0/17");
            assert_eq!(other_block, "172.16.0.0/16");
        }
        other => panic!("expected AllocationConflict, got {:?}", other.map(|plan| plan.graph().len())),
    }
}

#[test]
fn test_remote_access_routes() {
    let yaml = r#"
regions:
  - name: us-east-1
    address_block: 172.16.0.0/16
    primary: true
peering:
  topology: disabled
remote_access:
  - region: us-east-1
    routed_cidr: 10.0.0.0/8
"#;
    let config = parse_config(yaml).unwrap();
    let plan = plan_topology(&config).unwrap();
    let graph = plan.graph();

    let vpn_routes = graph
        .of_kind(ResourceKind::Route)
        .filter(|node| {
            matches!(
                &node.resource,
                Resource::Route { target: RouteTarget::VpnGateway(_), .. }
            )
        })
        .count();
    assert_eq!(plan.network("us-east-1").unwrap().private_subnet_ids().len(), 2);
    assert_eq!(vpn_routes, 2);
    assert_eq!(graph.count(ResourceKind::VpnConnectionRoute), 1);
    assert_eq!(graph.count(ResourceKind::HubVpnAttachment), 1);

    let access = &plan.remote_access()[0];
    assert_eq!(access.state(graph), RemoteAccessState::Provisioned);
    assert_eq!(access.routed_cidr().to_string(), "10.0.0.0/8");
}

#[test]
fn test_edges_follow_creation_order() {
    let yaml = r#"
regions:
  - name: us-east-1
    address_block: 172.16.0.0/16
    primary: true
  - name: eu-west-1
    address_block: 172.17.0.0/16
remote_access:
  - region: eu-west-1
"#;
    let config = parse_config(yaml).unwrap();
    let plan = plan_topology(&config).unwrap();
    let graph = plan.graph();

    assert!(!graph.edges().is_empty());
    for edge in graph.edges() {
        let before = graph.position(&edge.before).unwrap();
        let after = graph.position(&edge.after).unwrap();
        assert!(before < after, "{} must come before {}", edge.before, edge.after);
    }

    // Hub routes across a link wait for its acceptance
    for node in graph.of_kind(ResourceKind::HubRoute) {
        let waits_for_acceptance = graph.dependencies_of(&node.id).iter().any(|dependency| {
            matches!(
                graph.get(dependency).map(|n| &n.resource),
                Some(Resource::PeeringAcceptance { .. })
            )
        });
        assert!(waits_for_acceptance, "{} does not wait for acceptance", node.id);
    }
}

#[test]
fn test_planning_is_deterministic() {
    let config = parse_config(THREE_REGIONS).unwrap();
    let first = plan_topology(&config).unwrap();
    let second = plan_topology(&config).unwrap();

    assert_eq!(first.graph().nodes(), second.graph().nodes());
    assert_eq!(first.graph().edges(), second.graph().edges());
    assert_eq!(first.outputs(), second.outputs());
}

#[test]
fn test_failing_endpoint_exhausts_attempts() {
    let config = parse_config(THREE_REGIONS).unwrap();
    let mut plan = plan_topology(&config).unwrap();

    let policy = AcceptancePolicy {
        backoff: Duration::ZERO,
        ..AcceptancePolicy::default()
    };
    let task = AcceptanceTask::new(policy, |_: &ResourceId, _: &str| -> Result<(), ApprovalError> {
        Err(ApprovalError::Retryable("attachment still pending".to_string()))
    });
    let summary = plan.accept_peering_links(&task);

    assert_eq!(summary.failed, 3);
    assert!(summary.reports.iter().all(|report| report.attempts == 5));
    assert!(plan.links().iter().all(|link| link.state() == LinkState::Failed));
}

#[test]
fn test_manifest_and_outputs_are_written() {
    let config = parse_config(THREE_REGIONS).unwrap();
    let output = TempDir::new().unwrap();

    let mut plan = generate_plan_manifest(&config, output.path()).unwrap();

    let manifest: Manifest =
        serde_yaml::from_str(&std::fs::read_to_string(output.path().join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest.metadata.name, "capstone");
    assert_eq!(manifest.metadata.resource_count, plan.graph().len());
    assert_eq!(manifest.resources.len(), plan.graph().len());
    assert_eq!(manifest.dependencies.len(), plan.graph().edges().len());

    let outputs: PlanOutputs =
        serde_json::from_str(&std::fs::read_to_string(output.path().join(OUTPUTS_FILE)).unwrap()).unwrap();
    let us = &outputs.networks["us-east-1"];
    assert_eq!(us.network_id.as_str(), "us-east-1/network");
    assert_eq!(us.probe_host_id.as_ref().map(|id| id.as_str()), Some("us-east-1/probe-host"));
    assert_eq!(outputs.hubs["eu-west-1"].route_table_id.as_str(), "eu-west-1/hub/route-table");
    assert_eq!(outputs.peering_links.len(), 3);
    assert_eq!(outputs.peering_links[0].requester_hub.as_str(), "us-east-1/hub");
    assert_eq!(outputs.peering_links[0].accepter_hub.as_str(), "eu-west-1/hub");

    let summary = plan.accept_peering_links(&AcceptanceTask::new(*plan.policy(), never_failing));
    let path = write_acceptance_report(&summary, output.path()).unwrap();
    assert_eq!(path, output.path().join(ACCEPTANCE_FILE));

    let written: AcceptanceSummary = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written, summary);
}
