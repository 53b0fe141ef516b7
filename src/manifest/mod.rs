//! Provisioning boundary documents.
//!
//! The manifest is written as YAML, outputs and acceptance reports as JSON.

pub mod types;

pub use types::{AcceptanceSummary, Manifest, ManifestMetadata, PeeringOutputs, PlanOutputs};

use crate::graph::ResourceGraph;
use chrono::Utc;

/// Generator string recorded in every manifest
pub fn generator() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

impl Manifest {
    /// Snapshot `graph` into a manifest stamped with the current time
    pub fn from_graph(name: &str, regions: Vec<String>, graph: &ResourceGraph) -> Self {
        Self {
            metadata: ManifestMetadata {
                name: name.to_string(),
                generator: generator(),
                generated_at: Utc::now(),
                regions,
                resource_count: graph.len(),
                dependency_count: graph.edges().len(),
            },
            resources: graph.nodes().to_vec(),
            dependencies: graph.edges().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Resource, ResourceId, ResourceKind, RouteTarget};
    use crate::peering::{AcceptanceReport, AcceptanceStatus};

    #[test]
    fn test_manifest_from_graph() {
        let mut builder = GraphBuilder::new();
        let network = builder
            .add(
                "us-east-1",
                ResourceId::new("us-east-1", "network"),
                Resource::Network {
                    cidr: "172.16.0.0/16".parse().unwrap(),
                    enable_dns: true,
                },
            )
            .unwrap();
        builder
            .add(
                "us-east-1",
                ResourceId::new("us-east-1", "internet-gateway"),
                Resource::InternetGateway { network },
            )
            .unwrap();
        let graph = builder.build();

        let manifest = Manifest::from_graph("capstone", vec!["us-east-1".to_string()], &graph);
        assert_eq!(manifest.metadata.resource_count, 2);
        assert_eq!(manifest.metadata.dependency_count, 1);
        assert!(manifest.metadata.generator.starts_with("transitmesh "));

        let yaml = serde_yaml::to_string(&manifest).unwrap();
        assert!(yaml.contains("type: internet_gateway"));
        assert!(yaml.contains("id: us-east-1/network"));

        let parsed: Manifest = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.resources, manifest.resources);
    }

    #[test]
    fn test_manifest_with_routes_reads_back() {
        let mut builder = GraphBuilder::new();
        let region = "us-east-1";
        let network = builder
            .add(
                region,
                ResourceId::new(region, "network"),
                Resource::Network {
                    cidr: "172.16.0.0/16".parse().unwrap(),
                    enable_dns: true,
                },
            )
            .unwrap();
        let gateway = builder
            .add(
                region,
                ResourceId::new(region, "internet-gateway"),
                Resource::InternetGateway { network: network.clone() },
            )
            .unwrap();
        let subnet = builder
            .add(
                region,
                ResourceId::new(region, "subnet/public-1"),
                Resource::Subnet {
                    network: network.clone(),
                    cidr: "172.16.0.0/24".parse().unwrap(),
                    purpose: crate::config::SubnetPurpose::Public,
                    availability_zone: "us-east-1a".to_string(),
                    map_public_ip: true,
                },
            )
            .unwrap();
        let nat = builder
            .add(
                region,
                ResourceId::new(region, "nat-gateway/us-east-1a"),
                Resource::NatGateway { subnet: subnet.clone() },
            )
            .unwrap();
        let table = builder
            .add(
                region,
                ResourceId::new(region, "subnet/public-1/route-table"),
                Resource::RouteTable { subnet },
            )
            .unwrap();
        let hub = builder
            .add(
                region,
                ResourceId::new(region, "hub"),
                Resource::Hub {
                    asn: 64512,
                    auto_accept_shared_attachments: true,
                    default_route_table_association: false,
                    default_route_table_propagation: false,
                    multicast_support: true,
                },
            )
            .unwrap();
        let vpn = builder
            .add(
                region,
                ResourceId::new(region, "vpn-gateway"),
                Resource::VpnGateway {
                    tunnel_type: "ipsec.1".to_string(),
                },
            )
            .unwrap();

        let targets = [
            ("0.0.0.0/0", RouteTarget::InternetGateway(gateway)),
            ("192.168.0.0/16", RouteTarget::NatGateway(nat)),
            ("172.17.0.0/16", RouteTarget::Hub(hub)),
            ("10.0.0.0/8", RouteTarget::VpnGateway(vpn)),
        ];
        for (index, (destination, target)) in targets.into_iter().enumerate() {
            builder
                .add(
                    region,
                    table.child(&format!("route/{}", index)),
                    Resource::Route {
                        route_table: table.clone(),
                        destination: destination.parse().unwrap(),
                        target,
                    },
                )
                .unwrap();
        }
        let graph = builder.build();
        assert_eq!(graph.count(ResourceKind::Route), 4);

        let manifest = Manifest::from_graph("capstone", vec![region.to_string()], &graph);
        let yaml = serde_yaml::to_string(&manifest).unwrap();
        assert!(!yaml.contains('!'));
        assert!(yaml.contains("kind: nat_gateway"));
        assert!(yaml.contains("id: us-east-1/vpn-gateway"));

        let parsed: Manifest = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.resources, manifest.resources);
        assert_eq!(parsed.dependencies, manifest.dependencies);
    }

    #[test]
    fn test_acceptance_summary_counts() {
        let report = |link: &str, status| AcceptanceReport {
            link_id: ResourceId::new("us-east-1", link),
            status,
            reason: None,
            attempts: 1,
        };
        let summary = AcceptanceSummary::from_reports(vec![
            report("peering/eu-west-1", AcceptanceStatus::Success),
            report("peering/ap-southeast-1", AcceptanceStatus::Failure),
        ]);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_accepted());
    }
}
