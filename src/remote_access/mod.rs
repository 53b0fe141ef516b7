//! On-premises remote access over a site-to-site VPN.
//!
//! A remote access link attaches one on-premises site to one region's
//! network and hub. Private subnets route the on-premises CIDR through the
//! network-side VPN gateway; the hub gets its own VPN attachment.

use crate::config::RemoteAccessConfig;
use crate::error::PlanError;
use crate::graph::{GraphBuilder, Resource, ResourceGraph, ResourceId, RouteTarget};
use crate::ip::{cidr_slug, AddressRegistry};
use crate::network::{NetworkBlueprint, SubnetPurpose};
use ipnet::Ipv4Net;
use log::info;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Tunnel type of both VPN gateways
pub const TUNNEL_TYPE: &str = "ipsec.1";

/// The on-premises end of the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnPremPeer {
    /// Public address of the on-premises device, `0.0.0.0` until known
    pub address: Ipv4Addr,
    /// Recorded on the customer gateway, routing is static
    pub bgp_asn: u32,
}

impl From<&RemoteAccessConfig> for OnPremPeer {
    fn from(config: &RemoteAccessConfig) -> Self {
        Self {
            address: config.peer_address,
            bgp_asn: config.customer_asn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAccessState {
    Pending,
    Provisioned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccessOutputs {
    pub link_id: ResourceId,
    pub customer_gateway_id: ResourceId,
    pub vpn_gateway_id: ResourceId,
    pub vpn_connection_id: ResourceId,
    pub hub_vpn_attachment_id: ResourceId,
    pub routed_cidr: Ipv4Net,
}

/// Planned VPN between an on-premises site and one region
#[derive(Debug, Clone)]
pub struct RemoteAccessLink {
    id: ResourceId,
    region: String,
    routed_cidr: Ipv4Net,
    customer_gateway: ResourceId,
    vpn_gateway: ResourceId,
    gateway_attachment: ResourceId,
    connection: ResourceId,
    connection_route: ResourceId,
    hub_attachment: ResourceId,
    subnet_routes: Vec<ResourceId>,
}

impl RemoteAccessLink {
    pub fn create(
        graph: &mut GraphBuilder,
        registry: &AddressRegistry,
        peer: &OnPremPeer,
        routed_cidr: Ipv4Net,
        hub_id: &ResourceId,
        network: &NetworkBlueprint,
    ) -> Result<Self, PlanError> {
        let region = network.region();
        let id = ResourceId::new(region, "remote-access");

        if !graph.contains(hub_id) {
            return Err(PlanError::IncompleteTopology {
                component: id.to_string(),
                missing: hub_id.to_string(),
            });
        }
        if let Some(claim) = registry.find_overlap(&routed_cidr) {
            return Err(PlanError::AllocationConflict {
                component: id.to_string(),
                block: routed_cidr.to_string(),
                other_component: claim.owner.clone(),
                other_block: claim.block.to_string(),
            });
        }

        let customer_gateway = graph.add(
            region,
            id.child("customer-gateway"),
            Resource::CustomerGateway {
                ip_address: peer.address,
                bgp_asn: peer.bgp_asn,
                tunnel_type: TUNNEL_TYPE.to_string(),
            },
        )?;
        let vpn_gateway = graph.add(
            region,
            id.child("vpn-gateway"),
            Resource::VpnGateway {
                tunnel_type: TUNNEL_TYPE.to_string(),
            },
        )?;
        let gateway_attachment = graph.add(
            region,
            vpn_gateway.child("attachment"),
            Resource::VpnGatewayAttachment {
                network: network.network_id().clone(),
                gateway: vpn_gateway.clone(),
            },
        )?;
        let connection = graph.add(
            region,
            id.child("connection"),
            Resource::VpnConnection {
                customer_gateway: customer_gateway.clone(),
                vpn_gateway: vpn_gateway.clone(),
                static_routes_only: true,
            },
        )?;
        let connection_route = graph.add(
            region,
            connection.child(format!("route/{}", cidr_slug(&routed_cidr))),
            Resource::VpnConnectionRoute {
                connection: connection.clone(),
                destination: routed_cidr,
            },
        )?;
        let hub_attachment = graph.add_after(
            region,
            id.child("hub-attachment"),
            Resource::HubVpnAttachment {
                hub: hub_id.clone(),
                connection: connection.clone(),
            },
            &[&connection_route],
        )?;

        let mut subnet_routes = Vec::new();
        for subnet in network.subnets_of(SubnetPurpose::Private) {
            let route = graph.add_after(
                region,
                subnet.route_table.child(format!("route/{}", cidr_slug(&routed_cidr))),
                Resource::Route {
                    route_table: subnet.route_table.clone(),
                    destination: routed_cidr,
                    target: RouteTarget::VpnGateway(vpn_gateway.clone()),
                },
                &[&gateway_attachment],
            )?;
            subnet_routes.push(route);
        }

        info!(
            "Planned remote access {} for {} over {} private subnet(s)",
            id,
            routed_cidr,
            subnet_routes.len()
        );
        Ok(Self {
            id,
            region: region.to_string(),
            routed_cidr,
            customer_gateway,
            vpn_gateway,
            gateway_attachment,
            connection,
            connection_route,
            hub_attachment,
            subnet_routes,
        })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn routed_cidr(&self) -> Ipv4Net {
        self.routed_cidr
    }

    pub fn subnet_routes(&self) -> &[ResourceId] {
        &self.subnet_routes
    }

    /// `Provisioned` once every component is in `graph`
    pub fn state(&self, graph: &ResourceGraph) -> RemoteAccessState {
        let components = [
            &self.customer_gateway,
            &self.vpn_gateway,
            &self.gateway_attachment,
            &self.connection,
            &self.connection_route,
            &self.hub_attachment,
        ];
        if components.iter().all(|id| graph.contains(id)) {
            RemoteAccessState::Provisioned
        } else {
            RemoteAccessState::Pending
        }
    }

    pub fn outputs(&self) -> RemoteAccessOutputs {
        RemoteAccessOutputs {
            link_id: self.id.clone(),
            customer_gateway_id: self.customer_gateway.clone(),
            vpn_gateway_id: self.vpn_gateway.clone(),
            vpn_connection_id: self.connection.clone(),
            hub_vpn_attachment_id: self.hub_attachment.clone(),
            routed_cidr: self.routed_cidr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionConfig;
    use crate::graph::ResourceKind;
    use crate::hub::{RoutingHub, DEFAULT_HUB_ASN};

    fn peer() -> OnPremPeer {
        OnPremPeer {
            address: Ipv4Addr::UNSPECIFIED,
            bgp_asn: 65000,
        }
    }

    fn corporate() -> Ipv4Net {
        "10.0.0.0/8".parse().unwrap()
    }

    #[test]
    fn test_routes_every_private_subnet() {
        let mut graph = GraphBuilder::new();
        let mut registry = AddressRegistry::new();
        let network = NetworkBlueprint::create(
            &mut graph,
            &mut registry,
            &RegionConfig::new("us-east-1", "172.16.0.0/16"),
            true,
        )
        .unwrap();
        let hub = RoutingHub::create(&mut graph, "us-east-1", DEFAULT_HUB_ASN, false).unwrap();

        let link =
            RemoteAccessLink::create(&mut graph, &registry, &peer(), corporate(), hub.id(), &network).unwrap();
        assert_eq!(link.subnet_routes().len(), 2);

        let graph = graph.build();
        assert_eq!(graph.count(ResourceKind::VpnConnectionRoute), 1);
        assert_eq!(link.state(&graph), RemoteAccessState::Provisioned);

        match &graph.get(&link.outputs().customer_gateway_id).unwrap().resource {
            Resource::CustomerGateway { bgp_asn, tunnel_type, .. } => {
                assert_eq!(*bgp_asn, 65000);
                assert_eq!(tunnel_type, TUNNEL_TYPE);
            }
            other => panic!("expected customer gateway, got {:?}", other),
        }

        // The hub attachment waits for the connection route
        let outputs = link.outputs();
        let connection_route = graph
            .of_kind(ResourceKind::VpnConnectionRoute)
            .next()
            .map(|node| node.id.clone())
            .unwrap();
        assert!(graph
            .dependencies_of(&outputs.hub_vpn_attachment_id)
            .contains(&&connection_route));
    }

    #[test]
    fn test_missing_hub_is_incomplete() {
        let mut graph = GraphBuilder::new();
        let mut registry = AddressRegistry::new();
        let network = NetworkBlueprint::create(
            &mut graph,
            &mut registry,
            &RegionConfig::new("us-east-1", "172.16.0.0/16"),
            true,
        )
        .unwrap();

        let result = RemoteAccessLink::create(
            &mut graph,
            &registry,
            &peer(),
            corporate(),
            &ResourceId::new("us-east-1", "hub"),
            &network,
        );
        assert!(matches!(result, Err(PlanError::IncompleteTopology { .. })));
    }

    #[test]
    fn test_routed_cidr_must_not_overlap_networks() {
        let mut graph = GraphBuilder::new();
        let mut registry = AddressRegistry::new();
        let network = NetworkBlueprint::create(
            &mut graph,
            &mut registry,
            &RegionConfig::new("us-east-1", "10.1.0.0/16"),
            true,
        )
        .unwrap();
        let hub = RoutingHub::create(&mut graph, "us-east-1", DEFAULT_HUB_ASN, false).unwrap();

        let result = RemoteAccessLink::create(&mut graph, &registry, &peer(), corporate(), hub.id(), &network);
        match result {
            Err(PlanError::AllocationConflict { other_block, .. }) => assert_eq!(other_block, "10.1.0.0/16"),
            other => panic!("expected AllocationConflict, got {:?}", other.map(|l| l.id().clone())),
        }
    }
}
