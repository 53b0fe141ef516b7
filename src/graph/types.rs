//! Resource graph type definitions.
//!
//! This module contains the typed resource descriptors that make up a plan,
//! the logical identifiers they are addressed by, and the ordering edges
//! handed to the provisioning engine.

use crate::config::SubnetPurpose;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

// ============================================================================
// Identifiers
// ============================================================================

/// Logical identifier of a resource, e.g. `us-east-1/subnet/private-1`.
///
/// Identifiers are deterministic: planning the same configuration twice
/// yields the same identifiers. Physical identifiers are assigned by the
/// provisioning engine and referenced through [`ResourceId::attr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Build an identifier scoped to a region
    pub fn new(region: &str, path: impl AsRef<str>) -> Self {
        Self(format!("{}/{}", region, path.as_ref()))
    }

    /// Identifier of a resource nested below this one
    pub fn child(&self, path: impl AsRef<str>) -> Self {
        Self(format!("{}/{}", self.0, path.as_ref()))
    }

    /// Reference to an attribute the engine resolves at apply time
    pub fn attr(&self, name: &str) -> String {
        format!("${{{}.{}}}", self.0, name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Resource Descriptors
// ============================================================================

/// Transport protocol of an ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Icmp,
    Tcp,
}

/// Ingress rule of a security policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: Protocol,
    /// `None` means every port (or every ICMP type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub source: Ipv4Net,
    pub description: String,
}

/// Where a route sends matching traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RouteTarget {
    Hub(ResourceId),
    InternetGateway(ResourceId),
    NatGateway(ResourceId),
    VpnGateway(ResourceId),
}

impl RouteTarget {
    pub fn resource(&self) -> &ResourceId {
        match self {
            RouteTarget::Hub(id)
            | RouteTarget::InternetGateway(id)
            | RouteTarget::NatGateway(id)
            | RouteTarget::VpnGateway(id) => id,
        }
    }
}

/// A typed resource descriptor
///
/// Every identifier a descriptor holds is a dependency: the graph builder
/// adds a "must exist before" edge for each of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    Network {
        cidr: Ipv4Net,
        enable_dns: bool,
    },
    Subnet {
        network: ResourceId,
        cidr: Ipv4Net,
        purpose: SubnetPurpose,
        availability_zone: String,
        map_public_ip: bool,
    },
    RouteTable {
        subnet: ResourceId,
    },
    InternetGateway {
        network: ResourceId,
    },
    NatGateway {
        subnet: ResourceId,
    },
    SecurityPolicy {
        network: ResourceId,
        description: String,
        ingress: Vec<IngressRule>,
        allow_all_egress: bool,
    },
    ProbeHost {
        subnet: ResourceId,
        security_policy: ResourceId,
        instance_type: String,
        machine_image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        key_name: Option<String>,
    },
    Route {
        route_table: ResourceId,
        destination: Ipv4Net,
        target: RouteTarget,
    },
    Hub {
        asn: u32,
        auto_accept_shared_attachments: bool,
        default_route_table_association: bool,
        default_route_table_propagation: bool,
        multicast_support: bool,
    },
    HubRouteTable {
        hub: ResourceId,
    },
    HubAttachment {
        hub: ResourceId,
        network: ResourceId,
        subnets: Vec<ResourceId>,
    },
    HubRouteTableAssociation {
        route_table: ResourceId,
        attachment: ResourceId,
    },
    HubRouteTablePropagation {
        route_table: ResourceId,
        attachment: ResourceId,
    },
    HubRoute {
        route_table: ResourceId,
        destination: Ipv4Net,
        attachment: ResourceId,
    },
    MulticastDomain {
        hub: ResourceId,
        auto_accept_shared_associations: bool,
        igmpv2_support: bool,
    },
    MulticastAssociation {
        domain: ResourceId,
        attachment: ResourceId,
        subnet: ResourceId,
    },
    PeeringAttachment {
        hub: ResourceId,
        peer_hub: ResourceId,
        peer_region: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        peer_account: Option<String>,
    },
    AcceptanceHandler {
        max_attempts: u32,
        backoff_secs: u64,
        timeout_secs: u64,
        permissions: Vec<String>,
    },
    PeeringAcceptance {
        handler: ResourceId,
        link: ResourceId,
        target_region: String,
    },
    CustomerGateway {
        ip_address: Ipv4Addr,
        bgp_asn: u32,
        tunnel_type: String,
    },
    VpnGateway {
        tunnel_type: String,
    },
    VpnGatewayAttachment {
        network: ResourceId,
        gateway: ResourceId,
    },
    VpnConnection {
        customer_gateway: ResourceId,
        vpn_gateway: ResourceId,
        static_routes_only: bool,
    },
    VpnConnectionRoute {
        connection: ResourceId,
        destination: Ipv4Net,
    },
    HubVpnAttachment {
        hub: ResourceId,
        connection: ResourceId,
    },
}

/// Kind of a resource, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnet,
    RouteTable,
    InternetGateway,
    NatGateway,
    SecurityPolicy,
    ProbeHost,
    Route,
    Hub,
    HubRouteTable,
    HubAttachment,
    HubRouteTableAssociation,
    HubRouteTablePropagation,
    HubRoute,
    MulticastDomain,
    MulticastAssociation,
    PeeringAttachment,
    AcceptanceHandler,
    PeeringAcceptance,
    CustomerGateway,
    VpnGateway,
    VpnGatewayAttachment,
    VpnConnection,
    VpnConnectionRoute,
    HubVpnAttachment,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Network { .. } => ResourceKind::Network,
            Resource::Subnet { .. } => ResourceKind::Subnet,
            Resource::RouteTable { .. } => ResourceKind::RouteTable,
            Resource::InternetGateway { .. } => ResourceKind::InternetGateway,
            Resource::NatGateway { .. } => ResourceKind::NatGateway,
            Resource::SecurityPolicy { .. } => ResourceKind::SecurityPolicy,
            Resource::ProbeHost { .. } => ResourceKind::ProbeHost,
            Resource::Route { .. } => ResourceKind::Route,
            Resource::Hub { .. } => ResourceKind::Hub,
            Resource::HubRouteTable { .. } => ResourceKind::HubRouteTable,
            Resource::HubAttachment { .. } => ResourceKind::HubAttachment,
            Resource::HubRouteTableAssociation { .. } => ResourceKind::HubRouteTableAssociation,
            Resource::HubRouteTablePropagation { .. } => ResourceKind::HubRouteTablePropagation,
            Resource::HubRoute { .. } => ResourceKind::HubRoute,
            Resource::MulticastDomain { .. } => ResourceKind::MulticastDomain,
            Resource::MulticastAssociation { .. } => ResourceKind::MulticastAssociation,
            Resource::PeeringAttachment { .. } => ResourceKind::PeeringAttachment,
            Resource::AcceptanceHandler { .. } => ResourceKind::AcceptanceHandler,
            Resource::PeeringAcceptance { .. } => ResourceKind::PeeringAcceptance,
            Resource::CustomerGateway { .. } => ResourceKind::CustomerGateway,
            Resource::VpnGateway { .. } => ResourceKind::VpnGateway,
            Resource::VpnGatewayAttachment { .. } => ResourceKind::VpnGatewayAttachment,
            Resource::VpnConnection { .. } => ResourceKind::VpnConnection,
            Resource::VpnConnectionRoute { .. } => ResourceKind::VpnConnectionRoute,
            Resource::HubVpnAttachment { .. } => ResourceKind::HubVpnAttachment,
        }
    }

    /// Identifiers of every resource this descriptor points at
    pub fn references(&self) -> Vec<&ResourceId> {
        match self {
            Resource::Network { .. }
            | Resource::Hub { .. }
            | Resource::AcceptanceHandler { .. }
            | Resource::CustomerGateway { .. }
            | Resource::VpnGateway { .. } => Vec::new(),
            Resource::Subnet { network, .. } => vec![network],
            Resource::RouteTable { subnet } => vec![subnet],
            Resource::InternetGateway { network } => vec![network],
            Resource::NatGateway { subnet } => vec![subnet],
            Resource::SecurityPolicy { network, .. } => vec![network],
            Resource::ProbeHost {
                subnet,
                security_policy,
                ..
            } => vec![subnet, security_policy],
            Resource::Route {
                route_table,
                target,
                ..
            } => vec![route_table, target.resource()],
            Resource::HubRouteTable { hub } => vec![hub],
            Resource::HubAttachment {
                hub,
                network,
                subnets,
            } => {
                let mut refs = vec![hub, network];
                refs.extend(subnets.iter());
                refs
            }
            Resource::HubRouteTableAssociation {
                route_table,
                attachment,
            }
            | Resource::HubRouteTablePropagation {
                route_table,
                attachment,
            }
            | Resource::HubRoute {
                route_table,
                attachment,
                ..
            } => vec![route_table, attachment],
            Resource::MulticastDomain { hub, .. } => vec![hub],
            Resource::MulticastAssociation {
                domain,
                attachment,
                subnet,
            } => vec![domain, attachment, subnet],
            Resource::PeeringAttachment { hub, peer_hub, .. } => vec![hub, peer_hub],
            Resource::PeeringAcceptance { handler, link, .. } => vec![handler, link],
            Resource::VpnGatewayAttachment { network, gateway } => vec![network, gateway],
            Resource::VpnConnection {
                customer_gateway,
                vpn_gateway,
                ..
            } => vec![customer_gateway, vpn_gateway],
            Resource::VpnConnectionRoute { connection, .. } => vec![connection],
            Resource::HubVpnAttachment { hub, connection } => vec![hub, connection],
        }
    }
}

// ============================================================================
// Graph Elements
// ============================================================================

/// A resource placed in a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: ResourceId,
    pub region: String,
    #[serde(flatten)]
    pub resource: Resource,
}

/// "`before` must exist before `after` is submitted for creation"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub before: ResourceId,
    pub after: ResourceId,
}
