//! Per-region isolated network.
//!
//! A blueprint owns the network, its subnets and their route tables, the
//! egress gateways, the reachability security policy and the optional probe
//! host. Dependents (hubs, remote access links) only add routes to the
//! subnet route tables it exposes.

use crate::config::{RegionConfig, SubnetPurpose, MAX_AVAILABILITY_ZONES};
use crate::error::PlanError;
use crate::graph::{GraphBuilder, IngressRule, Protocol, Resource, ResourceId, RouteTarget};
use crate::ip::{carve_subnets, parse_block, AddressRegistry};
use ipnet::Ipv4Net;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// TCP port opened by the reachability policy
pub const MANAGEMENT_PORT: u16 = 22;

/// A subnet together with its own route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSubnet {
    pub id: ResourceId,
    pub route_table: ResourceId,
    pub cidr: Ipv4Net,
    pub purpose: SubnetPurpose,
    pub availability_zone: String,
}

/// Identifiers a network exposes to operators and downstream stacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOutputs {
    pub network_id: ResourceId,
    pub address_block: Ipv4Net,
    pub private_subnet_ids: Vec<ResourceId>,
    pub security_policy_id: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_host_id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_private_address: Option<String>,
}

/// One region's planned network
#[derive(Debug, Clone)]
pub struct NetworkBlueprint {
    region: String,
    address_block: Ipv4Net,
    network_id: ResourceId,
    subnets: Vec<PlannedSubnet>,
    security_policy: ResourceId,
    internet_gateway: Option<ResourceId>,
    probe_host: Option<ResourceId>,
}

impl NetworkBlueprint {
    /// Plan the network described by `region`
    ///
    /// Subnets are laid out entry by entry, each entry repeated across the
    /// region's availability zones, and carved in that order from the start
    /// of the address block. When `require_transit` is set the layout must
    /// contain at least one public and one private subnet.
    pub fn create(
        graph: &mut GraphBuilder,
        registry: &mut AddressRegistry,
        region: &RegionConfig,
        require_transit: bool,
    ) -> Result<Self, PlanError> {
        let name = region.name.as_str();
        let network_id = ResourceId::new(name, "network");
        let component = network_id.to_string();

        let block = parse_block(&component, &region.address_block)?;
        if !(1..=MAX_AVAILABILITY_ZONES).contains(&region.availability_zones) {
            return Err(PlanError::InvalidAddressSpace {
                component,
                reason: format!(
                    "availability_zones must be between 1 and {}, got {}",
                    MAX_AVAILABILITY_ZONES, region.availability_zones
                ),
            });
        }

        let zones = region.zone_names();
        let mut layout: Vec<(SubnetPurpose, u8, &str)> = Vec::new();
        for entry in &region.subnets {
            for zone in &zones {
                layout.push((entry.purpose, entry.mask, zone.as_str()));
            }
        }

        if require_transit {
            for purpose in [SubnetPurpose::Public, SubnetPurpose::Private] {
                if !layout.iter().any(|(p, _, _)| *p == purpose) {
                    return Err(PlanError::InvalidAddressSpace {
                        component,
                        reason: format!(
                            "transit requires at least one public and one private subnet, the layout has no {} subnet",
                            purpose.as_str()
                        ),
                    });
                }
            }
        }

        let masks: Vec<u8> = layout.iter().map(|(_, mask, _)| *mask).collect();
        let cidrs = carve_subnets(&component, block, &masks)?;
        registry.claim(&component, block)?;

        graph.add(
            name,
            network_id.clone(),
            Resource::Network {
                cidr: block,
                enable_dns: true,
            },
        )?;

        let mut ordinals: BTreeMap<SubnetPurpose, usize> = BTreeMap::new();
        let mut subnets = Vec::with_capacity(layout.len());
        for ((purpose, _, zone), cidr) in layout.into_iter().zip(cidrs) {
            let ordinal = ordinals.entry(purpose).or_insert(0);
            *ordinal += 1;

            let id = ResourceId::new(name, format!("subnet/{}-{}", purpose.as_str(), ordinal));
            graph.add(
                name,
                id.clone(),
                Resource::Subnet {
                    network: network_id.clone(),
                    cidr,
                    purpose,
                    availability_zone: zone.to_string(),
                    map_public_ip: purpose == SubnetPurpose::Public,
                },
            )?;
            let route_table = graph.add(
                name,
                id.child("route-table"),
                Resource::RouteTable { subnet: id.clone() },
            )?;
            debug!("{}: {} subnet {} in {}", component, purpose.as_str(), cidr, zone);

            subnets.push(PlannedSubnet {
                id,
                route_table,
                cidr,
                purpose,
                availability_zone: zone.to_string(),
            });
        }

        let internet_gateway = if region.egress {
            plan_egress(graph, name, &network_id, &subnets)?
        } else {
            None
        };

        let security_policy = graph.add(
            name,
            ResourceId::new(name, "reachability-policy"),
            Resource::SecurityPolicy {
                network: network_id.clone(),
                description: "Reachability testing across regions, not a production boundary".to_string(),
                ingress: reachability_rules(),
                allow_all_egress: true,
            },
        )?;

        let probe_host = match &region.probe {
            Some(probe) => {
                let purpose = if region.primary {
                    SubnetPurpose::Public
                } else {
                    SubnetPurpose::Private
                };
                let subnet = subnets
                    .iter()
                    .find(|subnet| subnet.purpose == purpose)
                    .ok_or_else(|| PlanError::InvalidAddressSpace {
                        component: component.clone(),
                        reason: format!("no {} subnet to place the probe host in", purpose.as_str()),
                    })?;
                let id = graph.add(
                    name,
                    ResourceId::new(name, "probe-host"),
                    Resource::ProbeHost {
                        subnet: subnet.id.clone(),
                        security_policy: security_policy.clone(),
                        instance_type: probe.instance_type.clone(),
                        machine_image: probe.machine_image.clone(),
                        key_name: probe.key_name.clone(),
                    },
                )?;
                Some(id)
            }
            None => None,
        };

        info!(
            "Planned network {} ({}) with {} subnet(s)",
            network_id,
            block,
            subnets.len()
        );

        Ok(Self {
            region: name.to_string(),
            address_block: block,
            network_id,
            subnets,
            security_policy,
            internet_gateway,
            probe_host,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn address_block(&self) -> Ipv4Net {
        self.address_block
    }

    pub fn network_id(&self) -> &ResourceId {
        &self.network_id
    }

    pub fn subnets(&self) -> &[PlannedSubnet] {
        &self.subnets
    }

    pub fn subnets_of(&self, purpose: SubnetPurpose) -> impl Iterator<Item = &PlannedSubnet> {
        self.subnets.iter().filter(move |subnet| subnet.purpose == purpose)
    }

    pub fn subnet_ids_by_purpose(&self) -> BTreeMap<SubnetPurpose, Vec<ResourceId>> {
        let mut by_purpose: BTreeMap<SubnetPurpose, Vec<ResourceId>> = BTreeMap::new();
        for subnet in &self.subnets {
            by_purpose.entry(subnet.purpose).or_default().push(subnet.id.clone());
        }
        by_purpose
    }

    pub fn private_subnet_ids(&self) -> Vec<ResourceId> {
        self.subnets_of(SubnetPurpose::Private)
            .map(|subnet| subnet.id.clone())
            .collect()
    }

    pub fn security_policy(&self) -> &ResourceId {
        &self.security_policy
    }

    pub fn internet_gateway(&self) -> Option<&ResourceId> {
        self.internet_gateway.as_ref()
    }

    pub fn probe_host(&self) -> Option<&ResourceId> {
        self.probe_host.as_ref()
    }

    pub fn outputs(&self) -> NetworkOutputs {
        NetworkOutputs {
            network_id: self.network_id.clone(),
            address_block: self.address_block,
            private_subnet_ids: self.private_subnet_ids(),
            security_policy_id: self.security_policy.clone(),
            probe_host_id: self.probe_host.clone(),
            probe_private_address: self.probe_host.as_ref().map(|id| id.attr("private_ip")),
        }
    }
}

/// ICMP and the management port from anywhere
fn reachability_rules() -> Vec<IngressRule> {
    let anywhere = Ipv4Net::default();
    vec![
        IngressRule {
            protocol: Protocol::Icmp,
            port: None,
            source: anywhere,
            description: "Allow ICMP from anywhere".to_string(),
        },
        IngressRule {
            protocol: Protocol::Tcp,
            port: Some(MANAGEMENT_PORT),
            source: anywhere,
            description: "Allow SSH".to_string(),
        },
    ]
}

/// Internet gateway for public subnets and one NAT gateway per zone for private ones
fn plan_egress(
    graph: &mut GraphBuilder,
    region: &str,
    network: &ResourceId,
    subnets: &[PlannedSubnet],
) -> Result<Option<ResourceId>, PlanError> {
    let public: Vec<&PlannedSubnet> = subnets
        .iter()
        .filter(|subnet| subnet.purpose == SubnetPurpose::Public)
        .collect();
    if public.is_empty() {
        warn!("{}: egress requested but the layout has no public subnet", network);
        return Ok(None);
    }

    let default_route = Ipv4Net::default();
    let gateway = graph.add(
        region,
        ResourceId::new(region, "internet-gateway"),
        Resource::InternetGateway {
            network: network.clone(),
        },
    )?;

    let mut nat_gateways: Vec<(String, ResourceId)> = Vec::new();
    for subnet in &public {
        graph.add(
            region,
            subnet.route_table.child("route/default"),
            Resource::Route {
                route_table: subnet.route_table.clone(),
                destination: default_route,
                target: RouteTarget::InternetGateway(gateway.clone()),
            },
        )?;

        if nat_gateways.iter().all(|(zone, _)| *zone != subnet.availability_zone) {
            let nat = graph.add_after(
                region,
                ResourceId::new(region, format!("nat-gateway/{}", subnet.availability_zone)),
                Resource::NatGateway {
                    subnet: subnet.id.clone(),
                },
                &[&gateway],
            )?;
            nat_gateways.push((subnet.availability_zone.clone(), nat));
        }
    }

    for subnet in subnets.iter().filter(|s| s.purpose == SubnetPurpose::Private) {
        let nat = nat_gateways
            .iter()
            .find(|(zone, _)| *zone == subnet.availability_zone)
            .or_else(|| nat_gateways.first())
            .map(|(_, nat)| nat.clone());
        if let Some(nat) = nat {
            graph.add(
                region,
                subnet.route_table.child("route/default"),
                Resource::Route {
                    route_table: subnet.route_table.clone(),
                    destination: default_route,
                    target: RouteTarget::NatGateway(nat),
                },
            )?;
        }
    }

    Ok(Some(gateway))
}
