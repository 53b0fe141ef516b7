//! Regional routing hub.
//!
//! A hub attaches the networks of its region, owns one shared route table
//! with default association and propagation disabled, and optionally a
//! multicast domain. Hubs never own the networks they attach: they keep
//! identifiers and CIDRs only.
//!
//! Routes are installed by [`RoutingHub::propagate_routes`], which is safe to
//! call any number of times.

use crate::error::PlanError;
use crate::graph::{GraphBuilder, Resource, ResourceId, RouteTarget};
use crate::ip::{blocks_overlap, cidr_slug};
use crate::network::NetworkBlueprint;
use crate::utils::is_private_asn;
use ipnet::Ipv4Net;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// ASN shared by every hub unless overridden
pub const DEFAULT_HUB_ASN: u32 = 64512;

/// Handle on a network attached to a hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedNetwork {
    pub region: String,
    pub network: ResourceId,
    pub cidr: Ipv4Net,
    pub attachment: ResourceId,
    /// Subnets the attachment is placed in
    pub subnets: Vec<ResourceId>,
    /// Route tables of every public and private subnet
    pub route_tables: Vec<ResourceId>,
}

/// A CIDR reachable through a peering link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePrefix {
    pub cidr: Ipv4Net,
    pub region: String,
    /// Peering attachment traffic leaves through
    pub via: ResourceId,
    /// Resource that must exist before the hub routes through `via`
    pub after: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubOutputs {
    pub hub_id: ResourceId,
    pub route_table_id: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast_domain_id: Option<ResourceId>,
    pub attachment_ids: Vec<ResourceId>,
}

/// One region's transit hub
#[derive(Debug, Clone)]
pub struct RoutingHub {
    region: String,
    id: ResourceId,
    asn: u32,
    route_table: ResourceId,
    multicast_domain: Option<ResourceId>,
    attachments: Vec<AttachedNetwork>,
    remote_prefixes: Vec<RemotePrefix>,
}

impl RoutingHub {
    /// Plan a hub with its shared route table
    pub fn create(
        graph: &mut GraphBuilder,
        region: &str,
        asn: u32,
        multicast_enabled: bool,
    ) -> Result<Self, PlanError> {
        let id = ResourceId::new(region, "hub");
        if !is_private_asn(asn) {
            return Err(PlanError::InvalidAsn {
                hub: id.to_string(),
                asn,
            });
        }

        graph.add(
            region,
            id.clone(),
            Resource::Hub {
                asn,
                auto_accept_shared_attachments: true,
                default_route_table_association: false,
                default_route_table_propagation: false,
                multicast_support: multicast_enabled,
            },
        )?;
        let route_table = graph.add(
            region,
            id.child("route-table"),
            Resource::HubRouteTable { hub: id.clone() },
        )?;

        let multicast_domain = if multicast_enabled {
            Some(graph.add(
                region,
                id.child("multicast-domain"),
                Resource::MulticastDomain {
                    hub: id.clone(),
                    auto_accept_shared_associations: true,
                    igmpv2_support: true,
                },
            )?)
        } else {
            None
        };

        info!("Planned hub {} (ASN {})", id, asn);
        Ok(Self {
            region: region.to_string(),
            id,
            asn,
            route_table,
            multicast_domain,
            attachments: Vec::new(),
            remote_prefixes: Vec::new(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn asn(&self) -> u32 {
        self.asn
    }

    pub fn route_table(&self) -> &ResourceId {
        &self.route_table
    }

    pub fn multicast_domain(&self) -> Option<&ResourceId> {
        self.multicast_domain.as_ref()
    }

    pub fn attachments(&self) -> &[AttachedNetwork] {
        &self.attachments
    }

    pub fn remote_prefixes(&self) -> &[RemotePrefix] {
        &self.remote_prefixes
    }

    /// CIDRs of every attached network
    pub fn attached_cidrs(&self) -> Vec<Ipv4Net> {
        self.attachments.iter().map(|attached| attached.cidr).collect()
    }

    /// Attach `network`, or return its existing attachment
    pub fn attach(&mut self, graph: &mut GraphBuilder, network: &NetworkBlueprint) -> Result<ResourceId, PlanError> {
        if let Some(existing) = self.attachment_for(network.network_id()) {
            debug!("{} already attached to {}", network.network_id(), self.id);
            return Ok(existing.attachment.clone());
        }
        self.attach_exclusive(graph, network)
    }

    /// Attach `network`, failing if it is already attached
    pub fn attach_exclusive(
        &mut self,
        graph: &mut GraphBuilder,
        network: &NetworkBlueprint,
    ) -> Result<ResourceId, PlanError> {
        let network_id = network.network_id();
        if self.attachment_for(network_id).is_some() {
            return Err(PlanError::DuplicateAttachment {
                hub: self.id.to_string(),
                network: network_id.to_string(),
            });
        }

        let subnets = network.private_subnet_ids();
        if subnets.is_empty() {
            return Err(PlanError::DanglingReference {
                component: self.id.to_string(),
                reference: network_id.to_string(),
                reason: "network has no private subnet to attach".to_string(),
            });
        }

        let attachment = graph.add(
            &self.region,
            self.id.child(format!("attachment/{}", network_id)),
            Resource::HubAttachment {
                hub: self.id.clone(),
                network: network_id.clone(),
                subnets: subnets.clone(),
            },
        )?;
        graph.add(
            &self.region,
            attachment.child("association"),
            Resource::HubRouteTableAssociation {
                route_table: self.route_table.clone(),
                attachment: attachment.clone(),
            },
        )?;
        graph.add(
            &self.region,
            attachment.child("propagation"),
            Resource::HubRouteTablePropagation {
                route_table: self.route_table.clone(),
                attachment: attachment.clone(),
            },
        )?;

        if let Some(domain) = &self.multicast_domain {
            for subnet in &subnets {
                graph.add(
                    &self.region,
                    domain.child(format!("association/{}", subnet)),
                    Resource::MulticastAssociation {
                        domain: domain.clone(),
                        attachment: attachment.clone(),
                        subnet: subnet.clone(),
                    },
                )?;
            }
        }

        let route_tables = network
            .subnets()
            .iter()
            .map(|subnet| subnet.route_table.clone())
            .collect();

        info!("Attached {} to {} over {} subnet(s)", network_id, self.id, subnets.len());
        self.attachments.push(AttachedNetwork {
            region: network.region().to_string(),
            network: network_id.clone(),
            cidr: network.address_block(),
            attachment: attachment.clone(),
            subnets,
            route_tables,
        });
        Ok(attachment)
    }

    fn attachment_for(&self, network: &ResourceId) -> Option<&AttachedNetwork> {
        self.attachments.iter().find(|attached| &attached.network == network)
    }

    /// Record a CIDR reachable over a peering link
    ///
    /// Returns `false` when the prefix is already known.
    pub fn learn_remote_prefix(&mut self, prefix: RemotePrefix) -> bool {
        if self.remote_prefixes.iter().any(|known| known.cidr == prefix.cidr) {
            return false;
        }
        debug!("{} learned {} from {} via {}", self.id, prefix.cidr, prefix.region, prefix.via);
        self.remote_prefixes.push(prefix);
        true
    }

    /// Install every missing route, returning how many were added
    ///
    /// Each attached network's subnets route toward every other attached
    /// network and every remote prefix through this hub. Remote prefixes
    /// also get a static route in the hub route table toward their peering
    /// attachment.
    pub fn propagate_routes(&self, graph: &mut GraphBuilder) -> Result<usize, PlanError> {
        let mut added = 0;

        for local in &self.attachments {
            let destinations = self
                .attachments
                .iter()
                .filter(|other| other.network != local.network)
                .map(|other| other.cidr)
                .chain(self.remote_prefixes.iter().map(|prefix| prefix.cidr));

            for destination in destinations {
                if blocks_overlap(&local.cidr, &destination) {
                    debug!("{}: skipping {} which overlaps {}", self.id, destination, local.cidr);
                    continue;
                }
                for route_table in &local.route_tables {
                    if self.install_subnet_route(graph, local, route_table, destination)? {
                        added += 1;
                    }
                }
            }
        }

        for prefix in &self.remote_prefixes {
            let id = self.route_table.child(format!("route/{}", cidr_slug(&prefix.cidr)));
            if graph.contains(&id) {
                continue;
            }
            graph.add_after(
                &self.region,
                id,
                Resource::HubRoute {
                    route_table: self.route_table.clone(),
                    destination: prefix.cidr,
                    attachment: prefix.via.clone(),
                },
                &[&prefix.after],
            )?;
            added += 1;
        }

        if added > 0 {
            info!("Propagated {} route(s) through {}", added, self.id);
        }
        Ok(added)
    }

    fn install_subnet_route(
        &self,
        graph: &mut GraphBuilder,
        local: &AttachedNetwork,
        route_table: &ResourceId,
        destination: Ipv4Net,
    ) -> Result<bool, PlanError> {
        let id = route_table.child(format!("route/{}", cidr_slug(&destination)));
        if graph.contains(&id) {
            return Ok(false);
        }
        graph.add_after(
            &local.region,
            id,
            Resource::Route {
                route_table: route_table.clone(),
                destination,
                target: RouteTarget::Hub(self.id.clone()),
            },
            &[&local.attachment],
        )?;
        Ok(true)
    }

    pub fn outputs(&self) -> HubOutputs {
        HubOutputs {
            hub_id: self.id.clone(),
            route_table_id: self.route_table.clone(),
            multicast_domain_id: self.multicast_domain.clone(),
            attachment_ids: self
                .attachments
                .iter()
                .map(|attached| attached.attachment.clone())
                .collect(),
        }
    }
}
