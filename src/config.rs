//! Topology configuration.
//!
//! Typed structures for the YAML topology file: regions and their subnet
//! layouts, peering pairs, remote access entries and the acceptance policy.
//! [`TopologyConfig::validate`] checks everything the planner relies on
//! before any resource is planned.

use crate::peering::AcceptancePolicy;
use crate::utils::validation::{validate_peering_fanout, validate_region_name};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Purpose of a subnet inside a network
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SubnetPurpose {
    /// Routed to the internet gateway, hosts may carry public addresses
    Public,
    /// Reachable only through the hub, NAT or VPN
    Private,
}

impl SubnetPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetPurpose::Public => "public",
            SubnetPurpose::Private => "private",
        }
    }
}

/// How peering links between regional hubs are chosen
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PeeringTopology {
    /// Every pair of regions is linked, the earlier region requests
    #[default]
    FullMesh,
    /// Only the links listed under `peering.links`
    Explicit,
    /// No inter-region links
    Disabled,
}

/// Top-level topology configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopologyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub peering: PeeringConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_access: Vec<RemoteAccessConfig>,
    #[serde(default)]
    pub acceptance: AcceptancePolicy,
}

impl TopologyConfig {
    /// Validate the configuration
    ///
    /// Every region reference is resolved here, so planning never has to
    /// deal with a region nobody declared.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.general.name.trim().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "name cannot be empty".to_string(),
            ));
        }

        if self.regions.is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "at least one region must be declared".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut primaries = 0;
        for region in &self.regions {
            region.validate()?;
            if !seen.insert(region.name.as_str()) {
                return Err(ValidationError::InvalidRegion {
                    region: region.name.clone(),
                    reason: "region is declared more than once".to_string(),
                });
            }
            if region.primary {
                primaries += 1;
            }
        }

        if primaries > 1 {
            return Err(ValidationError::InvalidGeneral(format!(
                "{} regions are marked primary, at most one is allowed",
                primaries
            )));
        }

        self.validate_peering(&seen)?;
        self.validate_remote_access(&seen)?;

        if self.acceptance.max_attempts == 0 {
            return Err(ValidationError::InvalidAcceptance(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_peering(&self, regions: &HashSet<&str>) -> Result<(), ValidationError> {
        match self.peering.topology {
            PeeringTopology::Explicit => {
                if self.peering.links.is_empty() {
                    return Err(ValidationError::InvalidPeering(
                        "explicit peering requires at least one link".to_string(),
                    ));
                }
            }
            PeeringTopology::FullMesh | PeeringTopology::Disabled => {
                if !self.peering.links.is_empty() {
                    return Err(ValidationError::InvalidPeering(format!(
                        "links are only used with explicit peering, topology is {:?}",
                        self.peering.topology
                    )));
                }
            }
        }

        let mut pairs = HashSet::new();
        for link in &self.peering.links {
            for region in [&link.requester, &link.accepter] {
                if !regions.contains(region.as_str()) {
                    return Err(ValidationError::UnknownRegion {
                        context: "peering link".to_string(),
                        region: region.clone(),
                    });
                }
            }
            if link.requester == link.accepter {
                return Err(ValidationError::InvalidPeering(format!(
                    "{} cannot peer with itself",
                    link.requester
                )));
            }
            let key = if link.requester < link.accepter {
                (link.requester.as_str(), link.accepter.as_str())
            } else {
                (link.accepter.as_str(), link.requester.as_str())
            };
            if !pairs.insert(key) {
                return Err(ValidationError::InvalidPeering(format!(
                    "{} and {} are linked more than once",
                    link.requester, link.accepter
                )));
            }
        }

        let links = self.peering.pairs(&self.regions);
        validate_peering_fanout(&links).map_err(ValidationError::InvalidPeering)
    }

    fn validate_remote_access(&self, regions: &HashSet<&str>) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for access in &self.remote_access {
            if !regions.contains(access.region.as_str()) {
                return Err(ValidationError::UnknownRegion {
                    context: "remote access".to_string(),
                    region: access.region.clone(),
                });
            }
            if !seen.insert(access.region.as_str()) {
                return Err(ValidationError::InvalidRemoteAccess {
                    region: access.region.clone(),
                    reason: "only one remote access link per region is supported".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Look up a region by name
    pub fn region(&self, name: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|region| region.name == name)
    }

    /// Regions that take part in at least one peering or remote access link
    pub fn transit_regions(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self
            .peering
            .pairs(&self.regions)
            .into_iter()
            .flat_map(|pair| [pair.requester, pair.accepter])
            .collect();
        names.extend(self.remote_access.iter().map(|access| access.region.clone()));
        names
    }
}

/// Settings shared by all regions
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Account that owns the peer side of every link; `None` means the requesting account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default = "default_hub_asn")]
    pub hub_asn: u32,
    #[serde(default = "default_true")]
    pub multicast: bool,
}

/// One region's network and hub
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegionConfig {
    pub name: String,
    pub address_block: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default = "default_availability_zones")]
    pub availability_zones: u8,
    /// Subnet layout, repeated in every availability zone
    #[serde(default = "default_subnet_layout")]
    pub subnets: Vec<SubnetConfig>,
    #[serde(default = "default_probe")]
    pub probe: Option<ProbeConfig>,
    /// Overrides `general.hub_asn` for this region's hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_asn: Option<u32>,
    #[serde(default = "default_true")]
    pub egress: bool,
}

impl RegionConfig {
    /// A region with the default layout, probe and egress
    pub fn new(name: &str, address_block: &str) -> Self {
        Self {
            name: name.to_string(),
            address_block: address_block.to_string(),
            primary: false,
            availability_zones: default_availability_zones(),
            subnets: default_subnet_layout(),
            probe: default_probe(),
            hub_asn: None,
            egress: true,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidRegion {
            region: self.name.clone(),
            reason,
        };

        validate_region_name(&self.name).map_err(invalid)?;

        if self.address_block.trim().is_empty() {
            return Err(invalid("address_block cannot be empty".to_string()));
        }
        if !(1..=MAX_AVAILABILITY_ZONES).contains(&self.availability_zones) {
            return Err(invalid(format!(
                "availability_zones must be between 1 and {}, got {}",
                MAX_AVAILABILITY_ZONES, self.availability_zones
            )));
        }
        if self.subnets.is_empty() {
            return Err(invalid("subnet layout cannot be empty".to_string()));
        }
        if let Some(subnet) = self.subnets.iter().find(|s| s.mask == 0 || s.mask > 32) {
            return Err(invalid(format!("subnet mask /{} is out of range", subnet.mask)));
        }
        Ok(())
    }

    /// Availability zone names, `us-east-1a`, `us-east-1b`, ...
    pub fn zone_names(&self) -> Vec<String> {
        (b'a'..=b'z')
            .take(usize::from(self.availability_zones))
            .map(|letter| format!("{}{}", self.name, char::from(letter)))
            .collect()
    }
}

/// One entry of a region's subnet layout
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SubnetConfig {
    pub purpose: SubnetPurpose,
    pub mask: u8,
}

/// Reachability probe instance
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_machine_image")]
    pub machine_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
}

/// Peering links between regional hubs
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PeeringConfig {
    #[serde(default)]
    pub topology: PeeringTopology,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<PeeringPair>,
}

impl PeeringConfig {
    /// Expand the configured topology into concrete requester/accepter pairs
    pub fn pairs(&self, regions: &[RegionConfig]) -> Vec<PeeringPair> {
        match self.topology {
            PeeringTopology::FullMesh => {
                let mut pairs = Vec::new();
                for (i, requester) in regions.iter().enumerate() {
                    for accepter in &regions[i + 1..] {
                        pairs.push(PeeringPair {
                            requester: requester.name.clone(),
                            accepter: accepter.name.clone(),
                        });
                    }
                }
                pairs
            }
            PeeringTopology::Explicit => self.links.clone(),
            PeeringTopology::Disabled => Vec::new(),
        }
    }
}

/// A single requested link, created from the requester's region
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PeeringPair {
    pub requester: String,
    pub accepter: String,
}

/// On-premises VPN attachment into one region
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteAccessConfig {
    pub region: String,
    /// Placeholder until the real on-premises address is known
    #[serde(default = "default_peer_address")]
    pub peer_address: Ipv4Addr,
    #[serde(default = "default_routed_cidr")]
    pub routed_cidr: String,
    #[serde(default = "default_customer_asn")]
    pub customer_asn: u32,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid region {region}: {reason}")]
    InvalidRegion { region: String, reason: String },
    #[error("Unknown region '{region}' referenced by {context}")]
    UnknownRegion { context: String, region: String },
    #[error("Invalid peering configuration: {0}")]
    InvalidPeering(String),
    #[error("Invalid remote access for {region}: {reason}")]
    InvalidRemoteAccess { region: String, reason: String },
    #[error("Invalid acceptance policy: {0}")]
    InvalidAcceptance(String),
}

pub const MAX_AVAILABILITY_ZONES: u8 = 6;

fn default_name() -> String {
    "transitmesh".to_string()
}

fn default_hub_asn() -> u32 {
    crate::hub::DEFAULT_HUB_ASN
}

fn default_true() -> bool {
    true
}

fn default_availability_zones() -> u8 {
    2
}

fn default_subnet_layout() -> Vec<SubnetConfig> {
    vec![
        SubnetConfig { purpose: SubnetPurpose::Public, mask: 24 },
        SubnetConfig { purpose: SubnetPurpose::Private, mask: 24 },
    ]
}

fn default_probe() -> Option<ProbeConfig> {
    Some(ProbeConfig::default())
}

fn default_instance_type() -> String {
    "t3.micro".to_string()
}

fn default_machine_image() -> String {
    "amazon-linux-2".to_string()
}

fn default_peer_address() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_routed_cidr() -> String {
    "10.0.0.0/8".to_string()
}

fn default_customer_asn() -> u32 {
    65000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            account_id: None,
            hub_asn: default_hub_asn(),
            multicast: true,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            instance_type: default_instance_type(),
            machine_image: default_machine_image(),
            key_name: None,
        }
    }
}
