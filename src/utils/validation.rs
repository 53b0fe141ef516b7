//! Configuration validation utilities.
//!
//! This module provides the naming, fan-out and numbering checks shared by
//! configuration validation and the planner.

use crate::config::PeeringPair;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Peering attachments a single hub can carry
pub const MAX_PEERINGS_PER_HUB: usize = 50;

/// Match: "us-east-1", "ap-southeast-2", "us-gov-west-1"
static REGION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("Invalid region name regex")
});

/// Validate a region name
///
/// # Examples
/// ```
/// use transitmesh::utils::validation::validate_region_name;
///
/// assert!(validate_region_name("eu-west-1").is_ok());
/// assert!(validate_region_name("eu_west").is_err());
/// ```
pub fn validate_region_name(name: &str) -> Result<(), String> {
    if REGION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(format!(
            "'{}' is not a region name (expected something like 'us-east-1')",
            name
        ))
    }
}

/// Validate that no hub takes part in more peering links than it can carry
///
/// A full mesh over n regions gives every hub n - 1 links, so this is what
/// bounds the size of a full mesh.
pub fn validate_peering_fanout(pairs: &[PeeringPair]) -> Result<(), String> {
    let mut per_region: HashMap<&str, usize> = HashMap::new();
    for pair in pairs {
        *per_region.entry(pair.requester.as_str()).or_default() += 1;
        *per_region.entry(pair.accepter.as_str()).or_default() += 1;
    }

    let mut crowded: Vec<(&str, usize)> = per_region
        .into_iter()
        .filter(|(_, count)| *count > MAX_PEERINGS_PER_HUB)
        .collect();
    crowded.sort();

    match crowded.first() {
        Some((region, count)) => Err(format!(
            "hub in {} would carry {} peering links, the limit is {}",
            region, count, MAX_PEERINGS_PER_HUB
        )),
        None => Ok(()),
    }
}

/// Check whether an ASN is reserved for private use (RFC 6996)
///
/// # Examples
/// ```
/// use transitmesh::utils::validation::is_private_asn;
///
/// assert!(is_private_asn(64512));
/// assert!(is_private_asn(4200000000));
/// assert!(!is_private_asn(15169));
/// ```
pub fn is_private_asn(asn: u32) -> bool {
    (64512..=65534).contains(&asn) || (4_200_000_000..=4_294_967_294).contains(&asn)
}
