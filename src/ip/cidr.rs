//! CIDR parsing and subnet carving.
//!
//! Subnets are carved first-fit from the start of a network's address block,
//! each aligned to its own size, so a layout never overlaps itself.

use crate::error::PlanError;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Parse an address block, rejecting zero-length prefixes and host bits
pub fn parse_block(component: &str, text: &str) -> Result<Ipv4Net, PlanError> {
    let invalid = |reason: String| PlanError::InvalidAddressSpace {
        component: component.to_string(),
        reason,
    };

    let block: Ipv4Net = text
        .trim()
        .parse()
        .map_err(|_| invalid(format!("'{}' is not an IPv4 CIDR block", text)))?;

    if block.prefix_len() == 0 {
        return Err(invalid(format!("{} has a zero-length prefix", block)));
    }
    if block.addr() != block.network() {
        return Err(invalid(format!(
            "{} has host bits set, did you mean {}?",
            block,
            block.trunc()
        )));
    }
    Ok(block)
}

/// Check whether two blocks share at least one address
pub fn blocks_overlap(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Carve consecutive subnets of the given prefix lengths out of `block`
///
/// Each subnet starts at the first address after the previous one that is
/// aligned to its own size.
pub fn carve_subnets(component: &str, block: Ipv4Net, masks: &[u8]) -> Result<Vec<Ipv4Net>, PlanError> {
    let invalid = |reason: String| PlanError::InvalidAddressSpace {
        component: component.to_string(),
        reason,
    };

    let block_end = u64::from(u32::from(block.broadcast()));
    let mut cursor = u64::from(u32::from(block.network()));
    let mut subnets = Vec::with_capacity(masks.len());

    for &mask in masks {
        if mask < block.prefix_len() || mask > 32 {
            return Err(invalid(format!("a /{} subnet cannot fit in {}", mask, block)));
        }

        let size = 1u64 << (32 - mask);
        let start = cursor.div_ceil(size) * size;
        let end = start + size - 1;
        if end > block_end {
            return Err(invalid(format!(
                "{} subnet(s) with masks {:?} do not fit in {}",
                masks.len(),
                masks,
                block
            )));
        }

        let subnet = Ipv4Net::new(Ipv4Addr::from(start as u32), mask)
            .map_err(|e| invalid(format!("cannot build /{} subnet: {}", mask, e)))?;
        subnets.push(subnet);
        cursor = end + 1;
    }

    Ok(subnets)
}

/// Render a block so it can be used inside a resource identifier
pub fn cidr_slug(block: &Ipv4Net) -> String {
    format!("{}-{}", block.network(), block.prefix_len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(text: &str) -> Ipv4Net {
        text.parse().unwrap()
    }

    #[test]
    fn test_parse_block() {
        assert_eq!(parse_block("n", "172.16.0.0/16").unwrap(), net("172.16.0.0/16"));
        assert_eq!(parse_block("n", " 10.0.0.0/8 ").unwrap(), net("10.0.0.0/8"));

        assert!(matches!(
            parse_block("n", "0.0.0.0/0"),
            Err(PlanError::InvalidAddressSpace { .. })
        ));
        assert!(parse_block("n", "172.16.0.1/16").is_err());
        assert!(parse_block("n", "172.16.0.0").is_err());
        assert!(parse_block("n", "not-a-cidr").is_err());
    }

    #[test]
    fn test_blocks_overlap() {
        assert!(blocks_overlap(&net("172.16.0.0/16"), &net("172.16.4.0/24")));
        assert!(blocks_overlap(&net("172.16.4.0/24"), &net("172.16.0.0/12")));
        assert!(!blocks_overlap(&net("172.16.0.0/16"), &net("172.17.0.0/16")));
        assert!(!blocks_overlap(&net("10.0.0.0/8"), &net("172.16.0.0/16")));
    }

    #[test]
    fn test_carve_default_layout() {
        let subnets = carve_subnets("n", net("172.16.0.0/16"), &[24, 24, 24, 24]).unwrap();
        assert_eq!(
            subnets,
            vec![
                net("172.16.0.0/24"),
                net("172.16.1.0/24"),
                net("172.16.2.0/24"),
                net("172.16.3.0/24"),
            ]
        );
    }

    #[test]
    fn test_carve_aligns_mixed_sizes() {
        let subnets = carve_subnets("n", net("10.1.0.0/16"), &[26, 24, 28]).unwrap();
        assert_eq!(
            subnets,
            vec![net("10.1.0.0/26"), net("10.1.1.0/24"), net("10.1.2.0/28")]
        );
    }

    #[test]
    fn test_carve_rejects_overflow() {
        // A /24 holds exactly two /25s
        assert!(carve_subnets("n", net("192.168.1.0/24"), &[25, 25]).is_ok());
        assert!(matches!(
            carve_subnets("n", net("192.168.1.0/24"), &[25, 25, 25]),
            Err(PlanError::InvalidAddressSpace { .. })
        ));
        // Larger than the block itself
        assert!(carve_subnets("n", net("192.168.1.0/24"), &[23]).is_err());
    }

    #[test]
    fn test_carve_at_top_of_address_space() {
        let subnets = carve_subnets("n", net("255.255.255.0/24"), &[25, 25]).unwrap();
        assert_eq!(subnets[1], net("255.255.255.128/25"));
    }

    #[test]
    fn test_cidr_slug() {
        assert_eq!(cidr_slug(&net("172.17.0.0/16")), "172.17.0.0-16");
    }
}
