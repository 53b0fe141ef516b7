//! Address block registry.
//!
//! This file keeps track of the address blocks claimed by networks in one
//! plan, so two networks can never be given overlapping space.

use super::cidr::blocks_overlap;
use crate::error::PlanError;
use ipnet::Ipv4Net;

/// A block claimed by one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockClaim {
    pub owner: String,
    pub block: Ipv4Net,
}

/// Registry of every address block claimed during a planning run
#[derive(Debug, Default)]
pub struct AddressRegistry {
    claims: Vec<BlockClaim>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `block` for `owner`
    ///
    /// Claiming the exact same block again for the same owner is a no-op;
    /// any other overlap is an allocation conflict.
    pub fn claim(&mut self, owner: &str, block: Ipv4Net) -> Result<(), PlanError> {
        if let Some(existing) = self.find_overlap(&block) {
            if existing.owner == owner && existing.block == block {
                return Ok(());
            }
            return Err(PlanError::AllocationConflict {
                component: owner.to_string(),
                block: block.to_string(),
                other_component: existing.owner.clone(),
                other_block: existing.block.to_string(),
            });
        }

        log::debug!("Claimed {} for {}", block, owner);
        self.claims.push(BlockClaim {
            owner: owner.to_string(),
            block,
        });
        Ok(())
    }

    /// First claim overlapping `block`, in claim order
    pub fn find_overlap(&self, block: &Ipv4Net) -> Option<&BlockClaim> {
        self.claims.iter().find(|claim| blocks_overlap(&claim.block, block))
    }

    /// Get all claims for debugging
    pub fn claims(&self) -> &[BlockClaim] {
        &self.claims
    }
}
