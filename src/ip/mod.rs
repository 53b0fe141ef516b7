//! IP address space management module.
//!
//! This module parses and carves CIDR blocks and keeps the per-plan registry
//! that guarantees no two networks share address space.

pub mod cidr;
pub mod registry;

// Re-export commonly used types
pub use cidr::{blocks_overlap, carve_subnets, cidr_slug, parse_block};
pub use registry::{AddressRegistry, BlockClaim};
