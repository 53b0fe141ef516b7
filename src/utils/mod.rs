//! Shared utilities: naming, fan-out and ASN validation.

pub mod validation;

pub use validation::{is_private_asn, validate_peering_fanout, validate_region_name};
