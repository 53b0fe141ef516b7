//! Regional network module.
//!
//! Each region gets one isolated network with public and private subnets,
//! egress gateways, a reachability security policy and an optional probe host.

pub mod blueprint;

pub use crate::config::SubnetPurpose;
pub use blueprint::{NetworkBlueprint, NetworkOutputs, PlannedSubnet, MANAGEMENT_PORT};
