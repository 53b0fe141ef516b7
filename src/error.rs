//! Error types for topology planning and peering acceptance.
//!
//! Planning errors are raised synchronously while the resource graph is being
//! built and abort the whole plan. Acceptance errors are raised later, per
//! peering link, once the acceptance task gives up.

use crate::config::ValidationError;

/// Errors raised while planning a topology.
///
/// Every variant names the component that failed and the invariant it broke,
/// so the message can be shown to an operator as-is.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("{component}: invalid address space: {reason}")]
    InvalidAddressSpace { component: String, reason: String },

    #[error("{component}: address block {block} overlaps {other_block} allocated to {other_component}")]
    AllocationConflict {
        component: String,
        block: String,
        other_component: String,
        other_block: String,
    },

    #[error("{hub}: network {network} is already attached")]
    DuplicateAttachment { hub: String, network: String },

    #[error("{component}: dangling reference to {reference}: {reason}")]
    DanglingReference {
        component: String,
        reference: String,
        reason: String,
    },

    #[error("{component}: incomplete topology, {missing} has not been planned")]
    IncompleteTopology { component: String, missing: String },

    #[error("{hub}: ASN {asn} is not a private-use ASN")]
    InvalidAsn { hub: String, asn: u32 },

    #[error("{link}: invalid peering: {reason}")]
    InvalidPeering { link: String, reason: String },

    #[error("resource {id} is declared more than once")]
    DuplicateResource { id: String },

    #[error("invalid topology configuration: {0}")]
    Config(#[from] ValidationError),
}

/// Errors reported by the asynchronous acceptance of a peering link.
///
/// The link resource itself was created successfully; only its activation
/// failed, so this is kept apart from [`PlanError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcceptanceError {
    #[error("peering link {link_id} was not accepted after {attempts} attempt(s): {reason}")]
    PeeringAcceptanceFailure {
        link_id: String,
        attempts: u32,
        reason: String,
    },
}
