//! Cross-region peering module.
//!
//! A [`PeeringLink`] joins two hubs in distinct regions. Creating it only
//! requests the link; the [`AcceptanceTask`] later drives it to `Accepted`
//! or `Failed`.

pub mod acceptance;
pub mod link;

pub use acceptance::{
    AcceptancePolicy, AcceptanceReport, AcceptanceRequest, AcceptanceStatus, AcceptanceTask, ApprovalError,
    Approver, LifecycleEvent, Sleeper, ThreadSleeper,
};
pub use link::{LinkEvent, LinkState, PeeringLink, TransitionError, HANDLER_PERMISSIONS};
