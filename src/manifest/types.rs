//! Manifest and output type definitions.
//!
//! This module contains the documents handed over at the provisioning
//! boundary: the resource manifest, the declared outputs, and the
//! acceptance summary written after links have been driven to a terminal
//! state.

use crate::graph::{Dependency, ResourceId, ResourceNode};
use crate::hub::HubOutputs;
use crate::network::NetworkOutputs;
use crate::peering::{AcceptanceReport, LinkState};
use crate::remote_access::RemoteAccessOutputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Manifest
// ============================================================================

/// Resource graph as consumed by the provisioning engine.
///
/// `resources` is in a valid creation order; `dependencies` lists every
/// "must exist before" edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: ManifestMetadata,
    pub resources: Vec<ResourceNode>,
    pub dependencies: Vec<Dependency>,
}

/// Provenance of a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Topology name from `general.name`
    pub name: String,
    /// Tool and version that produced the manifest
    pub generator: String,
    pub generated_at: DateTime<Utc>,
    /// Regions in configuration order
    pub regions: Vec<String>,
    pub resource_count: usize,
    pub dependency_count: usize,
}

// ============================================================================
// Outputs
// ============================================================================

/// State of one peering link as reported in the outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringOutputs {
    pub link_id: ResourceId,
    pub requester_region: String,
    pub accepter_region: String,
    pub requester_hub: ResourceId,
    pub accepter_hub: ResourceId,
    pub state: LinkState,
}

/// Identifiers declared for operators and downstream stacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlanOutputs {
    /// Keyed by region
    pub networks: BTreeMap<String, NetworkOutputs>,
    /// Keyed by region
    pub hubs: BTreeMap<String, HubOutputs>,
    pub peering_links: Vec<PeeringOutputs>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub remote_access: Vec<RemoteAccessOutputs>,
}

// ============================================================================
// Acceptance
// ============================================================================

/// Outcome of driving every peering link through acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceSummary {
    pub accepted: usize,
    pub failed: usize,
    pub reports: Vec<AcceptanceReport>,
}

impl AcceptanceSummary {
    pub fn from_reports(reports: Vec<AcceptanceReport>) -> Self {
        let accepted = reports.iter().filter(|report| report.is_success()).count();
        Self {
            accepted,
            failed: reports.len() - accepted,
            reports,
        }
    }

    pub fn all_accepted(&self) -> bool {
        self.failed == 0
    }
}
