//! Peering links between regional hubs.

use super::acceptance::{
    AcceptancePolicy, AcceptanceReport, AcceptanceRequest, AcceptanceStatus, AcceptanceTask, Approver,
    LifecycleEvent, Sleeper,
};
use crate::error::{AcceptanceError, PlanError};
use crate::graph::{GraphBuilder, Resource, ResourceId};
use crate::hub::RoutingHub;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Permissions granted to the acceptance handler
pub const HANDLER_PERMISSIONS: [&str; 2] = ["peering-attachment:accept", "peering-attachment:describe"];

/// Lifecycle of a peering link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Requested,
    PendingAcceptance,
    Accepted,
    Failed,
}

impl LinkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Accepted | LinkState::Failed)
    }

    /// State reached by applying `event`
    pub fn next(self, event: LinkEvent) -> Result<LinkState, TransitionError> {
        match (self, event) {
            (LinkState::Requested, LinkEvent::Dispatch) => Ok(LinkState::PendingAcceptance),
            (LinkState::PendingAcceptance, LinkEvent::Accept) => Ok(LinkState::Accepted),
            (LinkState::PendingAcceptance, LinkEvent::Fail) => Ok(LinkState::Failed),
            (state, event) if state.is_terminal() => Err(TransitionError::Terminal { state, event }),
            (state, event) => Err(TransitionError::Invalid { state, event }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Acceptance task handed the link
    Dispatch,
    Accept,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("link is {state:?} and cannot handle {event:?}")]
    Terminal { state: LinkState, event: LinkEvent },
    #[error("{event:?} is not valid while the link is {state:?}")]
    Invalid { state: LinkState, event: LinkEvent },
}

/// Bidirectional link between two hubs in distinct regions
#[derive(Debug, Clone)]
pub struct PeeringLink {
    id: ResourceId,
    requester_region: String,
    accepter_region: String,
    requester_hub: ResourceId,
    accepter_hub: ResourceId,
    handler: ResourceId,
    acceptance: ResourceId,
    state: LinkState,
    attempts: u32,
    failure: Option<AcceptanceError>,
}

impl PeeringLink {
    /// Plan the peering attachment and its acceptance, then dispatch it
    pub fn request(
        graph: &mut GraphBuilder,
        requester: &RoutingHub,
        accepter: &RoutingHub,
        peer_account: Option<&str>,
        policy: &AcceptancePolicy,
    ) -> Result<Self, PlanError> {
        let region = requester.region();
        let id = ResourceId::new(region, format!("peering/{}", accepter.region()));

        if region == accepter.region() {
            return Err(PlanError::InvalidPeering {
                link: id.to_string(),
                reason: "both hubs are in the same region".to_string(),
            });
        }
        for hub in [requester.id(), accepter.id()] {
            if !graph.contains(hub) {
                return Err(PlanError::IncompleteTopology {
                    component: id.to_string(),
                    missing: hub.to_string(),
                });
            }
        }

        graph.add(
            region,
            id.clone(),
            Resource::PeeringAttachment {
                hub: requester.id().clone(),
                peer_hub: accepter.id().clone(),
                peer_region: accepter.region().to_string(),
                peer_account: peer_account.map(str::to_string),
            },
        )?;
        let handler = graph.add(
            region,
            id.child("acceptance-handler"),
            Resource::AcceptanceHandler {
                max_attempts: policy.max_attempts,
                backoff_secs: policy.backoff.as_secs(),
                timeout_secs: policy.attempt_timeout.as_secs(),
                permissions: HANDLER_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
            },
        )?;
        let acceptance = graph.add(
            region,
            id.child("acceptance"),
            Resource::PeeringAcceptance {
                handler: handler.clone(),
                link: id.clone(),
                target_region: accepter.region().to_string(),
            },
        )?;

        let mut link = Self {
            id,
            requester_region: region.to_string(),
            accepter_region: accepter.region().to_string(),
            requester_hub: requester.id().clone(),
            accepter_hub: accepter.id().clone(),
            handler,
            acceptance,
            state: LinkState::Requested,
            attempts: 0,
            failure: None,
        };
        link.apply(LinkEvent::Dispatch)
            .map_err(|err| PlanError::InvalidPeering {
                link: link.id.to_string(),
                reason: err.to_string(),
            })?;

        info!("Requested peering {} ({} -> {})", link.id, link.requester_region, link.accepter_region);
        Ok(link)
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn requester_region(&self) -> &str {
        &self.requester_region
    }

    pub fn accepter_region(&self) -> &str {
        &self.accepter_region
    }

    pub fn requester_hub(&self) -> &ResourceId {
        &self.requester_hub
    }

    pub fn accepter_hub(&self) -> &ResourceId {
        &self.accepter_hub
    }

    pub fn handler(&self) -> &ResourceId {
        &self.handler
    }

    /// Resource the engine creates once the link is accepted
    pub fn acceptance(&self) -> &ResourceId {
        &self.acceptance
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Attempts spent by the last acceptance run
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn failure(&self) -> Option<&AcceptanceError> {
        self.failure.as_ref()
    }

    pub fn apply(&mut self, event: LinkEvent) -> Result<LinkState, TransitionError> {
        let next = self.state.next(event)?;
        debug!("{}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        Ok(next)
    }

    /// Input of the acceptance task for this link
    pub fn acceptance_request(&self, lifecycle_event: LifecycleEvent) -> AcceptanceRequest {
        AcceptanceRequest {
            link_id: self.id.clone(),
            target_region: self.accepter_region.clone(),
            lifecycle_event,
        }
    }

    /// Move the link to the terminal state matching `report`
    pub fn record(&mut self, report: &AcceptanceReport) -> Result<LinkState, TransitionError> {
        let event = match report.status {
            AcceptanceStatus::Success => LinkEvent::Accept,
            AcceptanceStatus::Failure => LinkEvent::Fail,
        };
        let state = self.apply(event)?;
        self.attempts = report.attempts;
        if state == LinkState::Failed {
            self.failure = report.clone().into_result().err();
        }
        Ok(state)
    }

    /// Run the acceptance task to completion for this link
    ///
    /// A link that already reached a terminal state keeps its outcome.
    pub fn accept<A: Approver, S: Sleeper>(&mut self, task: &AcceptanceTask<A, S>) -> Result<(), AcceptanceError> {
        if !self.state.is_terminal() {
            let report = task.run(&self.acceptance_request(LifecycleEvent::Create));
            if let Err(err) = self.record(&report) {
                return Err(AcceptanceError::PeeringAcceptanceFailure {
                    link_id: self.id.to_string(),
                    attempts: report.attempts,
                    reason: err.to_string(),
                });
            }
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
