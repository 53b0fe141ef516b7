//! Peering acceptance task.
//!
//! Acceptance runs out-of-band relative to planning: the engine creates the
//! peering attachment, then invokes the task with the link identifier and the
//! accepter region. The task calls the approval endpoint with a fixed backoff
//! between attempts and reports a single outcome.

use crate::error::AcceptanceError;
use crate::graph::ResourceId;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Retry policy of the acceptance task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptancePolicy {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between two attempts, never after the last one
    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,
    /// Upper bound on one attempt, enforced by the host running the task
    #[serde(default = "default_attempt_timeout", with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

/// Lifecycle event the task is invoked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Create,
    Update,
    Delete,
}

/// Input of one acceptance invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceRequest {
    pub link_id: ResourceId,
    pub target_region: String,
    pub lifecycle_event: LifecycleEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptanceStatus {
    Success,
    Failure,
}

/// Outcome of one acceptance invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceReport {
    pub link_id: ResourceId,
    pub status: AcceptanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Calls made to the approval endpoint
    pub attempts: u32,
}

impl AcceptanceReport {
    pub fn is_success(&self) -> bool {
        self.status == AcceptanceStatus::Success
    }

    pub fn into_result(self) -> Result<(), AcceptanceError> {
        match self.status {
            AcceptanceStatus::Success => Ok(()),
            AcceptanceStatus::Failure => Err(AcceptanceError::PeeringAcceptanceFailure {
                link_id: self.link_id.to_string(),
                attempts: self.attempts,
                reason: self.reason.unwrap_or_else(|| "unknown failure".to_string()),
            }),
        }
    }
}

/// Error returned by the approval endpoint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    /// Worth another attempt after the backoff
    #[error("retryable: {0}")]
    Retryable(String),
    /// Ends the task at once
    #[error("terminal: {0}")]
    Terminal(String),
}

/// Endpoint that approves a pending peering attachment
pub trait Approver {
    fn approve(&self, link_id: &ResourceId, target_region: &str) -> Result<(), ApprovalError>;
}

impl<F> Approver for F
where
    F: Fn(&ResourceId, &str) -> Result<(), ApprovalError>,
{
    fn approve(&self, link_id: &ResourceId, target_region: &str) -> Result<(), ApprovalError> {
        self(link_id, target_region)
    }
}

/// Waits out the backoff between attempts
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Retried acceptance of one peering link per invocation
#[derive(Debug, Clone)]
pub struct AcceptanceTask<A, S = ThreadSleeper> {
    policy: AcceptancePolicy,
    approver: A,
    sleeper: S,
}

impl<A: Approver> AcceptanceTask<A, ThreadSleeper> {
    pub fn new(policy: AcceptancePolicy, approver: A) -> Self {
        Self::with_sleeper(policy, approver, ThreadSleeper)
    }
}

impl<A: Approver, S: Sleeper> AcceptanceTask<A, S> {
    pub fn with_sleeper(policy: AcceptancePolicy, approver: A, sleeper: S) -> Self {
        Self {
            policy,
            approver,
            sleeper,
        }
    }

    pub fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    /// Handle one invocation
    ///
    /// Only `Create` reaches the approval endpoint; other lifecycle events
    /// succeed immediately with zero attempts.
    pub fn run(&self, request: &AcceptanceRequest) -> AcceptanceReport {
        let link_id = &request.link_id;
        if request.lifecycle_event != LifecycleEvent::Create {
            info!("{}: nothing to accept on {:?}", link_id, request.lifecycle_event);
            return AcceptanceReport {
                link_id: link_id.clone(),
                status: AcceptanceStatus::Success,
                reason: None,
                attempts: 0,
            };
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            match self.approver.approve(link_id, &request.target_region) {
                Ok(()) => {
                    info!(
                        "{}: accepted in {} on attempt {}/{}",
                        link_id, request.target_region, attempt, max_attempts
                    );
                    return AcceptanceReport {
                        link_id: link_id.clone(),
                        status: AcceptanceStatus::Success,
                        reason: None,
                        attempts: attempt,
                    };
                }
                Err(ApprovalError::Terminal(reason)) => {
                    error!("{}: acceptance rejected: {}", link_id, reason);
                    return AcceptanceReport {
                        link_id: link_id.clone(),
                        status: AcceptanceStatus::Failure,
                        reason: Some(reason),
                        attempts: attempt,
                    };
                }
                Err(ApprovalError::Retryable(reason)) => {
                    if attempt < max_attempts {
                        warn!(
                            "{}: attempt {}/{} failed: {}, retrying in {:?}",
                            link_id, attempt, max_attempts, reason, self.policy.backoff
                        );
                        self.sleeper.sleep(self.policy.backoff);
                    }
                    last_reason = reason;
                }
            }
        }

        error!("{}: giving up after {} attempts", link_id, max_attempts);
        AcceptanceReport {
            link_id: link_id.clone(),
            status: AcceptanceStatus::Failure,
            reason: Some(last_reason),
            attempts: max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingSleeper {
        naps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for &RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.naps.borrow_mut().push(duration);
        }
    }

    fn request(event: LifecycleEvent) -> AcceptanceRequest {
        AcceptanceRequest {
            link_id: ResourceId::new("us-east-1", "peering/eu-west-1"),
            target_region: "eu-west-1".to_string(),
            lifecycle_event: event,
        }
    }

    #[test]
    fn test_policy_defaults() {
        let policy = AcceptancePolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Duration::from_secs(30));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_succeeds_after_four_failures() {
        let calls = Cell::new(0);
        let sleeper = RecordingSleeper::default();
        let approver = |_: &ResourceId, _: &str| -> Result<(), ApprovalError> {
            calls.set(calls.get() + 1);
            if calls.get() < 5 {
                Err(ApprovalError::Retryable("attachment not ready".to_string()))
            } else {
                Ok(())
            }
        };
        let task = AcceptanceTask::with_sleeper(AcceptancePolicy::default(), approver, &sleeper);

        let report = task.run(&request(LifecycleEvent::Create));
        assert!(report.is_success());
        assert_eq!(report.attempts, 5);
        assert_eq!(calls.get(), 5);
        assert_eq!(*sleeper.naps.borrow(), vec![Duration::from_secs(30); 4]);
    }

    #[test]
    fn test_fails_after_exactly_max_attempts() {
        let calls = Cell::new(0);
        let sleeper = RecordingSleeper::default();
        let approver = |_: &ResourceId, _: &str| -> Result<(), ApprovalError> {
            calls.set(calls.get() + 1);
            Err(ApprovalError::Retryable("throttled".to_string()))
        };
        let task = AcceptanceTask::with_sleeper(AcceptancePolicy::default(), approver, &sleeper);

        let report = task.run(&request(LifecycleEvent::Create));
        assert_eq!(report.status, AcceptanceStatus::Failure);
        assert_eq!(report.attempts, 5);
        assert_eq!(calls.get(), 5);
        // No sleep after the last attempt
        assert_eq!(sleeper.naps.borrow().len(), 4);

        match report.into_result() {
            Err(AcceptanceError::PeeringAcceptanceFailure { attempts, reason, .. }) => {
                assert_eq!(attempts, 5);
                assert_eq!(reason, "throttled");
            }
            other => panic!("expected PeeringAcceptanceFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_terminal_error_stops_immediately() {
        let calls = Cell::new(0);
        let sleeper = RecordingSleeper::default();
        let approver = |_: &ResourceId, _: &str| -> Result<(), ApprovalError> {
            calls.set(calls.get() + 1);
            Err(ApprovalError::Terminal("attachment not found".to_string()))
        };
        let task = AcceptanceTask::with_sleeper(AcceptancePolicy::default(), approver, &sleeper);

        let report = task.run(&request(LifecycleEvent::Create));
        assert_eq!(report.status, AcceptanceStatus::Failure);
        assert_eq!(report.attempts, 1);
        assert_eq!(calls.get(), 1);
        assert!(sleeper.naps.borrow().is_empty());
    }

    #[test]
    fn test_non_create_events_skip_the_endpoint() {
        let calls = Cell::new(0);
        let approver = |_: &ResourceId, _: &str| -> Result<(), ApprovalError> {
            calls.set(calls.get() + 1);
            Ok(())
        };
        let task = AcceptanceTask::new(AcceptancePolicy::default(), approver);

        for event in [LifecycleEvent::Update, LifecycleEvent::Delete] {
            let report = task.run(&request(event));
            assert!(report.is_success());
            assert_eq!(report.attempts, 0);
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_single_attempt_policy() {
        let sleeper = RecordingSleeper::default();
        let policy = AcceptancePolicy {
            max_attempts: 1,
            ..AcceptancePolicy::default()
        };
        let approver =
            |_: &ResourceId, _: &str| -> Result<(), ApprovalError> { Err(ApprovalError::Retryable("busy".to_string())) };
        let task = AcceptanceTask::with_sleeper(policy, approver, &sleeper);

        let report = task.run(&request(LifecycleEvent::Create));
        assert_eq!(report.attempts, 1);
        assert!(sleeper.naps.borrow().is_empty());
    }
}
