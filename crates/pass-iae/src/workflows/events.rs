//! Outbound notifications emitted after a workflow transaction commits.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ids::{ApprovalId, JobApplicationId};
use super::job_applications::{ApprovalDeliveryMode, JobApplicationState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Transitioned(TransitionEvent),
    ApprovalIssued(ApprovalIssuedEvent),
}

impl WorkflowEvent {
    pub fn job_application_id(&self) -> JobApplicationId {
        match self {
            WorkflowEvent::Transitioned(event) => event.job_application_id,
            WorkflowEvent::ApprovalIssued(event) => event.job_application_id,
        }
    }
}

/// A job application changed state. Submissions have no `old_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub job_application_id: JobApplicationId,
    pub old_state: Option<JobApplicationState>,
    pub new_state: JobApplicationState,
    pub approval_id: Option<ApprovalId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalIssuedEvent {
    pub job_application_id: JobApplicationId,
    pub approval_id: ApprovalId,
    pub number: String,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub delivery_mode: ApprovalDeliveryMode,
    pub occurred_at: DateTime<Utc>,
}

/// Notification hook (e-mail service, webhooks).
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: WorkflowEvent) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

/// Publisher writing events to the log, used by the batch commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: WorkflowEvent) -> Result<(), PublishError> {
        match &event {
            WorkflowEvent::Transitioned(transition) => info!(
                job_application = %transition.job_application_id,
                old_state = transition.old_state.map(JobApplicationState::label),
                new_state = transition.new_state.label(),
                approval = ?transition.approval_id,
                "job application transitioned"
            ),
            WorkflowEvent::ApprovalIssued(issued) => info!(
                job_application = %issued.job_application_id,
                approval = %issued.approval_id,
                number = %issued.number,
                delivery_mode = issued.delivery_mode.label(),
                "approval issued"
            ),
        }
        Ok(())
    }
}
