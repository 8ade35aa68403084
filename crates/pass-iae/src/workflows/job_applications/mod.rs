//! Job applications from submission to a terminal state.

pub mod batch;
pub mod domain;
pub mod service;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use batch::{archive_job_applications, auto_reject_stale_applications, BatchReport};
pub use domain::{
    ApprovalDeliveryMode, JobApplication, JobApplicationPolicy, JobApplicationState,
    RefusalReason, SenderKind, UnknownState, AUTO_REJECTABLE_STATES, DEFAULT_ARCHIVABLE_STATES,
};
pub use service::{
    JobApplicationService, JobApplicationServiceError, NewJobApplication, TransitionPayload,
};
pub use workflow::{Actor, ActorRole, SubmissionError, TransitionError, TransitionKind};
