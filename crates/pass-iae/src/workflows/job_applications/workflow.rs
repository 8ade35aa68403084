//! Transition table of the job application state machine.

use chrono::NaiveDate;

use super::domain::{JobApplicationState, RefusalReason};
use crate::workflows::ids::{ApprovalId, JobApplicationId, JobSeekerId, UserId};

use JobApplicationState::{
    Accepted, Cancelled, New, Obsolete, Postponed, PriorToHire, Processing, Refused,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorRole {
    JobSeeker,
    Prescriber,
    Employer,
    Administrator,
    /// Batches and side effects of other transitions.
    System,
}

/// Who requests a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user: Option<UserId>,
    pub role: ActorRole,
}

impl Actor {
    pub fn employer(user: UserId) -> Self {
        Self {
            user: Some(user),
            role: ActorRole::Employer,
        }
    }

    pub fn administrator(user: UserId) -> Self {
        Self {
            user: Some(user),
            role: ActorRole::Administrator,
        }
    }

    pub fn system() -> Self {
        Self {
            user: None,
            role: ActorRole::System,
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == ActorRole::System
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Process,
    Postpone,
    MoveToPriorToHire,
    CancelPriorToHire,
    Accept,
    Refuse,
    Cancel,
    Reset,
    /// Only reachable as a side effect of a sibling acceptance.
    RenderObsolete,
}

impl TransitionKind {
    pub const fn label(self) -> &'static str {
        match self {
            TransitionKind::Process => "process",
            TransitionKind::Postpone => "postpone",
            TransitionKind::MoveToPriorToHire => "move_to_prior_to_hire",
            TransitionKind::CancelPriorToHire => "cancel_prior_to_hire",
            TransitionKind::Accept => "accept",
            TransitionKind::Refuse => "refuse",
            TransitionKind::Cancel => "cancel",
            TransitionKind::Reset => "reset",
            TransitionKind::RenderObsolete => "render_obsolete",
        }
    }
}

/// Transitions callers may request, keyed by source and target state.
pub fn requestable(from: JobApplicationState, to: JobApplicationState) -> Option<TransitionKind> {
    let kind = match (from, to) {
        (New, Processing) => TransitionKind::Process,
        (Processing | PriorToHire, Postponed) => TransitionKind::Postpone,
        (Processing | Postponed, PriorToHire) => TransitionKind::MoveToPriorToHire,
        (PriorToHire, Processing) => TransitionKind::CancelPriorToHire,
        (Processing | Postponed | PriorToHire, Accepted) => TransitionKind::Accept,
        (New | Processing | Postponed, Refused) => TransitionKind::Refuse,
        (Accepted, Cancelled) => TransitionKind::Cancel,
        (Obsolete, New) => TransitionKind::Reset,
        _ => return None,
    };
    Some(kind)
}

/// Validates a requested transition against the table and the actor's role.
pub fn resolve(
    from: JobApplicationState,
    to: JobApplicationState,
    actor: &Actor,
) -> Result<TransitionKind, TransitionError> {
    let kind = requestable(from, to).ok_or(TransitionError::NotAllowed { from, to })?;
    if kind == TransitionKind::Reset && actor.role != ActorRole::Administrator {
        return Err(TransitionError::AdministratorOnly(kind));
    }
    Ok(kind)
}

/// Refusal reasons users may pick; hidden ones are reserved to the system.
pub fn check_refusal_reason(
    reason: Option<RefusalReason>,
    actor: &Actor,
) -> Result<RefusalReason, TransitionError> {
    let reason = reason.ok_or(TransitionError::RefusalReasonRequired)?;
    if reason.is_hidden() && !actor.is_system() {
        return Err(TransitionError::HiddenRefusalReason(reason));
    }
    Ok(reason)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("job application {0} does not exist")]
    NotFound(JobApplicationId),
    #[error("cannot move a job application from {from} to {to}")]
    NotAllowed {
        from: JobApplicationState,
        to: JobApplicationState,
    },
    #[error("transition `{}` is reserved to administrators", .0.label())]
    AdministratorOnly(TransitionKind),
    #[error("a hiring start date is required to accept")]
    MissingHiringStart,
    #[error("hiring cannot start before {earliest}")]
    HiringStartTooEarly { earliest: NaiveDate },
    #[error("hiring must end after it starts")]
    HiringEndBeforeStart,
    #[error("hiring must start within approval {approval} ({start_at} to {end_at})")]
    HiringOutsideApproval {
        approval: ApprovalId,
        start_at: NaiveDate,
        end_at: NaiveDate,
    },
    #[error("no valid eligibility diagnosis for the job seeker")]
    DiagnosisRequired,
    #[error("approval {approval} is in its waiting period; a prescriber diagnosis is required")]
    WaitingPeriod { approval: ApprovalId },
    #[error("a refusal reason is required")]
    RefusalReasonRequired,
    #[error("refusal reason `{}` cannot be selected", .0.label())]
    HiddenRefusalReason(RefusalReason),
    #[error("job application is already archived")]
    AlreadyArchived,
    #[error("job application is not archived")]
    NotArchived,
    #[error("job applications in state {0} cannot be archived")]
    NotArchivable(JobApplicationState),
}

impl TransitionError {
    pub const fn code(&self) -> &'static str {
        match self {
            TransitionError::NotFound(_) => "job_application_not_found",
            TransitionError::NotAllowed { .. } => "transition_not_allowed",
            TransitionError::AdministratorOnly(_) => "transition_administrator_only",
            TransitionError::MissingHiringStart => "hiring_start_missing",
            TransitionError::HiringStartTooEarly { .. } => "hiring_start_too_early",
            TransitionError::HiringEndBeforeStart => "hiring_end_before_start",
            TransitionError::HiringOutsideApproval { .. } => "hiring_outside_approval",
            TransitionError::DiagnosisRequired => "eligibility_diagnosis_required",
            TransitionError::WaitingPeriod { .. } => "approval_waiting_period",
            TransitionError::RefusalReasonRequired => "refusal_reason_required",
            TransitionError::HiddenRefusalReason(_) => "refusal_reason_hidden",
            TransitionError::AlreadyArchived => "job_application_archived",
            TransitionError::NotArchived => "job_application_not_archived",
            TransitionError::NotArchivable(_) => "job_application_not_archivable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("job seeker {0} is unknown")]
    JobSeekerMissing(JobSeekerId),
    #[error("job application {existing} is still pending for this company")]
    DuplicatePending { existing: JobApplicationId },
    #[error("approval {approval} is suspended")]
    ApprovalSuspended { approval: ApprovalId },
}

impl SubmissionError {
    pub const fn code(&self) -> &'static str {
        match self {
            SubmissionError::JobSeekerMissing(_) => "job_seeker_missing",
            SubmissionError::DuplicatePending { .. } => "job_application_duplicate",
            SubmissionError::ApprovalSuspended { .. } => "approval_suspended",
        }
    }
}
