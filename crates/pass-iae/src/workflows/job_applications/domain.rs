use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::ids::{
    ApprovalId, CompanyId, DiagnosisId, JobApplicationId, JobSeekerId, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobApplicationState {
    New,
    Processing,
    Postponed,
    PriorToHire,
    Accepted,
    Refused,
    Cancelled,
    Obsolete,
}

impl JobApplicationState {
    pub const ALL: [JobApplicationState; 8] = [
        JobApplicationState::New,
        JobApplicationState::Processing,
        JobApplicationState::Postponed,
        JobApplicationState::PriorToHire,
        JobApplicationState::Accepted,
        JobApplicationState::Refused,
        JobApplicationState::Cancelled,
        JobApplicationState::Obsolete,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            JobApplicationState::New => "new",
            JobApplicationState::Processing => "processing",
            JobApplicationState::Postponed => "postponed",
            JobApplicationState::PriorToHire => "prior_to_hire",
            JobApplicationState::Accepted => "accepted",
            JobApplicationState::Refused => "refused",
            JobApplicationState::Cancelled => "cancelled",
            JobApplicationState::Obsolete => "obsolete",
        }
    }

    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            JobApplicationState::New
                | JobApplicationState::Processing
                | JobApplicationState::Postponed
                | JobApplicationState::PriorToHire
        )
    }
}

impl fmt::Display for JobApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job application state `{0}`")]
pub struct UnknownState(pub String);

impl FromStr for JobApplicationState {
    type Err = UnknownState;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        JobApplicationState::ALL
            .into_iter()
            .find(|state| state.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownState(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    JobSeeker,
    Prescriber,
    Employer,
}

impl SenderKind {
    pub const fn label(self) -> &'static str {
        match self {
            SenderKind::JobSeeker => "job_seeker",
            SenderKind::Prescriber => "prescriber",
            SenderKind::Employer => "employer",
        }
    }
}

/// Why an employer turned an application down. Hidden reasons are set by the system or
/// kept for historical rows and cannot be picked by users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    DidNotCome,
    Unavailable,
    NonEligible,
    EligibilityDoubt,
    Incompatible,
    PreventObjectives,
    NoPosition,
    ApprovalExpirationTooClose,
    Other,
    Auto,
    Deactivation,
    NotMobile,
    PoorlyInformed,
}

impl RefusalReason {
    pub const fn label(self) -> &'static str {
        match self {
            RefusalReason::DidNotCome => "did_not_come",
            RefusalReason::Unavailable => "unavailable",
            RefusalReason::NonEligible => "non_eligible",
            RefusalReason::EligibilityDoubt => "eligibility_doubt",
            RefusalReason::Incompatible => "incompatible",
            RefusalReason::PreventObjectives => "prevent_objectives",
            RefusalReason::NoPosition => "no_position",
            RefusalReason::ApprovalExpirationTooClose => "approval_expiration_too_close",
            RefusalReason::Other => "other",
            RefusalReason::Auto => "auto",
            RefusalReason::Deactivation => "deactivation",
            RefusalReason::NotMobile => "not_mobile",
            RefusalReason::PoorlyInformed => "poorly_informed",
        }
    }

    pub const fn is_hidden(self) -> bool {
        matches!(
            self,
            RefusalReason::Auto
                | RefusalReason::Deactivation
                | RefusalReason::NotMobile
                | RefusalReason::PoorlyInformed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDeliveryMode {
    Automatic,
    /// Staff must check the identity before the approval number is sent.
    Manual,
}

impl ApprovalDeliveryMode {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalDeliveryMode::Automatic => "automatic",
            ApprovalDeliveryMode::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplication {
    pub id: JobApplicationId,
    pub job_seeker: JobSeekerId,
    pub to_company: CompanyId,
    pub sender: UserId,
    pub sender_kind: SenderKind,
    #[serde(default)]
    pub selected_jobs: Vec<String>,
    pub state: JobApplicationState,
    pub created_at: DateTime<Utc>,
    /// Bumped by any write.
    pub updated_at: DateTime<Utc>,
    /// Bumped by state changes only.
    pub last_modification_at: DateTime<Utc>,
    pub hiring_start_at: Option<NaiveDate>,
    pub hiring_end_at: Option<NaiveDate>,
    pub approval: Option<ApprovalId>,
    pub eligibility_diagnosis: Option<DiagnosisId>,
    pub refusal_reason: Option<RefusalReason>,
    pub approval_delivery_mode: Option<ApprovalDeliveryMode>,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<UserId>,
}

impl JobApplication {
    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Thresholds and subsets driving hiring checks and the maintenance batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobApplicationPolicy {
    /// How many days in the past a hiring may start.
    pub hiring_start_tolerance_days: i64,
    pub auto_reject_after_days: i64,
    pub archive_after_days: i64,
    pub archivable_states: Vec<JobApplicationState>,
}

impl Default for JobApplicationPolicy {
    fn default() -> Self {
        Self {
            hiring_start_tolerance_days: 0,
            auto_reject_after_days: 60,
            archive_after_days: 180,
            archivable_states: DEFAULT_ARCHIVABLE_STATES.to_vec(),
        }
    }
}

impl JobApplicationPolicy {
    pub fn is_archivable(&self, state: JobApplicationState) -> bool {
        self.archivable_states.contains(&state)
    }
}

pub const DEFAULT_ARCHIVABLE_STATES: [JobApplicationState; 5] = [
    JobApplicationState::New,
    JobApplicationState::Processing,
    JobApplicationState::Refused,
    JobApplicationState::Cancelled,
    JobApplicationState::Obsolete,
];

/// States from which the auto-rejection batch refuses stale applications.
pub const AUTO_REJECTABLE_STATES: [JobApplicationState; 2] =
    [JobApplicationState::New, JobApplicationState::Processing];
