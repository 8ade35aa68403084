use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::{add_months, days_between, shift_date, DateInterval, IntervalError};
use crate::workflows::ids::{
    ApprovalId, DiagnosisId, JobApplicationId, JobSeekerId, ProlongationId, SuspensionId, UserId,
};

pub const APPROVAL_NUMBER_PREFIX_LEN: usize = 5;
pub const APPROVAL_NUMBER_SEQUENCE_LEN: usize = 7;
const APPROVAL_NUMBER_SEQUENCE_MAX: u32 = 9_999_999;

/// Tunables governing approval windows and their dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub validity_months: u32,
    pub number_prefix: String,
    pub waiting_period_years: u32,
    pub suspension_max_months: u32,
    pub suspension_max_retroactivity_days: i64,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            validity_months: 24,
            number_prefix: "XXXXX".to_string(),
            waiting_period_years: 2,
            suspension_max_months: 36,
            suspension_max_retroactivity_days: 365,
        }
    }
}

impl ApprovalPolicy {
    /// Last valid day of an approval starting on `start_at` with no dependents.
    pub fn default_end(&self, start_at: NaiveDate) -> Result<NaiveDate, IntervalError> {
        let boundary = add_months(start_at, self.validity_months)?;
        shift_date(boundary, -1)
    }

    /// Latest last day allowed for a suspension starting on `start_at`.
    pub fn suspension_max_end(&self, start_at: NaiveDate) -> Result<NaiveDate, IntervalError> {
        let boundary = add_months(start_at, self.suspension_max_months)?;
        shift_date(boundary, -1)
    }
}

/// How the approval entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOrigin {
    Default,
    PeApproval,
    AiStock,
    Admin,
}

impl ApprovalOrigin {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalOrigin::Default => "default",
            ApprovalOrigin::PeApproval => "pe_approval",
            ApprovalOrigin::AiStock => "ai_stock",
            ApprovalOrigin::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Expired,
    Suspended,
    Valid,
    Future,
}

/// A PASS IAE: the window during which the job seeker may be hired under the scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub number: String,
    pub job_seeker: JobSeekerId,
    pub start_at: NaiveDate,
    /// Last valid day, inclusive.
    pub end_at: NaiveDate,
    pub origin: ApprovalOrigin,
    pub eligibility_diagnosis: Option<DiagnosisId>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
}

impl Approval {
    pub fn window(&self) -> Result<DateInterval, IntervalError> {
        DateInterval::from_inclusive(self.start_at, self.end_at)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.window().map_or(false, |window| window.contains(date))
    }

    /// In progress or not started yet.
    pub fn is_valid(&self, today: NaiveDate) -> bool {
        self.covers(today) || self.start_at >= today
    }

    /// The start date may only move while the approval has not begun.
    pub fn can_move_start(&self, today: NaiveDate) -> bool {
        self.start_at > today
    }

    pub fn is_in_waiting_period(&self, today: NaiveDate, policy: &ApprovalPolicy) -> bool {
        if self.is_valid(today) {
            return false;
        }
        match add_months(self.end_at, policy.waiting_period_years * 12) {
            Ok(waiting_end) => today <= waiting_end,
            Err(_) => true,
        }
    }

    pub fn status(&self, today: NaiveDate, suspensions: &[Suspension]) -> ApprovalStatus {
        if !self.is_valid(today) {
            ApprovalStatus::Expired
        } else if suspensions
            .iter()
            .any(|suspension| suspension.approval == self.id && suspension.is_in_progress(today))
        {
            ApprovalStatus::Suspended
        } else if self.covers(today) {
            ApprovalStatus::Valid
        } else {
            ApprovalStatus::Future
        }
    }

    /// Net days added to the default window by existing dependents.
    pub fn dependent_offset(&self, policy: &ApprovalPolicy) -> Result<i64, IntervalError> {
        Ok(days_between(policy.default_end(self.start_at)?, self.end_at))
    }
}

/// Builds the number following `last` under `prefix`.
pub fn next_approval_number(prefix: &str, last: Option<&str>) -> Result<String, IntegrityError> {
    let sequence = match last {
        None => 1,
        Some(number) => {
            let current = number
                .strip_prefix(prefix)
                .and_then(|digits| digits.parse::<u32>().ok())
                .ok_or_else(|| IntegrityError::MalformedApprovalNumber(number.to_string()))?;
            current + 1
        }
    };
    if sequence > APPROVAL_NUMBER_SEQUENCE_MAX {
        return Err(IntegrityError::NumberExhausted(prefix.to_string()));
    }
    Ok(format!(
        "{prefix}{sequence:0width$}",
        width = APPROVAL_NUMBER_SEQUENCE_LEN
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionReason {
    ContractSuspended,
    ContractBroken,
    FinishedContract,
    ApprovalBetweenCtaMembers,
    ContratPasserelle,
    Sickness,
    Maternity,
    Incarceration,
    TrialOutsideIae,
    Detoxification,
    ForceMajeure,
}

impl SuspensionReason {
    pub const fn label(self) -> &'static str {
        match self {
            SuspensionReason::ContractSuspended => "contract_suspended",
            SuspensionReason::ContractBroken => "contract_broken",
            SuspensionReason::FinishedContract => "finished_contract",
            SuspensionReason::ApprovalBetweenCtaMembers => "approval_between_cta_members",
            SuspensionReason::ContratPasserelle => "contrat_passerelle",
            SuspensionReason::Sickness => "sickness",
            SuspensionReason::Maternity => "maternity",
            SuspensionReason::Incarceration => "incarceration",
            SuspensionReason::TrialOutsideIae => "trial_outside_iae",
            SuspensionReason::Detoxification => "detoxification",
            SuspensionReason::ForceMajeure => "force_majeure",
        }
    }

    /// Legacy reasons stay readable on old records but cannot be chosen anymore.
    pub const fn is_hidden(self) -> bool {
        matches!(
            self,
            SuspensionReason::Sickness
                | SuspensionReason::Maternity
                | SuspensionReason::Incarceration
                | SuspensionReason::TrialOutsideIae
                | SuspensionReason::Detoxification
                | SuspensionReason::ForceMajeure
        )
    }

    /// A new hire ends suspensions recorded for these reasons.
    pub const fn allows_unsuspend(self) -> bool {
        !self.is_hidden()
    }

    pub const fn requires_explanation(self) -> bool {
        matches!(self, SuspensionReason::ForceMajeure)
    }
}

/// A period during which the approval countdown is paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    pub id: SuspensionId,
    pub approval: ApprovalId,
    pub start_at: NaiveDate,
    /// Last suspended day, inclusive. `None` while still in progress.
    pub end_at: Option<NaiveDate>,
    pub reason: SuspensionReason,
    pub reason_explanation: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Suspension {
    pub fn range(&self) -> Result<DateInterval, IntervalError> {
        suspension_range(self.start_at, self.end_at)
    }

    /// Days pushed onto the approval end; open suspensions count once closed.
    pub fn delta_days(&self) -> i64 {
        self.end_at
            .map_or(0, |end_at| days_between(self.start_at, end_at))
    }

    pub fn is_in_progress(&self, today: NaiveDate) -> bool {
        self.range().map_or(false, |range| range.contains(today))
    }
}

fn suspension_range(
    start_at: NaiveDate,
    end_at: Option<NaiveDate>,
) -> Result<DateInterval, IntervalError> {
    match end_at {
        Some(end_at) => DateInterval::from_inclusive(start_at, end_at),
        None => Ok(DateInterval::open(start_at)),
    }
}

/// Field values for a suspension about to be created or changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspensionDraft {
    pub start_at: NaiveDate,
    pub end_at: Option<NaiveDate>,
    pub reason: SuspensionReason,
    pub reason_explanation: Option<String>,
}

impl SuspensionDraft {
    pub fn delta_days(&self) -> i64 {
        self.end_at
            .map_or(0, |end_at| days_between(self.start_at, end_at))
    }
}

/// Context a suspension draft is validated against.
pub struct SuspensionCheck<'a> {
    pub approval: &'a Approval,
    /// Other suspensions of the same approval.
    pub others: &'a [Suspension],
    pub today: NaiveDate,
    pub policy: &'a ApprovalPolicy,
    /// Reason stored before the edit, `None` on creation.
    pub previous_reason: Option<SuspensionReason>,
}

pub fn validate_suspension(
    draft: &SuspensionDraft,
    check: &SuspensionCheck<'_>,
) -> Result<(), SuspensionError> {
    if check.previous_reason != Some(draft.reason) && draft.reason.is_hidden() {
        return Err(SuspensionError::RetiredReason(draft.reason));
    }
    if draft.reason.requires_explanation()
        && draft
            .reason_explanation
            .as_deref()
            .map_or(true, |text| text.trim().is_empty())
    {
        return Err(SuspensionError::ExplanationRequired(draft.reason));
    }
    if let Some(end_at) = draft.end_at {
        if end_at < draft.start_at {
            return Err(SuspensionError::EndBeforeStart {
                start_at: draft.start_at,
                end_at,
            });
        }
        let max_end = check.policy.suspension_max_end(draft.start_at)?;
        if end_at > max_end {
            return Err(SuspensionError::TooLong { max_end });
        }
    }
    if draft.start_at > check.today {
        return Err(SuspensionError::StartsInFuture(draft.start_at));
    }
    if check.previous_reason.is_none() {
        let earliest = shift_date(
            check.today,
            -check.policy.suspension_max_retroactivity_days,
        )?;
        if draft.start_at < earliest {
            return Err(SuspensionError::TooRetroactive { earliest });
        }
    }
    if !check.approval.covers(draft.start_at) {
        return Err(SuspensionError::OutsideApproval {
            start_at: draft.start_at,
            approval_start: check.approval.start_at,
            approval_end: check.approval.end_at,
        });
    }

    let range = suspension_range(draft.start_at, draft.end_at)?;
    for other in check.others {
        if other.range()?.overlaps(&range) {
            return Err(SuspensionError::Overlap(other.id));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuspensionError {
    #[error("suspension {0} does not exist")]
    NotFound(SuspensionId),
    #[error("suspension reason '{}' is no longer accepted", .0.label())]
    RetiredReason(SuspensionReason),
    #[error("suspension reason '{}' requires an explanation", .0.label())]
    ExplanationRequired(SuspensionReason),
    #[error("suspension ends on {end_at}, before it starts on {start_at}")]
    EndBeforeStart {
        start_at: NaiveDate,
        end_at: NaiveDate,
    },
    #[error("suspension cannot last beyond {max_end}")]
    TooLong { max_end: NaiveDate },
    #[error("suspension cannot start in the future ({0})")]
    StartsInFuture(NaiveDate),
    #[error("suspension cannot start before {earliest}")]
    TooRetroactive { earliest: NaiveDate },
    #[error(
        "suspension starting {start_at} is outside the approval window {approval_start}..={approval_end}"
    )]
    OutsideApproval {
        start_at: NaiveDate,
        approval_start: NaiveDate,
        approval_end: NaiveDate,
    },
    #[error("suspension overlaps existing suspension {0}")]
    Overlap(SuspensionId),
    #[error(transparent)]
    Interval(#[from] IntervalError),
}

impl SuspensionError {
    pub const fn code(&self) -> &'static str {
        match self {
            SuspensionError::NotFound(_) => "suspension_not_found",
            SuspensionError::RetiredReason(_) => "suspension_reason_retired",
            SuspensionError::ExplanationRequired(_) => "suspension_explanation_required",
            SuspensionError::EndBeforeStart { .. } => "suspension_end_before_start",
            SuspensionError::TooLong { .. } => "suspension_too_long",
            SuspensionError::StartsInFuture(_) => "suspension_starts_in_future",
            SuspensionError::TooRetroactive { .. } => "suspension_too_retroactive",
            SuspensionError::OutsideApproval { .. } => "suspension_outside_approval",
            SuspensionError::Overlap(_) => "suspension_overlap",
            SuspensionError::Interval(err) => err.code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProlongationReason {
    SeniorCdi,
    CompleteTraining,
    Rqth,
    Senior,
    ParticularDifficulties,
    HealthContext,
}

impl ProlongationReason {
    pub const fn label(self) -> &'static str {
        match self {
            ProlongationReason::SeniorCdi => "senior_cdi",
            ProlongationReason::CompleteTraining => "complete_training",
            ProlongationReason::Rqth => "rqth",
            ProlongationReason::Senior => "senior",
            ProlongationReason::ParticularDifficulties => "particular_difficulties",
            ProlongationReason::HealthContext => "health_context",
        }
    }

    /// Cumulative prolongation days allowed per approval for this reason.
    pub const fn max_cumulative_days(self) -> i64 {
        match self {
            ProlongationReason::SeniorCdi => 3650,
            ProlongationReason::CompleteTraining => 730,
            ProlongationReason::Rqth => 1095,
            ProlongationReason::Senior => 1825,
            ProlongationReason::ParticularDifficulties => 1095,
            ProlongationReason::HealthContext => 365,
        }
    }

    pub const fn is_hidden(self) -> bool {
        matches!(self, ProlongationReason::HealthContext)
    }
}

/// An administratively granted extension, `[start_at, end_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prolongation {
    pub id: ProlongationId,
    pub approval: ApprovalId,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub reason: ProlongationReason,
    pub reason_explanation: Option<String>,
    pub declared_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prolongation {
    pub fn range(&self) -> Result<DateInterval, IntervalError> {
        DateInterval::new(self.start_at, self.end_at)
    }

    pub fn delta_days(&self) -> i64 {
        days_between(self.start_at, self.end_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProlongationDraft {
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub reason: ProlongationReason,
    pub reason_explanation: Option<String>,
}

impl ProlongationDraft {
    pub fn delta_days(&self) -> i64 {
        days_between(self.start_at, self.end_at)
    }
}

pub struct ProlongationCheck<'a> {
    pub approval: &'a Approval,
    pub others: &'a [Prolongation],
    /// Reason stored before the edit, `None` on creation.
    pub previous_reason: Option<ProlongationReason>,
}

pub fn validate_prolongation(
    draft: &ProlongationDraft,
    check: &ProlongationCheck<'_>,
) -> Result<(), ProlongationError> {
    if check.previous_reason != Some(draft.reason) && draft.reason.is_hidden() {
        return Err(ProlongationError::RetiredReason(draft.reason));
    }
    if draft.end_at <= draft.start_at {
        return Err(ProlongationError::TooShort {
            start_at: draft.start_at,
            end_at: draft.end_at,
        });
    }
    if check.previous_reason.is_none() && draft.start_at != check.approval.end_at {
        return Err(ProlongationError::MustStartAtApprovalEnd {
            expected: check.approval.end_at,
            start_at: draft.start_at,
        });
    }

    let range = DateInterval::new(draft.start_at, draft.end_at)?;
    for other in check.others {
        if other.range()?.overlaps(&range) {
            return Err(ProlongationError::Overlap(other.id));
        }
    }

    let used: i64 = check
        .others
        .iter()
        .filter(|other| other.reason == draft.reason)
        .map(Prolongation::delta_days)
        .sum();
    let max_days = draft.reason.max_cumulative_days();
    if used + draft.delta_days() > max_days {
        return Err(ProlongationError::CapExceeded {
            reason: draft.reason,
            max_days,
            requested: used + draft.delta_days(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProlongationError {
    #[error("prolongation {0} does not exist")]
    NotFound(ProlongationId),
    #[error("prolongation reason '{}' is no longer accepted", .0.label())]
    RetiredReason(ProlongationReason),
    #[error("prolongation from {start_at} to {end_at} must last at least one day")]
    TooShort {
        start_at: NaiveDate,
        end_at: NaiveDate,
    },
    #[error("prolongation must start on the approval end date {expected}, not {start_at}")]
    MustStartAtApprovalEnd {
        expected: NaiveDate,
        start_at: NaiveDate,
    },
    #[error("prolongation overlaps existing prolongation {0}")]
    Overlap(ProlongationId),
    #[error(
        "prolongations for '{}' would total {requested} days, above {max_days}",
        .reason.label()
    )]
    CapExceeded {
        reason: ProlongationReason,
        max_days: i64,
        requested: i64,
    },
    #[error(transparent)]
    Interval(#[from] IntervalError),
}

impl ProlongationError {
    pub const fn code(&self) -> &'static str {
        match self {
            ProlongationError::NotFound(_) => "prolongation_not_found",
            ProlongationError::RetiredReason(_) => "prolongation_reason_retired",
            ProlongationError::TooShort { .. } => "prolongation_too_short",
            ProlongationError::MustStartAtApprovalEnd { .. } => "prolongation_not_contiguous",
            ProlongationError::Overlap(_) => "prolongation_overlap",
            ProlongationError::CapExceeded { .. } => "prolongation_cap_exceeded",
            ProlongationError::Interval(err) => err.code(),
        }
    }
}

/// Conditions that indicate corrupted or racing state. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("approval {0} no longer exists")]
    ApprovalMissing(ApprovalId),
    #[error("approval number {0} is already assigned")]
    DuplicateApprovalNumber(String),
    #[error("approval number {0} does not match the configured prefix")]
    MalformedApprovalNumber(String),
    #[error("approval numbering exhausted for prefix {0}")]
    NumberExhausted(String),
    #[error("adjusting approval {approval} would end it on {end_at}, not after {start_at}")]
    WindowCollapsed {
        approval: ApprovalId,
        start_at: NaiveDate,
        end_at: NaiveDate,
    },
    #[error(
        "accepted application {application} hires on {hiring_start_at}, outside approval {approval}"
    )]
    HiringOutsideApproval {
        approval: ApprovalId,
        application: JobApplicationId,
        hiring_start_at: NaiveDate,
    },
    #[error(transparent)]
    Interval(#[from] IntervalError),
}

impl IntegrityError {
    pub const fn code(&self) -> &'static str {
        match self {
            IntegrityError::ApprovalMissing(_) => "approval_missing",
            IntegrityError::DuplicateApprovalNumber(_) => "approval_number_duplicate",
            IntegrityError::MalformedApprovalNumber(_) => "approval_number_malformed",
            IntegrityError::NumberExhausted(_) => "approval_number_exhausted",
            IntegrityError::WindowCollapsed { .. } => "approval_window_collapsed",
            IntegrityError::HiringOutsideApproval { .. } => "approval_excludes_hiring",
            IntegrityError::Interval(err) => err.code(),
        }
    }
}
