//! End date bookkeeping for approvals.
//!
//! `end_at` is never recomputed from history. Each dependent write shifts it by the
//! dependent's delta inside the same transaction and appends an [`ApprovalAdjustment`],
//! so at any time `end_at == default_end(start_at) + Σ suspension deltas + Σ prolongation
//! deltas` over the dependents that currently exist.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{
    next_approval_number, Approval, ApprovalOrigin, ApprovalPolicy, IntegrityError, Prolongation,
    Suspension,
};
use super::service::ApprovalServiceError;
use crate::interval::{days_between, shift_date, IntervalError};
use crate::store::{ApprovalRepository, JobApplicationRepository, RepositoryError, UnitOfWork};
use crate::workflows::ids::{
    ApprovalId, DiagnosisId, JobSeekerId, ProlongationId, SuspensionId, UserId,
};

/// One end date movement, kept for audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalAdjustment {
    pub approval: ApprovalId,
    pub cause: AdjustmentCause,
    pub days: i64,
    pub end_before: NaiveDate,
    pub end_after: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentCause {
    SuspensionCreated { suspension: SuspensionId },
    /// Inverse of the stored delta before an edit.
    SuspensionRevised { suspension: SuspensionId },
    SuspensionUpdated { suspension: SuspensionId },
    SuspensionDeleted { suspension: SuspensionId },
    ProlongationCreated { prolongation: ProlongationId },
    ProlongationRevised { prolongation: ProlongationId },
    ProlongationUpdated { prolongation: ProlongationId },
    ProlongationDeleted { prolongation: ProlongationId },
    StartMoved { previous_start: NaiveDate },
}

impl AdjustmentCause {
    pub const fn label(&self) -> &'static str {
        match self {
            AdjustmentCause::SuspensionCreated { .. } => "suspension_created",
            AdjustmentCause::SuspensionRevised { .. } => "suspension_revised",
            AdjustmentCause::SuspensionUpdated { .. } => "suspension_updated",
            AdjustmentCause::SuspensionDeleted { .. } => "suspension_deleted",
            AdjustmentCause::ProlongationCreated { .. } => "prolongation_created",
            AdjustmentCause::ProlongationRevised { .. } => "prolongation_revised",
            AdjustmentCause::ProlongationUpdated { .. } => "prolongation_updated",
            AdjustmentCause::ProlongationDeleted { .. } => "prolongation_deleted",
            AdjustmentCause::StartMoved { .. } => "start_moved",
        }
    }
}

/// End date implied by the current dependents, used to audit the ledger.
pub fn expected_end(
    approval: &Approval,
    suspensions: &[Suspension],
    prolongations: &[Prolongation],
    policy: &ApprovalPolicy,
) -> Result<NaiveDate, IntervalError> {
    let suspended: i64 = suspensions.iter().map(Suspension::delta_days).sum();
    let prolonged: i64 = prolongations.iter().map(Prolongation::delta_days).sum();
    shift_date(policy.default_end(approval.start_at)?, suspended + prolonged)
}

/// Most recently starting approval that has not expired, newest creation first on ties.
pub fn latest_usable(approvals: &[Approval], today: NaiveDate) -> Option<&Approval> {
    approvals
        .iter()
        .filter(|approval| approval.is_valid(today))
        .max_by_key(|approval| (approval.start_at, approval.created_at))
}

/// Reads the approval for update, treating a vanished row as an integrity failure.
pub(crate) fn lock(
    uow: &mut dyn UnitOfWork,
    id: ApprovalId,
) -> Result<Approval, ApprovalServiceError> {
    match uow.lock_approval(id) {
        Ok(approval) => Ok(approval),
        Err(RepositoryError::NotFound) => Err(IntegrityError::ApprovalMissing(id).into()),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn shift_end(
    uow: &mut dyn UnitOfWork,
    approval: &mut Approval,
    days: i64,
    cause: AdjustmentCause,
    now: DateTime<Utc>,
) -> Result<(), ApprovalServiceError> {
    if days == 0 {
        return Ok(());
    }
    let end_before = approval.end_at;
    let end_after = shift_date(end_before, days).map_err(IntegrityError::from)?;
    if end_after <= approval.start_at {
        return Err(IntegrityError::WindowCollapsed {
            approval: approval.id,
            start_at: approval.start_at,
            end_at: end_after,
        }
        .into());
    }

    approval.end_at = end_after;
    save(uow, approval)?;
    uow.record_adjustment(ApprovalAdjustment {
        approval: approval.id,
        cause,
        days,
        end_before,
        end_after,
        recorded_at: now,
    })?;
    debug!(
        approval = %approval.id,
        cause = cause.label(),
        days,
        %end_before,
        %end_after,
        "approval end date adjusted"
    );
    Ok(())
}

/// Moves the start date while keeping the net offset contributed by dependents.
pub(crate) fn move_start(
    uow: &mut dyn UnitOfWork,
    approval: &mut Approval,
    new_start: NaiveDate,
    policy: &ApprovalPolicy,
    now: DateTime<Utc>,
) -> Result<(), ApprovalServiceError> {
    let previous_start = approval.start_at;
    let offset = approval
        .dependent_offset(policy)
        .map_err(IntegrityError::from)?;
    let default_end = policy.default_end(new_start).map_err(IntegrityError::from)?;
    let end_after = shift_date(default_end, offset).map_err(IntegrityError::from)?;
    let end_before = approval.end_at;

    approval.start_at = new_start;
    approval.end_at = end_after;
    save(uow, approval)?;
    uow.record_adjustment(ApprovalAdjustment {
        approval: approval.id,
        cause: AdjustmentCause::StartMoved { previous_start },
        days: days_between(end_before, end_after),
        end_before,
        end_after,
        recorded_at: now,
    })?;
    Ok(())
}

pub(crate) struct Issuance<'a> {
    pub job_seeker: &'a JobSeekerId,
    pub start_at: NaiveDate,
    pub origin: ApprovalOrigin,
    pub eligibility_diagnosis: Option<DiagnosisId>,
    pub created_by: Option<UserId>,
}

pub(crate) fn issue(
    uow: &mut dyn UnitOfWork,
    issuance: Issuance<'_>,
    policy: &ApprovalPolicy,
    now: DateTime<Utc>,
) -> Result<Approval, ApprovalServiceError> {
    let last = uow.last_approval_number(&policy.number_prefix)?;
    let number = next_approval_number(&policy.number_prefix, last.as_deref())?;
    let end_at = policy
        .default_end(issuance.start_at)
        .map_err(IntegrityError::from)?;

    let approval = Approval {
        id: ApprovalId::new(),
        number,
        job_seeker: issuance.job_seeker.clone(),
        start_at: issuance.start_at,
        end_at,
        origin: issuance.origin,
        eligibility_diagnosis: issuance.eligibility_diagnosis,
        created_at: now,
        created_by: issuance.created_by,
    };

    match uow.insert_approval(approval.clone()) {
        Ok(()) => Ok(approval),
        Err(RepositoryError::Conflict) => {
            Err(IntegrityError::DuplicateApprovalNumber(approval.number).into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Ends the suspension in progress when the job seeker is hired again.
///
/// The suspension is removed when it starts on the hiring day (or later), otherwise it is
/// closed on the day before hiring. Returns the touched suspension.
pub(crate) fn unsuspend(
    uow: &mut dyn UnitOfWork,
    approval: &mut Approval,
    hiring_start_at: NaiveDate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Option<SuspensionId>, ApprovalServiceError> {
    let suspensions = uow.suspensions_for(approval.id)?;
    let Some(mut suspension) = suspensions
        .into_iter()
        .find(|suspension| suspension.is_in_progress(today))
    else {
        return Ok(None);
    };
    if !suspension.reason.allows_unsuspend() {
        return Ok(None);
    }

    let old_delta = suspension.delta_days();
    if hiring_start_at <= suspension.start_at {
        uow.delete_suspension(suspension.id)?;
        shift_end(
            uow,
            approval,
            -old_delta,
            AdjustmentCause::SuspensionDeleted {
                suspension: suspension.id,
            },
            now,
        )?;
    } else {
        let closing_day = shift_date(hiring_start_at, -1).map_err(IntegrityError::from)?;
        suspension.end_at = Some(closing_day);
        suspension.updated_at = now;
        uow.save_suspension(&suspension)?;
        shift_end(
            uow,
            approval,
            -old_delta,
            AdjustmentCause::SuspensionRevised {
                suspension: suspension.id,
            },
            now,
        )?;
        shift_end(
            uow,
            approval,
            suspension.delta_days(),
            AdjustmentCause::SuspensionUpdated {
                suspension: suspension.id,
            },
            now,
        )?;
    }
    Ok(Some(suspension.id))
}

/// Removes an approval with its dependents and detaches the applications pointing at it.
pub(crate) fn remove(
    uow: &mut dyn UnitOfWork,
    approval: &Approval,
    now: DateTime<Utc>,
) -> Result<(), ApprovalServiceError> {
    for suspension in uow.suspensions_for(approval.id)? {
        uow.delete_suspension(suspension.id)?;
    }
    for prolongation in uow.prolongations_for(approval.id)? {
        uow.delete_prolongation(prolongation.id)?;
    }
    for mut application in uow.job_applications_for_approval(approval.id)? {
        application.approval = None;
        application.updated_at = now;
        uow.save_job_application(&application)?;
    }
    match uow.delete_approval(approval.id) {
        Ok(()) => Ok(()),
        Err(RepositoryError::NotFound) => Err(IntegrityError::ApprovalMissing(approval.id).into()),
        Err(err) => Err(err.into()),
    }
}

fn save(uow: &mut dyn UnitOfWork, approval: &Approval) -> Result<(), ApprovalServiceError> {
    match uow.save_approval(approval) {
        Ok(()) => Ok(()),
        Err(RepositoryError::NotFound) => Err(IntegrityError::ApprovalMissing(approval.id).into()),
        Err(err) => Err(err.into()),
    }
}
