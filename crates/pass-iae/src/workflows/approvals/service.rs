use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::domain::{
    validate_prolongation, validate_suspension, Approval, ApprovalOrigin, ApprovalPolicy,
    ApprovalStatus, IntegrityError, Prolongation, ProlongationCheck, ProlongationDraft,
    ProlongationError, ProlongationReason, Suspension, SuspensionCheck, SuspensionDraft,
    SuspensionError, SuspensionReason,
};
use super::ledger::{self, AdjustmentCause, ApprovalAdjustment, Issuance};
use crate::clock::Clock;
use crate::interval::IntervalError;
use crate::store::{ApprovalRepository, RepositoryError, Store};
use crate::workflows::ids::{
    ApprovalId, DiagnosisId, JobSeekerId, ProlongationId, SuspensionId, UserId,
};

/// Request to record a suspension.
#[derive(Debug, Clone)]
pub struct NewSuspension {
    pub approval: ApprovalId,
    pub start_at: NaiveDate,
    pub end_at: Option<NaiveDate>,
    pub reason: SuspensionReason,
    pub reason_explanation: Option<String>,
    pub created_by: UserId,
}

/// Request to record a prolongation.
#[derive(Debug, Clone)]
pub struct NewProlongation {
    pub approval: ApprovalId,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub reason: ProlongationReason,
    pub reason_explanation: Option<String>,
    pub declared_by: UserId,
}

/// Administrative issuance outside the hiring flow (imports, support staff).
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub job_seeker: JobSeekerId,
    pub start_at: NaiveDate,
    pub origin: ApprovalOrigin,
    pub eligibility_diagnosis: Option<DiagnosisId>,
    pub created_by: Option<UserId>,
}

/// Result of comparing the stored end date with the one implied by the dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndDateAudit {
    pub approval: ApprovalId,
    pub stored: NaiveDate,
    pub expected: NaiveDate,
}

impl EndDateAudit {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.expected
    }
}

/// Approval lifecycle and the suspension/prolongation writes that move its end date.
pub struct ApprovalService<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
    policy: ApprovalPolicy,
}

impl<S, C> ApprovalService<S, C>
where
    S: Store + 'static,
    C: Clock + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<C>, policy: ApprovalPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    pub fn issue_approval(&self, request: NewApproval) -> Result<Approval, ApprovalServiceError> {
        let now = self.clock.now();
        let approval = self.store.atomic(|uow| {
            ledger::issue(
                uow,
                Issuance {
                    job_seeker: &request.job_seeker,
                    start_at: request.start_at,
                    origin: request.origin,
                    eligibility_diagnosis: request.eligibility_diagnosis,
                    created_by: request.created_by.clone(),
                },
                &self.policy,
                now,
            )
        })?;
        info!(
            approval = %approval.id,
            number = %approval.number,
            origin = approval.origin.label(),
            "approval issued"
        );
        Ok(approval)
    }

    pub fn get(&self, id: ApprovalId) -> Result<Approval, ApprovalServiceError> {
        self.store.atomic(|uow| {
            uow.approval(id)?
                .ok_or_else(|| IntegrityError::ApprovalMissing(id).into())
        })
    }

    pub fn status(&self, id: ApprovalId) -> Result<ApprovalStatus, ApprovalServiceError> {
        let today = self.clock.today();
        self.store.atomic(|uow| {
            let approval = uow
                .approval(id)?
                .ok_or(IntegrityError::ApprovalMissing(id))?;
            let suspensions = uow.suspensions_for(id)?;
            Ok(approval.status(today, &suspensions))
        })
    }

    pub fn latest_usable_approval(
        &self,
        job_seeker: &JobSeekerId,
    ) -> Result<Option<Approval>, ApprovalServiceError> {
        let today = self.clock.today();
        self.store.atomic(|uow| {
            let approvals = uow.approvals_for(job_seeker)?;
            Ok(ledger::latest_usable(&approvals, today).cloned())
        })
    }

    pub fn adjustments(
        &self,
        id: ApprovalId,
    ) -> Result<Vec<ApprovalAdjustment>, ApprovalServiceError> {
        self.store.atomic(|uow| Ok(uow.adjustments_for(id)?))
    }

    pub fn verify_end_date(&self, id: ApprovalId) -> Result<EndDateAudit, ApprovalServiceError> {
        self.store.atomic(|uow| {
            let approval = uow
                .approval(id)?
                .ok_or(IntegrityError::ApprovalMissing(id))?;
            let suspensions = uow.suspensions_for(id)?;
            let prolongations = uow.prolongations_for(id)?;
            let expected =
                ledger::expected_end(&approval, &suspensions, &prolongations, &self.policy)?;
            Ok(EndDateAudit {
                approval: id,
                stored: approval.end_at,
                expected,
            })
        })
    }

    pub fn create_suspension(
        &self,
        request: NewSuspension,
    ) -> Result<Suspension, ApprovalServiceError> {
        let today = self.clock.today();
        let now = self.clock.now();
        let draft = SuspensionDraft {
            start_at: request.start_at,
            end_at: request.end_at,
            reason: request.reason,
            reason_explanation: request.reason_explanation.clone(),
        };

        let (suspension, end_at) = self.store.atomic(|uow| {
            let mut approval = ledger::lock(uow, request.approval)?;
            let others = uow.suspensions_for(approval.id)?;
            validate_suspension(
                &draft,
                &SuspensionCheck {
                    approval: &approval,
                    others: &others,
                    today,
                    policy: &self.policy,
                    previous_reason: None,
                },
            )?;

            let suspension = Suspension {
                id: SuspensionId::new(),
                approval: approval.id,
                start_at: draft.start_at,
                end_at: draft.end_at,
                reason: draft.reason,
                reason_explanation: draft.reason_explanation.clone(),
                created_by: request.created_by.clone(),
                created_at: now,
                updated_at: now,
            };
            uow.insert_suspension(suspension.clone())?;
            ledger::shift_end(
                uow,
                &mut approval,
                suspension.delta_days(),
                AdjustmentCause::SuspensionCreated {
                    suspension: suspension.id,
                },
                now,
            )?;
            Ok::<_, ApprovalServiceError>((suspension, approval.end_at))
        })?;

        info!(
            approval = %suspension.approval,
            suspension = %suspension.id,
            reason = suspension.reason.label(),
            %end_at,
            "suspension recorded"
        );
        Ok(suspension)
    }

    pub fn update_suspension(
        &self,
        id: SuspensionId,
        draft: SuspensionDraft,
    ) -> Result<Suspension, ApprovalServiceError> {
        let today = self.clock.today();
        let now = self.clock.now();

        self.store.atomic(|uow| {
            let mut suspension = uow.suspension(id)?.ok_or(SuspensionError::NotFound(id))?;
            let mut approval = ledger::lock(uow, suspension.approval)?;
            let others: Vec<Suspension> = uow
                .suspensions_for(approval.id)?
                .into_iter()
                .filter(|other| other.id != id)
                .collect();
            validate_suspension(
                &draft,
                &SuspensionCheck {
                    approval: &approval,
                    others: &others,
                    today,
                    policy: &self.policy,
                    previous_reason: Some(suspension.reason),
                },
            )?;

            let old_delta = suspension.delta_days();
            suspension.start_at = draft.start_at;
            suspension.end_at = draft.end_at;
            suspension.reason = draft.reason;
            suspension.reason_explanation = draft.reason_explanation.clone();
            suspension.updated_at = now;
            uow.save_suspension(&suspension)?;

            ledger::shift_end(
                uow,
                &mut approval,
                -old_delta,
                AdjustmentCause::SuspensionRevised { suspension: id },
                now,
            )?;
            ledger::shift_end(
                uow,
                &mut approval,
                suspension.delta_days(),
                AdjustmentCause::SuspensionUpdated { suspension: id },
                now,
            )?;
            Ok(suspension)
        })
    }

    pub fn delete_suspension(&self, id: SuspensionId) -> Result<(), ApprovalServiceError> {
        let now = self.clock.now();
        self.store.atomic(|uow| {
            let suspension = uow.suspension(id)?.ok_or(SuspensionError::NotFound(id))?;
            let mut approval = ledger::lock(uow, suspension.approval)?;
            uow.delete_suspension(id)?;
            ledger::shift_end(
                uow,
                &mut approval,
                -suspension.delta_days(),
                AdjustmentCause::SuspensionDeleted { suspension: id },
                now,
            )
        })?;
        info!(suspension = %id, "suspension deleted");
        Ok(())
    }

    pub fn create_prolongation(
        &self,
        request: NewProlongation,
    ) -> Result<Prolongation, ApprovalServiceError> {
        let now = self.clock.now();
        let draft = ProlongationDraft {
            start_at: request.start_at,
            end_at: request.end_at,
            reason: request.reason,
            reason_explanation: request.reason_explanation.clone(),
        };

        let (prolongation, end_at) = self.store.atomic(|uow| {
            let mut approval = ledger::lock(uow, request.approval)?;
            let others = uow.prolongations_for(approval.id)?;
            validate_prolongation(
                &draft,
                &ProlongationCheck {
                    approval: &approval,
                    others: &others,
                    previous_reason: None,
                },
            )?;

            let prolongation = Prolongation {
                id: ProlongationId::new(),
                approval: approval.id,
                start_at: draft.start_at,
                end_at: draft.end_at,
                reason: draft.reason,
                reason_explanation: draft.reason_explanation.clone(),
                declared_by: request.declared_by.clone(),
                created_at: now,
                updated_at: now,
            };
            uow.insert_prolongation(prolongation.clone())?;
            ledger::shift_end(
                uow,
                &mut approval,
                prolongation.delta_days(),
                AdjustmentCause::ProlongationCreated {
                    prolongation: prolongation.id,
                },
                now,
            )?;
            Ok::<_, ApprovalServiceError>((prolongation, approval.end_at))
        })?;

        info!(
            approval = %prolongation.approval,
            prolongation = %prolongation.id,
            reason = prolongation.reason.label(),
            %end_at,
            "prolongation recorded"
        );
        Ok(prolongation)
    }

    pub fn update_prolongation(
        &self,
        id: ProlongationId,
        draft: ProlongationDraft,
    ) -> Result<Prolongation, ApprovalServiceError> {
        let now = self.clock.now();
        self.store.atomic(|uow| {
            let mut prolongation = uow
                .prolongation(id)?
                .ok_or(ProlongationError::NotFound(id))?;
            let mut approval = ledger::lock(uow, prolongation.approval)?;
            let others: Vec<Prolongation> = uow
                .prolongations_for(approval.id)?
                .into_iter()
                .filter(|other| other.id != id)
                .collect();
            validate_prolongation(
                &draft,
                &ProlongationCheck {
                    approval: &approval,
                    others: &others,
                    previous_reason: Some(prolongation.reason),
                },
            )?;

            let old_delta = prolongation.delta_days();
            prolongation.start_at = draft.start_at;
            prolongation.end_at = draft.end_at;
            prolongation.reason = draft.reason;
            prolongation.reason_explanation = draft.reason_explanation.clone();
            prolongation.updated_at = now;
            uow.save_prolongation(&prolongation)?;

            ledger::shift_end(
                uow,
                &mut approval,
                -old_delta,
                AdjustmentCause::ProlongationRevised { prolongation: id },
                now,
            )?;
            ledger::shift_end(
                uow,
                &mut approval,
                prolongation.delta_days(),
                AdjustmentCause::ProlongationUpdated { prolongation: id },
                now,
            )?;
            Ok(prolongation)
        })
    }

    pub fn delete_prolongation(&self, id: ProlongationId) -> Result<(), ApprovalServiceError> {
        let now = self.clock.now();
        self.store.atomic(|uow| {
            let prolongation = uow
                .prolongation(id)?
                .ok_or(ProlongationError::NotFound(id))?;
            let mut approval = ledger::lock(uow, prolongation.approval)?;
            uow.delete_prolongation(id)?;
            ledger::shift_end(
                uow,
                &mut approval,
                -prolongation.delta_days(),
                AdjustmentCause::ProlongationDeleted { prolongation: id },
                now,
            )
        })?;
        info!(prolongation = %id, "prolongation deleted");
        Ok(())
    }

    /// Administrative removal: dependents go with it, applications are detached.
    pub fn delete_approval(&self, id: ApprovalId) -> Result<(), ApprovalServiceError> {
        let now = self.clock.now();
        self.store.atomic(|uow| {
            let approval = ledger::lock(uow, id)?;
            ledger::remove(uow, &approval, now)
        })?;
        info!(approval = %id, "approval deleted");
        Ok(())
    }
}

/// Error raised by the approval service.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalServiceError {
    #[error(transparent)]
    Suspension(#[from] SuspensionError),
    #[error(transparent)]
    Prolongation(#[from] ProlongationError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<IntervalError> for ApprovalServiceError {
    fn from(value: IntervalError) -> Self {
        Self::Integrity(IntegrityError::Interval(value))
    }
}

impl ApprovalServiceError {
    pub const fn code(&self) -> &'static str {
        match self {
            ApprovalServiceError::Suspension(err) => err.code(),
            ApprovalServiceError::Prolongation(err) => err.code(),
            ApprovalServiceError::Integrity(err) => err.code(),
            ApprovalServiceError::Repository(err) => err.code(),
        }
    }

    /// Only lock contention is worth retrying, after re-reading fresh state.
    pub const fn is_retryable(&self) -> bool {
        match self {
            ApprovalServiceError::Repository(err) => err.is_retryable(),
            _ => false,
        }
    }
}
