use std::sync::Arc;

use tracing::{info, warn};

use super::certification::{
    apply_result, call_with_retries, CallResult, CertificationConfig, CertificationIdentity,
    CertificationReport, IdentityError,
};
use super::domain::{
    AdministrativeCriterion, DiagnosisAuthor, DiagnosisError, EligibilityDiagnosis,
    EligibilityPolicy, SelectedCriterion,
};
use super::registry::CertificationRegistry;
use super::selection;
use crate::clock::Clock;
use crate::store::{ApprovalRepository, EligibilityRepository, RepositoryError, Store};
use crate::workflows::ids::{CompanyId, DiagnosisId, JobSeekerId};

#[derive(Debug, Clone)]
pub struct NewDiagnosis {
    pub job_seeker: JobSeekerId,
    pub author: DiagnosisAuthor,
    pub criteria: Vec<AdministrativeCriterion>,
}

/// Records diagnoses, picks the one standing for a job seeker, and certifies criteria.
pub struct EligibilityService<S, R, C>
where
    R: ?Sized,
{
    store: Arc<S>,
    registry: Arc<R>,
    clock: Arc<C>,
    policy: EligibilityPolicy,
    certification: CertificationConfig,
}

impl<S, R, C> EligibilityService<S, R, C>
where
    S: Store + 'static,
    R: CertificationRegistry + ?Sized + 'static,
    C: Clock + 'static,
{
    pub fn new(
        store: Arc<S>,
        registry: Arc<R>,
        clock: Arc<C>,
        policy: EligibilityPolicy,
        certification: CertificationConfig,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            policy,
            certification,
        }
    }

    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    pub fn record_diagnosis(
        &self,
        request: NewDiagnosis,
    ) -> Result<EligibilityDiagnosis, EligibilityServiceError> {
        if !request.author.is_authorized_prescriber() && request.criteria.is_empty() {
            return Err(DiagnosisError::NoCriteria.into());
        }
        let now = self.clock.now();
        let expires_at = self
            .policy
            .expiry_for(&request.author, now.date_naive())
            .map_err(DiagnosisError::from)?;

        let mut criteria: Vec<SelectedCriterion> = Vec::with_capacity(request.criteria.len());
        for kind in request.criteria {
            if !criteria.iter().any(|selected| selected.kind == kind) {
                criteria.push(SelectedCriterion::new(kind));
            }
        }

        let diagnosis = EligibilityDiagnosis {
            id: DiagnosisId::new(),
            job_seeker: request.job_seeker,
            author: request.author,
            criteria,
            created_at: now,
            expires_at,
        };
        self.store.atomic(|uow| {
            if uow.job_seeker(&diagnosis.job_seeker)?.is_none() {
                return Err(DiagnosisError::JobSeekerMissing(diagnosis.job_seeker.clone()).into());
            }
            uow.insert_diagnosis(diagnosis.clone())?;
            Ok::<_, EligibilityServiceError>(())
        })?;

        info!(
            diagnosis = %diagnosis.id,
            job_seeker = %diagnosis.job_seeker,
            author = diagnosis.author.label(),
            certifiable = diagnosis.criteria_can_be_certified(),
            %expires_at,
            "eligibility diagnosis recorded"
        );
        Ok(diagnosis)
    }

    pub fn diagnosis(&self, id: DiagnosisId) -> Result<EligibilityDiagnosis, EligibilityServiceError> {
        self.store.atomic(|uow| {
            uow.diagnosis(id)?
                .ok_or_else(|| DiagnosisError::NotFound(id).into())
        })
    }

    pub fn last_considered_valid(
        &self,
        job_seeker: &JobSeekerId,
        for_company: Option<&CompanyId>,
    ) -> Result<Option<EligibilityDiagnosis>, EligibilityServiceError> {
        let today = self.clock.today();
        self.store.atomic(|uow| {
            let diagnoses = uow.diagnoses_for(job_seeker)?;
            let has_valid_approval = uow
                .approvals_for(job_seeker)?
                .iter()
                .any(|approval| approval.is_valid(today));
            Ok(
                selection::last_considered_valid(
                    &diagnoses,
                    for_company,
                    today,
                    has_valid_approval,
                )
                .cloned(),
            )
        })
    }

    /// Asks the registry about each pending criterion of the diagnosis.
    ///
    /// Registry calls happen outside any transaction; results are written back in a
    /// second one, on a fresh read of the diagnosis.
    pub fn certify_diagnosis(
        &self,
        id: DiagnosisId,
    ) -> Result<CertificationReport, EligibilityServiceError> {
        let (diagnosis, profile) = self.store.atomic(|uow| {
            let diagnosis = uow.diagnosis(id)?.ok_or(DiagnosisError::NotFound(id))?;
            let profile = uow
                .job_seeker(&diagnosis.job_seeker)?
                .ok_or_else(|| DiagnosisError::JobSeekerMissing(diagnosis.job_seeker.clone()))?;
            Ok::<_, EligibilityServiceError>((diagnosis, profile))
        })?;

        let mut report = CertificationReport {
            diagnoses: 1,
            ..CertificationReport::default()
        };
        let pending: Vec<AdministrativeCriterion> = diagnosis
            .criteria
            .iter()
            .filter(|criterion| criterion.is_pending_certification())
            .map(|criterion| criterion.kind)
            .collect();
        if pending.is_empty() {
            return Ok(report);
        }

        let identity = CertificationIdentity::from_profile(&profile)?;
        let results: Vec<CallResult> = pending
            .into_iter()
            .map(|kind| {
                call_with_retries(
                    self.registry.as_ref(),
                    &identity.request_for(kind),
                    &self.certification,
                )
            })
            .collect();

        let now = self.clock.now();
        let grace_days = self.policy.certification_grace_days;
        let outcomes = self.store.atomic(|uow| {
            let mut fresh = uow.diagnosis(id)?.ok_or(DiagnosisError::NotFound(id))?;
            let mut outcomes = Vec::with_capacity(results.len());
            for result in results {
                let Some(criterion) = fresh.criteria.iter_mut().find(|criterion| {
                    criterion.kind == result.criterion && criterion.is_pending_certification()
                }) else {
                    continue;
                };
                outcomes.push(
                    apply_result(criterion, result, now, grace_days)
                        .map_err(DiagnosisError::from)?,
                );
            }
            uow.save_diagnosis(&fresh)?;
            Ok::<_, EligibilityServiceError>(outcomes)
        })?;

        for outcome in outcomes {
            report.record(outcome);
        }
        if report.deferred > 0 {
            warn!(
                diagnosis = %id,
                deferred = report.deferred,
                "some criteria could not be certified yet"
            );
        }
        info!(
            diagnosis = %id,
            certified = report.certified,
            not_certified = report.not_certified,
            "diagnosis certification finished"
        );
        Ok(report)
    }

    /// Runs [`Self::certify_diagnosis`] over every diagnosis still waiting for a result.
    /// A failing diagnosis is logged and skipped; the others proceed.
    pub fn certify_pending(&self) -> Result<CertificationReport, EligibilityServiceError> {
        let pending = self
            .store
            .atomic(|uow| uow.diagnoses_pending_certification())?;
        let mut report = CertificationReport::default();
        for id in pending {
            match self.certify_diagnosis(id) {
                Ok(outcome) => report.merge(outcome),
                Err(err) => {
                    warn!(diagnosis = %id, code = err.code(), error = %err, "certification skipped");
                    report.diagnoses += 1;
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EligibilityServiceError {
    #[error(transparent)]
    Diagnosis(#[from] DiagnosisError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EligibilityServiceError {
    pub const fn code(&self) -> &'static str {
        match self {
            EligibilityServiceError::Diagnosis(err) => err.code(),
            EligibilityServiceError::Identity(err) => err.code(),
            EligibilityServiceError::Repository(err) => err.code(),
        }
    }

    pub const fn is_retryable(&self) -> bool {
        match self {
            EligibilityServiceError::Repository(err) => err.is_retryable(),
            _ => false,
        }
    }
}
