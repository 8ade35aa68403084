//! Transactional storage port.
//!
//! Every workflow mutation runs inside [`Store::atomic`]: the closure receives a unit of
//! work and its writes become visible only when it returns `Ok`. Implementations must
//! serialize transactions that touch the same approval at least as strongly as a row lock.

mod memory;

pub use memory::{InMemoryStore, SnapshotError, StoreSnapshot};

use crate::workflows::approvals::{Approval, ApprovalAdjustment, Prolongation, Suspension};
use crate::workflows::eligibility::EligibilityDiagnosis;
use crate::workflows::ids::{
    ApprovalId, DiagnosisId, JobApplicationId, JobSeekerId, ProlongationId, SuspensionId,
};
use crate::workflows::job_applications::{JobApplication, JobApplicationState};
use crate::workflows::job_seekers::JobSeekerProfile;

pub trait Store: Send + Sync {
    fn atomic<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Everything a transaction may read or write.
pub trait UnitOfWork:
    ApprovalRepository + EligibilityRepository + JobApplicationRepository
{
}

impl<T> UnitOfWork for T where
    T: ApprovalRepository + EligibilityRepository + JobApplicationRepository
{
}

/// Approvals and the dependents that move their end date.
pub trait ApprovalRepository {
    fn approval(&self, id: ApprovalId) -> Result<Option<Approval>, RepositoryError>;
    /// Reads the approval for update. Fails with `NotFound` once it has been deleted.
    fn lock_approval(&mut self, id: ApprovalId) -> Result<Approval, RepositoryError>;
    fn approvals_for(&self, job_seeker: &JobSeekerId) -> Result<Vec<Approval>, RepositoryError>;
    fn last_approval_number(&self, prefix: &str) -> Result<Option<String>, RepositoryError>;
    /// Fails with `Conflict` when the id or number is taken.
    fn insert_approval(&mut self, approval: Approval) -> Result<(), RepositoryError>;
    fn save_approval(&mut self, approval: &Approval) -> Result<(), RepositoryError>;
    fn delete_approval(&mut self, id: ApprovalId) -> Result<(), RepositoryError>;

    fn suspension(&self, id: SuspensionId) -> Result<Option<Suspension>, RepositoryError>;
    fn suspensions_for(&self, approval: ApprovalId) -> Result<Vec<Suspension>, RepositoryError>;
    fn insert_suspension(&mut self, suspension: Suspension) -> Result<(), RepositoryError>;
    fn save_suspension(&mut self, suspension: &Suspension) -> Result<(), RepositoryError>;
    fn delete_suspension(&mut self, id: SuspensionId) -> Result<(), RepositoryError>;

    fn prolongation(&self, id: ProlongationId) -> Result<Option<Prolongation>, RepositoryError>;
    fn prolongations_for(
        &self,
        approval: ApprovalId,
    ) -> Result<Vec<Prolongation>, RepositoryError>;
    fn insert_prolongation(&mut self, prolongation: Prolongation) -> Result<(), RepositoryError>;
    fn save_prolongation(&mut self, prolongation: &Prolongation) -> Result<(), RepositoryError>;
    fn delete_prolongation(&mut self, id: ProlongationId) -> Result<(), RepositoryError>;

    /// Append-only audit trail of end date adjustments.
    fn record_adjustment(&mut self, adjustment: ApprovalAdjustment) -> Result<(), RepositoryError>;
    fn adjustments_for(
        &self,
        approval: ApprovalId,
    ) -> Result<Vec<ApprovalAdjustment>, RepositoryError>;
}

pub trait EligibilityRepository {
    fn job_seeker(&self, id: &JobSeekerId) -> Result<Option<JobSeekerProfile>, RepositoryError>;
    fn upsert_job_seeker(&mut self, profile: JobSeekerProfile) -> Result<(), RepositoryError>;

    fn diagnosis(&self, id: DiagnosisId) -> Result<Option<EligibilityDiagnosis>, RepositoryError>;
    fn diagnoses_for(
        &self,
        job_seeker: &JobSeekerId,
    ) -> Result<Vec<EligibilityDiagnosis>, RepositoryError>;
    /// Diagnoses holding a certifiable criterion that has no certification result yet.
    fn diagnoses_pending_certification(&self) -> Result<Vec<DiagnosisId>, RepositoryError>;
    fn insert_diagnosis(&mut self, diagnosis: EligibilityDiagnosis) -> Result<(), RepositoryError>;
    fn save_diagnosis(&mut self, diagnosis: &EligibilityDiagnosis) -> Result<(), RepositoryError>;
}

pub trait JobApplicationRepository {
    fn job_application(
        &self,
        id: JobApplicationId,
    ) -> Result<Option<JobApplication>, RepositoryError>;
    fn job_applications_for_seeker(
        &self,
        job_seeker: &JobSeekerId,
    ) -> Result<Vec<JobApplication>, RepositoryError>;
    fn job_applications_for_approval(
        &self,
        approval: ApprovalId,
    ) -> Result<Vec<JobApplication>, RepositoryError>;
    fn job_applications_in_states(
        &self,
        states: &[JobApplicationState],
    ) -> Result<Vec<JobApplicationId>, RepositoryError>;
    fn insert_job_application(
        &mut self,
        application: JobApplication,
    ) -> Result<(), RepositoryError>;
    fn save_job_application(&mut self, application: &JobApplication)
        -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("timed out waiting for a conflicting transaction")]
    LockTimeout,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::LockTimeout)
    }

    pub const fn code(&self) -> &'static str {
        match self {
            RepositoryError::Conflict => "repository_conflict",
            RepositoryError::NotFound => "repository_not_found",
            RepositoryError::LockTimeout => "lock_timeout",
            RepositoryError::Unavailable(_) => "repository_unavailable",
        }
    }
}
