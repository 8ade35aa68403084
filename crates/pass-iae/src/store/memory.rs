use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{
    ApprovalRepository, EligibilityRepository, JobApplicationRepository, RepositoryError, Store,
    UnitOfWork,
};
use crate::workflows::approvals::{Approval, ApprovalAdjustment, Prolongation, Suspension};
use crate::workflows::eligibility::EligibilityDiagnosis;
use crate::workflows::ids::{
    ApprovalId, DiagnosisId, JobApplicationId, JobSeekerId, ProlongationId, SuspensionId,
};
use crate::workflows::job_applications::{JobApplication, JobApplicationState};
use crate::workflows::job_seekers::JobSeekerProfile;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(2);
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Serialized form of every row held by [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub approvals: Vec<Approval>,
    pub suspensions: Vec<Suspension>,
    pub prolongations: Vec<Prolongation>,
    pub adjustments: Vec<ApprovalAdjustment>,
    pub job_seekers: Vec<JobSeekerProfile>,
    pub diagnoses: Vec<EligibilityDiagnosis>,
    pub job_applications: Vec<JobApplication>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    approvals: BTreeMap<ApprovalId, Approval>,
    suspensions: BTreeMap<SuspensionId, Suspension>,
    prolongations: BTreeMap<ProlongationId, Prolongation>,
    adjustments: Vec<ApprovalAdjustment>,
    job_seekers: BTreeMap<JobSeekerId, JobSeekerProfile>,
    diagnoses: BTreeMap<DiagnosisId, EligibilityDiagnosis>,
    job_applications: BTreeMap<JobApplicationId, JobApplication>,
}

impl From<StoreSnapshot> for StoreState {
    fn from(snapshot: StoreSnapshot) -> Self {
        Self {
            approvals: snapshot
                .approvals
                .into_iter()
                .map(|row| (row.id, row))
                .collect(),
            suspensions: snapshot
                .suspensions
                .into_iter()
                .map(|row| (row.id, row))
                .collect(),
            prolongations: snapshot
                .prolongations
                .into_iter()
                .map(|row| (row.id, row))
                .collect(),
            adjustments: snapshot.adjustments,
            job_seekers: snapshot
                .job_seekers
                .into_iter()
                .map(|row| (row.id.clone(), row))
                .collect(),
            diagnoses: snapshot
                .diagnoses
                .into_iter()
                .map(|row| (row.id, row))
                .collect(),
            job_applications: snapshot
                .job_applications
                .into_iter()
                .map(|row| (row.id, row))
                .collect(),
        }
    }
}

impl From<&StoreState> for StoreSnapshot {
    fn from(state: &StoreState) -> Self {
        Self {
            approvals: state.approvals.values().cloned().collect(),
            suspensions: state.suspensions.values().cloned().collect(),
            prolongations: state.prolongations.values().cloned().collect(),
            adjustments: state.adjustments.clone(),
            job_seekers: state.job_seekers.values().cloned().collect(),
            diagnoses: state.diagnoses.values().cloned().collect(),
            job_applications: state.job_applications.values().cloned().collect(),
        }
    }
}

/// Store keeping every row in memory behind one mutex.
///
/// Transactions run against a private copy of the state which replaces the shared state
/// only when the closure succeeds, so a failed transaction leaves nothing behind.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(StoreSnapshot::default())
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot.into()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, RepositoryError> {
        let guard = self.acquire()?;
        Ok(StoreSnapshot::from(&*guard))
    }

    /// Loads a JSON snapshot, starting empty when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, SnapshotError> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
                Ok(Self::from_snapshot(snapshot))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(err) => Err(SnapshotError::Io(err)),
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = self.snapshot()?;
        let body = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, body)?;
        Ok(())
    }

    fn acquire(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(RepositoryError::Unavailable(
                        "store mutex poisoned".to_string(),
                    ))
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(RepositoryError::LockTimeout);
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
            }
        }
    }
}

impl Store for InMemoryStore {
    fn atomic<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self.acquire()?;
        let mut working = guard.clone();
        let outcome = work(&mut working)?;
        *guard = working;
        Ok(outcome)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot is not valid json: {0}")]
    Format(#[from] serde_json::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn replace<K: Ord, V: Clone>(
    rows: &mut BTreeMap<K, V>,
    key: K,
    value: &V,
) -> Result<(), RepositoryError> {
    match rows.get_mut(&key) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(RepositoryError::NotFound),
    }
}

fn insert_new<K: Ord, V>(rows: &mut BTreeMap<K, V>, key: K, value: V) -> Result<(), RepositoryError> {
    if rows.contains_key(&key) {
        return Err(RepositoryError::Conflict);
    }
    rows.insert(key, value);
    Ok(())
}

impl ApprovalRepository for StoreState {
    fn approval(&self, id: ApprovalId) -> Result<Option<Approval>, RepositoryError> {
        Ok(self.approvals.get(&id).cloned())
    }

    fn lock_approval(&mut self, id: ApprovalId) -> Result<Approval, RepositoryError> {
        self.approvals
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    fn approvals_for(&self, job_seeker: &JobSeekerId) -> Result<Vec<Approval>, RepositoryError> {
        Ok(self
            .approvals
            .values()
            .filter(|approval| &approval.job_seeker == job_seeker)
            .cloned()
            .collect())
    }

    fn last_approval_number(&self, prefix: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .approvals
            .values()
            .map(|approval| approval.number.as_str())
            .filter(|number| number.starts_with(prefix))
            .max()
            .map(str::to_string))
    }

    fn insert_approval(&mut self, approval: Approval) -> Result<(), RepositoryError> {
        if self
            .approvals
            .values()
            .any(|existing| existing.number == approval.number)
        {
            return Err(RepositoryError::Conflict);
        }
        insert_new(&mut self.approvals, approval.id, approval)
    }

    fn save_approval(&mut self, approval: &Approval) -> Result<(), RepositoryError> {
        replace(&mut self.approvals, approval.id, approval)
    }

    fn delete_approval(&mut self, id: ApprovalId) -> Result<(), RepositoryError> {
        self.approvals
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn suspension(&self, id: SuspensionId) -> Result<Option<Suspension>, RepositoryError> {
        Ok(self.suspensions.get(&id).cloned())
    }

    fn suspensions_for(&self, approval: ApprovalId) -> Result<Vec<Suspension>, RepositoryError> {
        let mut rows: Vec<Suspension> = self
            .suspensions
            .values()
            .filter(|suspension| suspension.approval == approval)
            .cloned()
            .collect();
        rows.sort_by_key(|suspension| suspension.start_at);
        Ok(rows)
    }

    fn insert_suspension(&mut self, suspension: Suspension) -> Result<(), RepositoryError> {
        insert_new(&mut self.suspensions, suspension.id, suspension)
    }

    fn save_suspension(&mut self, suspension: &Suspension) -> Result<(), RepositoryError> {
        replace(&mut self.suspensions, suspension.id, suspension)
    }

    fn delete_suspension(&mut self, id: SuspensionId) -> Result<(), RepositoryError> {
        self.suspensions
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn prolongation(&self, id: ProlongationId) -> Result<Option<Prolongation>, RepositoryError> {
        Ok(self.prolongations.get(&id).cloned())
    }

    fn prolongations_for(
        &self,
        approval: ApprovalId,
    ) -> Result<Vec<Prolongation>, RepositoryError> {
        let mut rows: Vec<Prolongation> = self
            .prolongations
            .values()
            .filter(|prolongation| prolongation.approval == approval)
            .cloned()
            .collect();
        rows.sort_by_key(|prolongation| prolongation.start_at);
        Ok(rows)
    }

    fn insert_prolongation(&mut self, prolongation: Prolongation) -> Result<(), RepositoryError> {
        insert_new(&mut self.prolongations, prolongation.id, prolongation)
    }

    fn save_prolongation(&mut self, prolongation: &Prolongation) -> Result<(), RepositoryError> {
        replace(&mut self.prolongations, prolongation.id, prolongation)
    }

    fn delete_prolongation(&mut self, id: ProlongationId) -> Result<(), RepositoryError> {
        self.prolongations
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn record_adjustment(&mut self, adjustment: ApprovalAdjustment) -> Result<(), RepositoryError> {
        self.adjustments.push(adjustment);
        Ok(())
    }

    fn adjustments_for(
        &self,
        approval: ApprovalId,
    ) -> Result<Vec<ApprovalAdjustment>, RepositoryError> {
        Ok(self
            .adjustments
            .iter()
            .filter(|adjustment| adjustment.approval == approval)
            .cloned()
            .collect())
    }
}

impl EligibilityRepository for StoreState {
    fn job_seeker(&self, id: &JobSeekerId) -> Result<Option<JobSeekerProfile>, RepositoryError> {
        Ok(self.job_seekers.get(id).cloned())
    }

    fn upsert_job_seeker(&mut self, profile: JobSeekerProfile) -> Result<(), RepositoryError> {
        self.job_seekers.insert(profile.id.clone(), profile);
        Ok(())
    }

    fn diagnosis(&self, id: DiagnosisId) -> Result<Option<EligibilityDiagnosis>, RepositoryError> {
        Ok(self.diagnoses.get(&id).cloned())
    }

    fn diagnoses_for(
        &self,
        job_seeker: &JobSeekerId,
    ) -> Result<Vec<EligibilityDiagnosis>, RepositoryError> {
        Ok(self
            .diagnoses
            .values()
            .filter(|diagnosis| &diagnosis.job_seeker == job_seeker)
            .cloned()
            .collect())
    }

    fn diagnoses_pending_certification(&self) -> Result<Vec<DiagnosisId>, RepositoryError> {
        Ok(self
            .diagnoses
            .values()
            .filter(|diagnosis| diagnosis.has_pending_certification())
            .map(|diagnosis| diagnosis.id)
            .collect())
    }

    fn insert_diagnosis(&mut self, diagnosis: EligibilityDiagnosis) -> Result<(), RepositoryError> {
        insert_new(&mut self.diagnoses, diagnosis.id, diagnosis)
    }

    fn save_diagnosis(&mut self, diagnosis: &EligibilityDiagnosis) -> Result<(), RepositoryError> {
        replace(&mut self.diagnoses, diagnosis.id, diagnosis)
    }
}

impl JobApplicationRepository for StoreState {
    fn job_application(
        &self,
        id: JobApplicationId,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        Ok(self.job_applications.get(&id).cloned())
    }

    fn job_applications_for_seeker(
        &self,
        job_seeker: &JobSeekerId,
    ) -> Result<Vec<JobApplication>, RepositoryError> {
        Ok(self
            .job_applications
            .values()
            .filter(|application| &application.job_seeker == job_seeker)
            .cloned()
            .collect())
    }

    fn job_applications_for_approval(
        &self,
        approval: ApprovalId,
    ) -> Result<Vec<JobApplication>, RepositoryError> {
        Ok(self
            .job_applications
            .values()
            .filter(|application| application.approval == Some(approval))
            .cloned()
            .collect())
    }

    fn job_applications_in_states(
        &self,
        states: &[JobApplicationState],
    ) -> Result<Vec<JobApplicationId>, RepositoryError> {
        Ok(self
            .job_applications
            .values()
            .filter(|application| states.contains(&application.state))
            .map(|application| application.id)
            .collect())
    }

    fn insert_job_application(
        &mut self,
        application: JobApplication,
    ) -> Result<(), RepositoryError> {
        insert_new(&mut self.job_applications, application.id, application)
    }

    fn save_job_application(
        &mut self,
        application: &JobApplication,
    ) -> Result<(), RepositoryError> {
        replace(&mut self.job_applications, application.id, application)
    }
}
