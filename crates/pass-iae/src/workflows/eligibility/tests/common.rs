use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use crate::clock::FixedClock;
use crate::store::{EligibilityRepository, InMemoryStore, Store};
use crate::workflows::eligibility::{
    AdministrativeCriterion, CertificationConfig, CertificationRegistry, CertificationRequest,
    CertificationResponse, DiagnosisAuthor, EligibilityDiagnosis, EligibilityPolicy,
    EligibilityService, NewDiagnosis, RegistryError,
};
use crate::workflows::ids::{CompanyId, JobSeekerId, OrganizationId, UserId};
use crate::workflows::job_seekers::JobSeekerProfile;

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn prescriber() -> DiagnosisAuthor {
    DiagnosisAuthor::AuthorizedPrescriber {
        user: UserId::new("prescriber-1"),
        organization: OrganizationId::new("org-1"),
    }
}

pub(super) fn employer(company: &str) -> DiagnosisAuthor {
    DiagnosisAuthor::Employer {
        user: UserId::new("employer-1"),
        company: CompanyId::new(company),
    }
}

pub(super) fn profile(id: &str) -> JobSeekerProfile {
    JobSeekerProfile {
        id: JobSeekerId::new(id),
        first_name: "Jeanne".to_string(),
        last_name: "Martin".to_string(),
        birthdate: Some(date(1990, 4, 12)),
        birth_place: Some("75056".to_string()),
        birth_country: Some("FR".to_string()),
        nir: Some("290047505612345".to_string()),
        lack_of_nir_reason: None,
    }
}

pub(super) fn certified_from(start_at: NaiveDate) -> Result<CertificationResponse, RegistryError> {
    Ok(CertificationResponse {
        is_certified: true,
        start_at: Some(start_at),
        raw_response: json!({ "status": "beneficiaire" }),
    })
}

/// Registry answering from a script, recording every request.
#[derive(Debug, Default)]
pub(super) struct ScriptedRegistry {
    answers: Mutex<VecDeque<Result<CertificationResponse, RegistryError>>>,
    calls: Mutex<Vec<CertificationRequest>>,
}

impl ScriptedRegistry {
    pub(super) fn answering(answers: Vec<Result<CertificationResponse, RegistryError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn calls(&self) -> Vec<CertificationRequest> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CertificationRegistry for ScriptedRegistry {
    fn certify(
        &self,
        request: &CertificationRequest,
    ) -> Result<CertificationResponse, RegistryError> {
        self.calls.lock().expect("calls lock").push(request.clone());
        self.answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .unwrap_or_else(|| Err(RegistryError::Unavailable("script exhausted".to_string())))
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) registry: Arc<ScriptedRegistry>,
    pub(super) service: EligibilityService<InMemoryStore, ScriptedRegistry, FixedClock>,
}

pub(super) fn harness(
    today: NaiveDate,
    answers: Vec<Result<CertificationResponse, RegistryError>>,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::on(today));
    let registry = Arc::new(ScriptedRegistry::answering(answers));
    let service = EligibilityService::new(
        store.clone(),
        registry.clone(),
        clock.clone(),
        EligibilityPolicy::default(),
        CertificationConfig {
            max_attempts: 3,
            retry_backoff: Duration::ZERO,
        },
    );
    Harness {
        store,
        clock,
        registry,
        service,
    }
}

impl Harness {
    pub(super) fn register(&self, profile: JobSeekerProfile) {
        self.store
            .atomic(|uow| uow.upsert_job_seeker(profile))
            .expect("job seeker stored");
    }

    pub(super) fn diagnose(
        &self,
        job_seeker: &str,
        author: DiagnosisAuthor,
        criteria: Vec<AdministrativeCriterion>,
    ) -> EligibilityDiagnosis {
        self.service
            .record_diagnosis(NewDiagnosis {
                job_seeker: JobSeekerId::new(job_seeker),
                author,
                criteria,
            })
            .expect("diagnosis recorded")
    }
}
