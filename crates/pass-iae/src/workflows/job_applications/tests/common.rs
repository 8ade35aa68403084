use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;

use crate::clock::FixedClock;
use crate::store::{
    ApprovalRepository, EligibilityRepository, InMemoryStore, JobApplicationRepository, Store,
};
use crate::workflows::approvals::{Approval, ApprovalPolicy, ApprovalService};
use crate::workflows::eligibility::{
    AdministrativeCriterion, CertificationConfig, CertificationRegistry, CertificationRequest,
    CertificationResponse, DiagnosisAuthor, EligibilityDiagnosis, EligibilityPolicy,
    EligibilityService, NewDiagnosis, RegistryError,
};
use crate::workflows::events::{EventPublisher, PublishError, WorkflowEvent};
use crate::workflows::ids::{CompanyId, JobApplicationId, JobSeekerId, OrganizationId, UserId};
use crate::workflows::job_applications::{
    Actor, JobApplication, JobApplicationPolicy, JobApplicationService,
    JobApplicationServiceError, JobApplicationState, NewJobApplication, SenderKind,
    TransitionPayload,
};
use crate::workflows::job_seekers::JobSeekerProfile;

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn employer() -> Actor {
    Actor::employer(UserId::new("employer-1"))
}

pub(super) fn prescriber() -> DiagnosisAuthor {
    DiagnosisAuthor::AuthorizedPrescriber {
        user: UserId::new("prescriber-1"),
        organization: OrganizationId::new("org-1"),
    }
}

pub(super) fn profile(id: &str) -> JobSeekerProfile {
    JobSeekerProfile {
        id: JobSeekerId::new(id),
        first_name: "Karim".to_string(),
        last_name: "Benali".to_string(),
        birthdate: Some(date(1988, 9, 3)),
        birth_place: Some("69123".to_string()),
        birth_country: Some("FR".to_string()),
        nir: Some("188096912312345".to_string()),
        lack_of_nir_reason: None,
    }
}

/// Registry answering from a script, then timing out once the script is exhausted.
#[derive(Debug, Default)]
pub(super) struct ScriptedRegistry {
    answers: Mutex<VecDeque<Result<CertificationResponse, RegistryError>>>,
    calls: Mutex<usize>,
}

impl ScriptedRegistry {
    pub(super) fn push(&self, answer: Result<CertificationResponse, RegistryError>) {
        self.answers.lock().expect("answers lock").push_back(answer);
    }

    pub(super) fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl CertificationRegistry for ScriptedRegistry {
    fn certify(
        &self,
        _request: &CertificationRequest,
    ) -> Result<CertificationResponse, RegistryError> {
        *self.calls.lock().expect("calls lock") += 1;
        self.answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .unwrap_or(Err(RegistryError::Timeout))
    }
}

#[derive(Debug, Default)]
pub(super) struct RecordingPublisher {
    events: Mutex<Vec<WorkflowEvent>>,
    failing: bool,
}

impl RecordingPublisher {
    pub(super) fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub(super) fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: WorkflowEvent) -> Result<(), PublishError> {
        if self.failing {
            return Err(PublishError::Transport("mail relay down".to_string()));
        }
        self.events.lock().expect("events lock").push(event);
        Ok(())
    }
}

pub(super) type Eligibility =
    EligibilityService<InMemoryStore, dyn CertificationRegistry, FixedClock>;
pub(super) type Service =
    JobApplicationService<InMemoryStore, dyn CertificationRegistry, FixedClock, RecordingPublisher>;

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) registry: Arc<ScriptedRegistry>,
    pub(super) publisher: Arc<RecordingPublisher>,
    pub(super) approvals: ApprovalService<InMemoryStore, FixedClock>,
    pub(super) eligibility: Arc<Eligibility>,
    pub(super) service: Service,
}

pub(super) fn harness(today: NaiveDate) -> Harness {
    harness_with(today, RecordingPublisher::default())
}

pub(super) fn harness_with(today: NaiveDate, publisher: RecordingPublisher) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::on(today));
    let registry = Arc::new(ScriptedRegistry::default());
    let publisher = Arc::new(publisher);
    let shared_registry: Arc<dyn CertificationRegistry> = registry.clone();

    let eligibility = Arc::new(EligibilityService::new(
        store.clone(),
        shared_registry,
        clock.clone(),
        EligibilityPolicy::default(),
        CertificationConfig {
            max_attempts: 3,
            retry_backoff: Duration::ZERO,
        },
    ));
    let approvals = ApprovalService::new(store.clone(), clock.clone(), ApprovalPolicy::default());
    let service = JobApplicationService::new(
        store.clone(),
        clock.clone(),
        eligibility.clone(),
        publisher.clone(),
        ApprovalPolicy::default(),
        JobApplicationPolicy::default(),
    );
    Harness {
        store,
        clock,
        registry,
        publisher,
        approvals,
        eligibility,
        service,
    }
}

impl Harness {
    pub(super) fn register(&self, profile: JobSeekerProfile) -> JobSeekerId {
        let id = profile.id.clone();
        self.store
            .atomic(|uow| uow.upsert_job_seeker(profile))
            .expect("job seeker stored");
        id
    }

    pub(super) fn diagnose(
        &self,
        job_seeker: &JobSeekerId,
        author: DiagnosisAuthor,
        criteria: Vec<AdministrativeCriterion>,
    ) -> EligibilityDiagnosis {
        self.eligibility
            .record_diagnosis(NewDiagnosis {
                job_seeker: job_seeker.clone(),
                author,
                criteria,
            })
            .expect("diagnosis recorded")
    }

    pub(super) fn submit(&self, job_seeker: &JobSeekerId, company: &str) -> JobApplication {
        self.service
            .submit(NewJobApplication {
                job_seeker: job_seeker.clone(),
                to_company: CompanyId::new(company),
                sender: UserId::new("prescriber-1"),
                sender_kind: SenderKind::Prescriber,
                selected_jobs: vec!["Agent d'entretien".to_string()],
            })
            .expect("application submitted")
    }

    pub(super) fn process(&self, id: JobApplicationId) -> JobApplication {
        self.service
            .transition(
                id,
                JobApplicationState::Processing,
                &employer(),
                TransitionPayload::default(),
            )
            .expect("application processed")
    }

    pub(super) fn accept(
        &self,
        id: JobApplicationId,
        hiring_start_at: NaiveDate,
    ) -> Result<JobApplication, JobApplicationServiceError> {
        self.service.transition(
            id,
            JobApplicationState::Accepted,
            &employer(),
            TransitionPayload::hiring(hiring_start_at, None),
        )
    }

    pub(super) fn approvals_of(&self, job_seeker: &JobSeekerId) -> Vec<Approval> {
        self.store
            .atomic(|uow| uow.approvals_for(job_seeker))
            .expect("approvals listed")
    }

    /// Overwrites a stored application, for arranging fixtures.
    pub(super) fn save(&self, application: &JobApplication) {
        self.store
            .atomic(|uow| uow.save_job_application(application))
            .expect("application saved");
    }
}
