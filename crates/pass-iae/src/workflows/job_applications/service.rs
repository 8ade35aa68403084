use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, warn};

use super::domain::{
    ApprovalDeliveryMode, JobApplication, JobApplicationPolicy, JobApplicationState,
    RefusalReason, SenderKind, AUTO_REJECTABLE_STATES,
};
use super::workflow::{self, Actor, SubmissionError, TransitionError, TransitionKind};
use crate::clock::Clock;
use crate::interval::{shift_date, IntervalError};
use crate::store::{
    ApprovalRepository, EligibilityRepository, JobApplicationRepository, RepositoryError, Store,
    UnitOfWork,
};
use crate::workflows::approvals::ledger::{self, Issuance};
use crate::workflows::approvals::{
    Approval, ApprovalOrigin, ApprovalPolicy, ApprovalServiceError, ApprovalStatus,
    IntegrityError,
};
use crate::workflows::eligibility::{
    last_considered_valid, CertificationRegistry, EligibilityDiagnosis, EligibilityService,
};
use crate::workflows::events::{
    ApprovalIssuedEvent, EventPublisher, TransitionEvent, WorkflowEvent,
};
use crate::workflows::ids::{CompanyId, JobApplicationId, JobSeekerId, UserId};

#[derive(Debug, Clone)]
pub struct NewJobApplication {
    pub job_seeker: JobSeekerId,
    pub to_company: CompanyId,
    pub sender: UserId,
    pub sender_kind: SenderKind,
    pub selected_jobs: Vec<String>,
}

/// Extra data some transitions need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionPayload {
    pub hiring_start_at: Option<NaiveDate>,
    pub hiring_end_at: Option<NaiveDate>,
    pub refusal_reason: Option<RefusalReason>,
}

impl TransitionPayload {
    pub fn hiring(start_at: NaiveDate, end_at: Option<NaiveDate>) -> Self {
        Self {
            hiring_start_at: Some(start_at),
            hiring_end_at: end_at,
            refusal_reason: None,
        }
    }

    pub fn refusal(reason: RefusalReason) -> Self {
        Self {
            refusal_reason: Some(reason),
            ..Self::default()
        }
    }
}

/// Drives job applications through their state machine, including the approval side
/// effects of acceptance and cancellation.
pub struct JobApplicationService<S, R, C, P>
where
    R: ?Sized,
    P: ?Sized,
{
    store: Arc<S>,
    clock: Arc<C>,
    eligibility: Arc<EligibilityService<S, R, C>>,
    publisher: Arc<P>,
    approval_policy: ApprovalPolicy,
    policy: JobApplicationPolicy,
}

struct Moment {
    today: NaiveDate,
    now: DateTime<Utc>,
}

impl<S, R, C, P> JobApplicationService<S, R, C, P>
where
    S: Store + 'static,
    R: CertificationRegistry + ?Sized + 'static,
    C: Clock + 'static,
    P: EventPublisher + ?Sized + 'static,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<C>,
        eligibility: Arc<EligibilityService<S, R, C>>,
        publisher: Arc<P>,
        approval_policy: ApprovalPolicy,
        policy: JobApplicationPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            eligibility,
            publisher,
            approval_policy,
            policy,
        }
    }

    pub fn policy(&self) -> &JobApplicationPolicy {
        &self.policy
    }

    pub fn get(&self, id: JobApplicationId) -> Result<JobApplication, JobApplicationServiceError> {
        self.store.atomic(|uow| {
            uow.job_application(id)?
                .ok_or_else(|| TransitionError::NotFound(id).into())
        })
    }

    pub fn ids_in_states(
        &self,
        states: &[JobApplicationState],
    ) -> Result<Vec<JobApplicationId>, JobApplicationServiceError> {
        Ok(self
            .store
            .atomic(|uow| uow.job_applications_in_states(states))?)
    }

    pub fn submit(
        &self,
        request: NewJobApplication,
    ) -> Result<JobApplication, JobApplicationServiceError> {
        let today = self.clock.today();
        let now = self.clock.now();

        let application = self.store.atomic(|uow| {
            if uow.job_seeker(&request.job_seeker)?.is_none() {
                return Err(SubmissionError::JobSeekerMissing(request.job_seeker.clone()).into());
            }
            if let Some(existing) = uow
                .job_applications_for_seeker(&request.job_seeker)?
                .into_iter()
                .find(|other| other.is_pending() && other.to_company == request.to_company)
            {
                return Err(SubmissionError::DuplicatePending {
                    existing: existing.id,
                }
                .into());
            }
            let approvals = uow.approvals_for(&request.job_seeker)?;
            if let Some(latest) = ledger::latest_usable(&approvals, today) {
                let suspensions = uow.suspensions_for(latest.id)?;
                if latest.status(today, &suspensions) == ApprovalStatus::Suspended {
                    return Err(SubmissionError::ApprovalSuspended {
                        approval: latest.id,
                    }
                    .into());
                }
            }

            let application = JobApplication {
                id: JobApplicationId::new(),
                job_seeker: request.job_seeker.clone(),
                to_company: request.to_company.clone(),
                sender: request.sender.clone(),
                sender_kind: request.sender_kind,
                selected_jobs: request.selected_jobs.clone(),
                state: JobApplicationState::New,
                created_at: now,
                updated_at: now,
                last_modification_at: now,
                hiring_start_at: None,
                hiring_end_at: None,
                approval: None,
                eligibility_diagnosis: None,
                refusal_reason: None,
                approval_delivery_mode: None,
                archived_at: None,
                archived_by: None,
            };
            uow.insert_job_application(application.clone())?;
            Ok::<_, JobApplicationServiceError>(application)
        })?;

        info!(
            job_application = %application.id,
            job_seeker = %application.job_seeker,
            company = %application.to_company,
            sender_kind = application.sender_kind.label(),
            "job application submitted"
        );
        self.publish(vec![WorkflowEvent::Transitioned(TransitionEvent {
            job_application_id: application.id,
            old_state: None,
            new_state: application.state,
            approval_id: None,
            occurred_at: now,
        })]);
        Ok(application)
    }

    /// Moves an application to `target`, applying the side effects of the transition in
    /// one transaction. Events are published once it commits.
    pub fn transition(
        &self,
        id: JobApplicationId,
        target: JobApplicationState,
        actor: &Actor,
        payload: TransitionPayload,
    ) -> Result<JobApplication, JobApplicationServiceError> {
        if target == JobApplicationState::Accepted {
            self.certify_before_acceptance(id);
        }
        let moment = Moment {
            today: self.clock.today(),
            now: self.clock.now(),
        };

        let (application, kind, events) = self.store.atomic(|uow| {
            let mut application = uow
                .job_application(id)?
                .ok_or(TransitionError::NotFound(id))?;
            let mut events = Vec::new();
            let kind =
                self.apply(uow, &mut application, target, actor, &payload, &moment, &mut events)?;
            Ok::<_, JobApplicationServiceError>((application, kind, events))
        })?;

        info!(
            job_application = %application.id,
            transition = kind.label(),
            state = application.state.label(),
            approval = ?application.approval,
            "job application transitioned"
        );
        self.publish(events);
        Ok(application)
    }

    /// Refuses the application with the `Auto` reason when it sat untouched for too long.
    /// Returns whether anything changed.
    pub fn reject_if_stale(&self, id: JobApplicationId) -> Result<bool, JobApplicationServiceError> {
        let moment = Moment {
            today: self.clock.today(),
            now: self.clock.now(),
        };
        let cutoff = moment.now - Duration::days(self.policy.auto_reject_after_days);

        let events = self.store.atomic(|uow| {
            let Some(mut application) = uow.job_application(id)? else {
                return Ok(None);
            };
            if !AUTO_REJECTABLE_STATES.contains(&application.state)
                || application.updated_at >= cutoff
            {
                return Ok(None);
            }
            let mut events = Vec::new();
            self.apply(
                uow,
                &mut application,
                JobApplicationState::Refused,
                &Actor::system(),
                &TransitionPayload::refusal(RefusalReason::Auto),
                &moment,
                &mut events,
            )?;
            Ok::<_, JobApplicationServiceError>(Some(events))
        })?;

        match events {
            Some(events) => {
                self.publish(events);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Archives the application when it is archivable and old enough.
    pub fn archive_if_stale(&self, id: JobApplicationId) -> Result<bool, JobApplicationServiceError> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(self.policy.archive_after_days);
        self.store.atomic(|uow| {
            let Some(mut application) = uow.job_application(id)? else {
                return Ok(false);
            };
            if application.is_archived()
                || !self.policy.is_archivable(application.state)
                || application.updated_at >= cutoff
            {
                return Ok(false);
            }
            application.archived_at = Some(now);
            application.archived_by = None;
            uow.save_job_application(&application)?;
            Ok(true)
        })
    }

    pub fn archive(
        &self,
        id: JobApplicationId,
        actor: &Actor,
    ) -> Result<JobApplication, JobApplicationServiceError> {
        let now = self.clock.now();
        let application = self.store.atomic(|uow| {
            let mut application = uow
                .job_application(id)?
                .ok_or(TransitionError::NotFound(id))?;
            if application.is_archived() {
                return Err(TransitionError::AlreadyArchived.into());
            }
            if !self.policy.is_archivable(application.state) {
                return Err(TransitionError::NotArchivable(application.state).into());
            }
            application.archived_at = Some(now);
            application.archived_by = actor.user.clone();
            application.updated_at = now;
            uow.save_job_application(&application)?;
            Ok::<_, JobApplicationServiceError>(application)
        })?;
        info!(job_application = %id, "job application archived");
        Ok(application)
    }

    pub fn unarchive(
        &self,
        id: JobApplicationId,
    ) -> Result<JobApplication, JobApplicationServiceError> {
        let now = self.clock.now();
        let application = self.store.atomic(|uow| {
            let mut application = uow
                .job_application(id)?
                .ok_or(TransitionError::NotFound(id))?;
            if !application.is_archived() {
                return Err(TransitionError::NotArchived.into());
            }
            if !self.policy.is_archivable(application.state) {
                return Err(TransitionError::NotArchivable(application.state).into());
            }
            application.archived_at = None;
            application.archived_by = None;
            application.updated_at = now;
            uow.save_job_application(&application)?;
            Ok::<_, JobApplicationServiceError>(application)
        })?;
        info!(job_application = %id, "job application unarchived");
        Ok(application)
    }

    /// Gives the registry a chance to certify the diagnosis the acceptance will rely on.
    /// Failures never block the acceptance.
    fn certify_before_acceptance(&self, id: JobApplicationId) {
        let application = match self.get(id) {
            Ok(application) => application,
            Err(_) => return,
        };
        let diagnosis = match self
            .eligibility
            .last_considered_valid(&application.job_seeker, Some(&application.to_company))
        {
            Ok(Some(diagnosis)) if diagnosis.has_pending_certification() => diagnosis,
            Ok(_) => return,
            Err(err) => {
                warn!(job_application = %id, error = %err, "could not look up the diagnosis");
                return;
            }
        };
        if let Err(err) = self.eligibility.certify_diagnosis(diagnosis.id) {
            warn!(
                job_application = %id,
                diagnosis = %diagnosis.id,
                code = err.code(),
                error = %err,
                "certification before acceptance failed"
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        application: &mut JobApplication,
        target: JobApplicationState,
        actor: &Actor,
        payload: &TransitionPayload,
        moment: &Moment,
        events: &mut Vec<WorkflowEvent>,
    ) -> Result<TransitionKind, JobApplicationServiceError> {
        let from = application.state;
        let kind = workflow::resolve(from, target, actor)?;
        match kind {
            TransitionKind::Accept => self.accept(uow, application, actor, payload, moment, events)?,
            TransitionKind::Refuse => {
                let reason = workflow::check_refusal_reason(payload.refusal_reason, actor)?;
                application.refusal_reason = Some(reason);
            }
            TransitionKind::Cancel => cancel(uow, application, moment.now)?,
            TransitionKind::Reset => {
                application.refusal_reason = None;
            }
            TransitionKind::Process
            | TransitionKind::Postpone
            | TransitionKind::MoveToPriorToHire
            | TransitionKind::CancelPriorToHire
            | TransitionKind::RenderObsolete => {}
        }

        application.state = target;
        application.last_modification_at = moment.now;
        application.updated_at = moment.now;
        uow.save_job_application(application)?;
        events.push(WorkflowEvent::Transitioned(TransitionEvent {
            job_application_id: application.id,
            old_state: Some(from),
            new_state: target,
            approval_id: application.approval,
            occurred_at: moment.now,
        }));
        Ok(kind)
    }

    fn accept(
        &self,
        uow: &mut dyn UnitOfWork,
        application: &mut JobApplication,
        actor: &Actor,
        payload: &TransitionPayload,
        moment: &Moment,
        events: &mut Vec<WorkflowEvent>,
    ) -> Result<(), JobApplicationServiceError> {
        let today = moment.today;
        let now = moment.now;

        let hiring_start_at = payload
            .hiring_start_at
            .or(application.hiring_start_at)
            .ok_or(TransitionError::MissingHiringStart)?;
        let earliest = shift_date(today, -self.policy.hiring_start_tolerance_days)?;
        if hiring_start_at < earliest {
            return Err(TransitionError::HiringStartTooEarly { earliest }.into());
        }
        let hiring_end_at = payload.hiring_end_at.or(application.hiring_end_at);
        if hiring_end_at.map_or(false, |end| end <= hiring_start_at) {
            return Err(TransitionError::HiringEndBeforeStart.into());
        }

        let approvals = uow.approvals_for(&application.job_seeker)?;
        // An approval still in force is always reused, even when the hire falls outside it.
        let in_force = ledger::latest_usable(&approvals, today);
        let diagnoses = uow.diagnoses_for(&application.job_seeker)?;
        let diagnosis: Option<EligibilityDiagnosis> = last_considered_valid(
            &diagnoses,
            Some(&application.to_company),
            today,
            in_force.is_some(),
        )
        .cloned();
        if diagnosis.is_none() && in_force.is_none() {
            return Err(TransitionError::DiagnosisRequired.into());
        }

        let (mut approval, issued) = match in_force {
            Some(found) => {
                let mut approval = ledger::lock(uow, found.id)?;
                if hiring_start_at < approval.start_at
                    && approval.can_move_start(today)
                    && !has_other_accepted(uow, &approval, application.id)?
                {
                    ledger::move_start(
                        uow,
                        &mut approval,
                        hiring_start_at,
                        &self.approval_policy,
                        now,
                    )?;
                }
                (approval, false)
            }
            None => {
                let diagnosis = diagnosis.as_ref().ok_or(TransitionError::DiagnosisRequired)?;
                if !diagnosis.author.is_authorized_prescriber() {
                    if let Some(waiting) = approvals
                        .iter()
                        .find(|approval| approval.is_in_waiting_period(today, &self.approval_policy))
                    {
                        return Err(TransitionError::WaitingPeriod {
                            approval: waiting.id,
                        }
                        .into());
                    }
                }
                let approval = ledger::issue(
                    uow,
                    Issuance {
                        job_seeker: &application.job_seeker,
                        start_at: hiring_start_at,
                        origin: ApprovalOrigin::Default,
                        eligibility_diagnosis: Some(diagnosis.id),
                        created_by: actor.user.clone(),
                    },
                    &self.approval_policy,
                    now,
                )?;
                (approval, true)
            }
        };

        check_hires_inside(uow, &approval, application.id, hiring_start_at)?;

        for mut sibling in uow.job_applications_for_seeker(&application.job_seeker)? {
            if sibling.id == application.id || !sibling.is_pending() {
                continue;
            }
            let old_state = sibling.state;
            sibling.state = JobApplicationState::Obsolete;
            sibling.last_modification_at = now;
            sibling.updated_at = now;
            uow.save_job_application(&sibling)?;
            events.push(WorkflowEvent::Transitioned(TransitionEvent {
                job_application_id: sibling.id,
                old_state: Some(old_state),
                new_state: JobApplicationState::Obsolete,
                approval_id: sibling.approval,
                occurred_at: now,
            }));
        }

        let delivery_mode = match uow.job_seeker(&application.job_seeker)? {
            Some(profile) if profile.identity_matchable() => ApprovalDeliveryMode::Automatic,
            _ => ApprovalDeliveryMode::Manual,
        };

        ledger::unsuspend(uow, &mut approval, hiring_start_at, today, now)?;

        application.hiring_start_at = Some(hiring_start_at);
        application.hiring_end_at = hiring_end_at;
        application.approval = Some(approval.id);
        application.eligibility_diagnosis = diagnosis.map(|diagnosis| diagnosis.id);
        application.approval_delivery_mode = Some(delivery_mode);

        if issued {
            events.push(WorkflowEvent::ApprovalIssued(ApprovalIssuedEvent {
                job_application_id: application.id,
                approval_id: approval.id,
                number: approval.number.clone(),
                start_at: approval.start_at,
                end_at: approval.end_at,
                delivery_mode,
                occurred_at: now,
            }));
        }
        Ok(())
    }

    fn publish(&self, events: Vec<WorkflowEvent>) {
        for event in events {
            let id = event.job_application_id();
            if let Err(err) = self.publisher.publish(event) {
                warn!(job_application = %id, error = %err, "event publication failed");
            }
        }
    }
}

fn has_other_accepted(
    uow: &mut dyn UnitOfWork,
    approval: &Approval,
    current: JobApplicationId,
) -> Result<bool, RepositoryError> {
    Ok(uow
        .job_applications_for_approval(approval.id)?
        .iter()
        .any(|other| other.id != current && other.state == JobApplicationState::Accepted))
}

/// The approval window must contain the hire being accepted and every accepted sibling.
///
/// A hire outside the window is rejected so the employer can pick another date. A sibling
/// already accepted outside it means the stored data is inconsistent.
fn check_hires_inside(
    uow: &mut dyn UnitOfWork,
    approval: &Approval,
    current: JobApplicationId,
    hiring_start_at: NaiveDate,
) -> Result<(), JobApplicationServiceError> {
    let window = approval.window()?;
    if !window.contains(hiring_start_at) {
        return Err(TransitionError::HiringOutsideApproval {
            approval: approval.id,
            start_at: approval.start_at,
            end_at: approval.end_at,
        }
        .into());
    }
    for sibling in uow.job_applications_for_approval(approval.id)? {
        if sibling.id == current || sibling.state != JobApplicationState::Accepted {
            continue;
        }
        if let Some(start) = sibling
            .hiring_start_at
            .filter(|start| !window.contains(*start))
        {
            return Err(IntegrityError::HiringOutsideApproval {
                approval: approval.id,
                application: sibling.id,
                hiring_start_at: start,
            }
            .into());
        }
    }
    Ok(())
}

/// Drops the approval when this application is its only user and nothing hangs off it.
fn cancel(
    uow: &mut dyn UnitOfWork,
    application: &mut JobApplication,
    now: DateTime<Utc>,
) -> Result<(), JobApplicationServiceError> {
    let Some(approval_id) = application.approval else {
        return Ok(());
    };
    let shared = uow
        .job_applications_for_approval(approval_id)?
        .iter()
        .any(|other| other.id != application.id);
    let has_dependents = !uow.suspensions_for(approval_id)?.is_empty()
        || !uow.prolongations_for(approval_id)?.is_empty();
    if shared || has_dependents {
        return Ok(());
    }

    let approval = ledger::lock(uow, approval_id)?;
    ledger::remove(uow, &approval, now)?;
    application.approval = None;
    application.approval_delivery_mode = None;
    info!(approval = %approval_id, "approval deleted with its cancelled job application");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum JobApplicationServiceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Approval(#[from] ApprovalServiceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<IntegrityError> for JobApplicationServiceError {
    fn from(value: IntegrityError) -> Self {
        Self::Approval(ApprovalServiceError::Integrity(value))
    }
}

impl From<IntervalError> for JobApplicationServiceError {
    fn from(value: IntervalError) -> Self {
        Self::Approval(ApprovalServiceError::from(value))
    }
}

impl JobApplicationServiceError {
    pub const fn code(&self) -> &'static str {
        match self {
            JobApplicationServiceError::Transition(err) => err.code(),
            JobApplicationServiceError::Submission(err) => err.code(),
            JobApplicationServiceError::Approval(err) => err.code(),
            JobApplicationServiceError::Repository(err) => err.code(),
        }
    }

    pub const fn is_retryable(&self) -> bool {
        match self {
            JobApplicationServiceError::Approval(err) => err.is_retryable(),
            JobApplicationServiceError::Repository(err) => err.is_retryable(),
            _ => false,
        }
    }
}
