use serde_json::json;

use super::common::*;
use crate::workflows::approvals::{
    AdjustmentCause, ApprovalOrigin, NewApproval, NewSuspension, SuspensionReason,
};
use crate::workflows::eligibility::{AdministrativeCriterion, CertificationResponse, DiagnosisAuthor};
use crate::workflows::events::WorkflowEvent;
use crate::workflows::ids::{CompanyId, UserId};
use crate::workflows::job_applications::{
    Actor, ApprovalDeliveryMode, JobApplicationServiceError, JobApplicationState,
    NewJobApplication, RefusalReason, SenderKind, SubmissionError, TransitionError,
    TransitionPayload,
};
use crate::workflows::job_seekers::LackOfNirReason;

#[test]
fn accepting_one_application_obsoletes_the_others() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let first = harness.submit(&job_seeker, "company-x");
    let second = harness.submit(&job_seeker, "company-y");
    harness.process(first.id);
    let mut second = harness.process(second.id);
    second.hiring_start_at = Some(date(2024, 7, 15));
    harness.save(&second);

    let accepted = harness
        .accept(first.id, date(2024, 6, 1))
        .expect("application accepted");
    assert_eq!(accepted.state, JobApplicationState::Accepted);
    assert!(accepted.approval.is_some());

    let second = harness.service.get(second.id).expect("sibling");
    assert_eq!(second.state, JobApplicationState::Obsolete);
    assert_eq!(second.hiring_start_at, Some(date(2024, 7, 15)));

    let events = harness.publisher.events();
    assert!(events.iter().any(|event| matches!(
        event,
        WorkflowEvent::Transitioned(transition)
            if transition.job_application_id == second.id
                && transition.new_state == JobApplicationState::Obsolete
    )));
    assert!(events
        .iter()
        .any(|event| matches!(event, WorkflowEvent::ApprovalIssued(_))));
}

#[test]
fn acceptance_issues_a_numbered_approval_from_the_hiring_date() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let diagnosis = harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);

    let accepted = harness
        .accept(application.id, date(2024, 6, 3))
        .expect("application accepted");
    let approval = harness
        .approvals
        .get(accepted.approval.expect("approval linked"))
        .expect("approval stored");

    assert_eq!(approval.number, "XXXXX0000001");
    assert_eq!(approval.start_at, date(2024, 6, 3));
    assert_eq!(approval.end_at, date(2026, 6, 2));
    assert_eq!(approval.eligibility_diagnosis, Some(diagnosis.id));
    assert_eq!(accepted.eligibility_diagnosis, Some(diagnosis.id));
    assert_eq!(
        accepted.approval_delivery_mode,
        Some(ApprovalDeliveryMode::Automatic)
    );
    assert!(accepted.last_modification_at >= application.last_modification_at);
}

#[test]
fn valid_approval_is_reused_unchanged() {
    let harness = harness(date(2025, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let existing = harness
        .approvals
        .issue_approval(NewApproval {
            job_seeker: job_seeker.clone(),
            start_at: date(2024, 1, 2),
            origin: ApprovalOrigin::Default,
            eligibility_diagnosis: None,
            created_by: None,
        })
        .expect("approval issued");
    assert_eq!(existing.end_at, date(2026, 1, 1));

    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);
    let accepted = harness
        .accept(application.id, date(2025, 6, 1))
        .expect("accepted without a fresh diagnosis");

    assert_eq!(accepted.approval, Some(existing.id));
    let reused = harness.approvals.get(existing.id).expect("approval");
    assert_eq!(reused, existing);
    assert!(!harness
        .publisher
        .events()
        .iter()
        .any(|event| matches!(event, WorkflowEvent::ApprovalIssued(_))));
}

#[test]
fn future_approval_start_moves_back_to_the_hiring_date() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let existing = harness
        .approvals
        .issue_approval(NewApproval {
            job_seeker: job_seeker.clone(),
            start_at: date(2024, 7, 1),
            origin: ApprovalOrigin::Default,
            eligibility_diagnosis: None,
            created_by: None,
        })
        .expect("approval issued");

    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);
    harness
        .accept(application.id, date(2024, 6, 10))
        .expect("application accepted");

    let moved = harness.approvals.get(existing.id).expect("approval");
    assert_eq!(moved.start_at, date(2024, 6, 10));
    assert_eq!(moved.end_at, date(2026, 6, 9));
    let adjustments = harness.approvals.adjustments(existing.id).expect("ledger");
    assert!(matches!(
        adjustments.last().map(|adjustment| adjustment.cause),
        Some(AdjustmentCause::StartMoved { previous_start }) if previous_start == date(2024, 7, 1)
    ));
    assert!(harness
        .approvals
        .verify_end_date(existing.id)
        .expect("audit")
        .is_consistent());
}

#[test]
fn registry_timeout_does_not_block_acceptance() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let diagnosis = harness.diagnose(&job_seeker, prescriber(), vec![AdministrativeCriterion::Rsa]);
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);

    let accepted = harness
        .accept(application.id, date(2024, 6, 1))
        .expect("accepted despite the registry");
    assert_eq!(accepted.state, JobApplicationState::Accepted);
    assert!(accepted.approval.is_some());
    assert_eq!(harness.registry.calls(), 3);

    let pending = harness.eligibility.diagnosis(diagnosis.id).expect("diagnosis");
    assert!(pending.criteria[0].certified_at.is_none());

    harness.registry.push(Ok(CertificationResponse {
        is_certified: true,
        start_at: Some(date(2024, 1, 1)),
        raw_response: json!({ "status": "beneficiaire" }),
    }));
    let report = harness.eligibility.certify_pending().expect("batch ran");
    assert_eq!(report.certified, 1);
    let certified = harness.eligibility.diagnosis(diagnosis.id).expect("diagnosis");
    assert!(certified.criteria[0].certified_at.is_some());
}

#[test]
fn acceptance_requires_a_diagnosis_without_a_running_approval() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);

    match harness.accept(application.id, date(2024, 6, 1)) {
        Err(JobApplicationServiceError::Transition(TransitionError::DiagnosisRequired)) => {}
        other => panic!("expected missing diagnosis, got {other:?}"),
    }
    let unchanged = harness.service.get(application.id).expect("application");
    assert_eq!(unchanged.state, JobApplicationState::Processing);
    assert!(unchanged.approval.is_none());
}

#[test]
fn hiring_dates_are_validated() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);

    let err = harness
        .accept(application.id, date(2024, 5, 31))
        .expect_err("hiring in the past");
    assert_eq!(err.code(), "hiring_start_too_early");

    let err = harness
        .service
        .transition(
            application.id,
            JobApplicationState::Accepted,
            &employer(),
            TransitionPayload::hiring(date(2024, 6, 10), Some(date(2024, 6, 10))),
        )
        .expect_err("empty contract");
    assert_eq!(err.code(), "hiring_end_before_start");

    let err = harness
        .service
        .transition(
            application.id,
            JobApplicationState::Accepted,
            &employer(),
            TransitionPayload::default(),
        )
        .expect_err("no hiring date");
    assert_eq!(err.code(), "hiring_start_missing");
}

#[test]
fn waiting_period_needs_a_prescriber_diagnosis() {
    let harness = harness(date(2024, 3, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness
        .approvals
        .issue_approval(NewApproval {
            job_seeker: job_seeker.clone(),
            start_at: date(2021, 1, 1),
            origin: ApprovalOrigin::Default,
            eligibility_diagnosis: None,
            created_by: None,
        })
        .expect("old approval");
    harness.diagnose(
        &job_seeker,
        DiagnosisAuthor::Employer {
            user: UserId::new("employer-1"),
            company: CompanyId::new("company-x"),
        },
        vec![AdministrativeCriterion::Deld],
    );
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);

    let err = harness
        .accept(application.id, date(2024, 3, 1))
        .expect_err("waiting period");
    assert_eq!(err.code(), "approval_waiting_period");

    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let accepted = harness
        .accept(application.id, date(2024, 3, 1))
        .expect("prescriber diagnosis lifts the waiting period");
    assert!(accepted.approval.is_some());
}

#[test]
fn unmatchable_identity_requires_manual_delivery() {
    let harness = harness(date(2024, 6, 1));
    let mut unmatched = profile("js-1");
    unmatched.nir = None;
    unmatched.lack_of_nir_reason = Some(LackOfNirReason::NirAssociatedToOtherAccount);
    let job_seeker = harness.register(unmatched);
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);

    let accepted = harness
        .accept(application.id, date(2024, 6, 1))
        .expect("accepted");
    assert_eq!(
        accepted.approval_delivery_mode,
        Some(ApprovalDeliveryMode::Manual)
    );
    assert!(harness.publisher.events().iter().any(|event| matches!(
        event,
        WorkflowEvent::ApprovalIssued(issued) if issued.delivery_mode == ApprovalDeliveryMode::Manual
    )));
}

#[test]
fn hiring_ends_the_suspension_in_progress() {
    let harness = harness(date(2024, 5, 1));
    let job_seeker = harness.register(profile("js-1"));
    let approval = harness
        .approvals
        .issue_approval(NewApproval {
            job_seeker: job_seeker.clone(),
            start_at: date(2024, 1, 1),
            origin: ApprovalOrigin::Default,
            eligibility_diagnosis: None,
            created_by: None,
        })
        .expect("approval issued");
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);
    let suspension = harness
        .approvals
        .create_suspension(NewSuspension {
            approval: approval.id,
            start_at: date(2024, 5, 1),
            end_at: Some(date(2024, 12, 31)),
            reason: SuspensionReason::ContractBroken,
            reason_explanation: None,
            created_by: UserId::new("employer-1"),
        })
        .expect("suspension recorded");

    harness.clock.set_date(date(2024, 6, 10));
    harness
        .accept(application.id, date(2024, 6, 10))
        .expect("application accepted");

    let closed = harness
        .approvals
        .adjustments(approval.id)
        .expect("ledger")
        .into_iter()
        .filter(|adjustment| {
            matches!(adjustment.cause, AdjustmentCause::SuspensionUpdated { suspension: id } if id == suspension.id)
        })
        .count();
    assert_eq!(closed, 1);
    assert!(harness
        .approvals
        .verify_end_date(approval.id)
        .expect("audit")
        .is_consistent());
    assert_eq!(
        harness.approvals.get(approval.id).expect("approval").end_at,
        date(2026, 2, 8)
    );
}

#[test]
fn cancelling_removes_an_approval_nobody_else_uses() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);
    let accepted = harness
        .accept(application.id, date(2024, 6, 1))
        .expect("accepted");
    let approval_id = accepted.approval.expect("approval linked");

    let cancelled = harness
        .service
        .transition(
            application.id,
            JobApplicationState::Cancelled,
            &employer(),
            TransitionPayload::default(),
        )
        .expect("cancelled");
    assert_eq!(cancelled.state, JobApplicationState::Cancelled);
    assert_eq!(cancelled.approval, None);
    assert_eq!(cancelled.approval_delivery_mode, None);
    let err = harness
        .approvals
        .get(approval_id)
        .expect_err("approval deleted");
    assert_eq!(err.code(), "approval_missing");
}

#[test]
fn cancelling_keeps_an_approval_with_dependents() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);
    let accepted = harness
        .accept(application.id, date(2024, 6, 1))
        .expect("accepted");
    let approval_id = accepted.approval.expect("approval linked");

    harness.clock.advance_days(30);
    harness
        .approvals
        .create_suspension(NewSuspension {
            approval: approval_id,
            start_at: date(2024, 6, 15),
            end_at: Some(date(2024, 6, 20)),
            reason: SuspensionReason::ContractSuspended,
            reason_explanation: None,
            created_by: UserId::new("employer-1"),
        })
        .expect("suspension recorded");

    let cancelled = harness
        .service
        .transition(
            application.id,
            JobApplicationState::Cancelled,
            &employer(),
            TransitionPayload::default(),
        )
        .expect("cancelled");
    assert_eq!(cancelled.approval, Some(approval_id));
    harness.approvals.get(approval_id).expect("approval kept");
}

#[test]
fn refusal_needs_a_selectable_reason() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let application = harness.submit(&job_seeker, "company-x");

    let err = harness
        .service
        .transition(
            application.id,
            JobApplicationState::Refused,
            &employer(),
            TransitionPayload::refusal(RefusalReason::Auto),
        )
        .expect_err("hidden reason");
    assert_eq!(err.code(), "refusal_reason_hidden");

    let refused = harness
        .service
        .transition(
            application.id,
            JobApplicationState::Refused,
            &employer(),
            TransitionPayload::refusal(RefusalReason::NoPosition),
        )
        .expect("refused");
    assert_eq!(refused.state, JobApplicationState::Refused);
    assert_eq!(refused.refusal_reason, Some(RefusalReason::NoPosition));
}

#[test]
fn transitions_outside_the_table_leave_the_record_untouched() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let application = harness.submit(&job_seeker, "company-x");

    match harness.accept(application.id, date(2024, 6, 1)) {
        Err(JobApplicationServiceError::Transition(TransitionError::NotAllowed { from, to })) => {
            assert_eq!(from, JobApplicationState::New);
            assert_eq!(to, JobApplicationState::Accepted);
        }
        other => panic!("expected a refused transition, got {other:?}"),
    }
    assert_eq!(harness.service.get(application.id).expect("application"), application);
}

#[test]
fn only_administrators_reset_obsolete_applications() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let first = harness.submit(&job_seeker, "company-x");
    let second = harness.submit(&job_seeker, "company-y");
    harness.process(first.id);
    harness.accept(first.id, date(2024, 6, 1)).expect("accepted");

    let err = harness
        .service
        .transition(
            second.id,
            JobApplicationState::New,
            &employer(),
            TransitionPayload::default(),
        )
        .expect_err("employers cannot reset");
    assert_eq!(err.code(), "transition_administrator_only");

    let reset = harness
        .service
        .transition(
            second.id,
            JobApplicationState::New,
            &Actor::administrator(UserId::new("admin-1")),
            TransitionPayload::default(),
        )
        .expect("reset");
    assert_eq!(reset.state, JobApplicationState::New);
}

#[test]
fn submission_rejects_duplicates_and_suspended_approvals() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let first = harness.submit(&job_seeker, "company-x");

    match harness.service.submit(NewJobApplication {
        job_seeker: job_seeker.clone(),
        to_company: CompanyId::new("company-x"),
        sender: UserId::new("prescriber-1"),
        sender_kind: SenderKind::Prescriber,
        selected_jobs: Vec::new(),
    }) {
        Err(JobApplicationServiceError::Submission(SubmissionError::DuplicatePending {
            existing,
        })) => assert_eq!(existing, first.id),
        other => panic!("expected duplicate rejection, got {other:?}"),
    }

    let approval = harness
        .approvals
        .issue_approval(NewApproval {
            job_seeker: job_seeker.clone(),
            start_at: date(2024, 1, 1),
            origin: ApprovalOrigin::Default,
            eligibility_diagnosis: None,
            created_by: None,
        })
        .expect("approval issued");
    harness
        .approvals
        .create_suspension(NewSuspension {
            approval: approval.id,
            start_at: date(2024, 5, 1),
            end_at: None,
            reason: SuspensionReason::ContractSuspended,
            reason_explanation: None,
            created_by: UserId::new("employer-1"),
        })
        .expect("suspension recorded");

    let err = harness
        .service
        .submit(NewJobApplication {
            job_seeker,
            to_company: CompanyId::new("company-y"),
            sender: UserId::new("prescriber-1"),
            sender_kind: SenderKind::Prescriber,
            selected_jobs: Vec::new(),
        })
        .expect_err("approval suspended");
    assert_eq!(err.code(), "approval_suspended");
}

#[test]
fn publication_failures_do_not_fail_the_transition() {
    let harness = harness_with(date(2024, 6, 1), RecordingPublisher::failing());
    let job_seeker = harness.register(profile("js-1"));
    let application = harness.submit(&job_seeker, "company-x");
    let processed = harness.process(application.id);
    assert_eq!(processed.state, JobApplicationState::Processing);
    assert!(harness.publisher.events().is_empty());
}

#[test]
fn manual_archival_is_limited_to_the_archivable_states() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let application = harness.submit(&job_seeker, "company-x");
    let staff = employer();

    let archived = harness
        .service
        .archive(application.id, &staff)
        .expect("new applications can be archived");
    assert_eq!(archived.archived_by, Some(UserId::new("employer-1")));
    let err = harness
        .service
        .archive(application.id, &staff)
        .expect_err("already archived");
    assert_eq!(err.code(), "job_application_archived");
    harness
        .service
        .unarchive(application.id)
        .expect("unarchived");

    harness.process(application.id);
    harness.clock.advance_days(1);
    harness
        .accept(application.id, date(2024, 6, 2))
        .expect("accepted");
    let err = harness
        .service
        .archive(application.id, &staff)
        .expect_err("accepted applications stay visible");
    assert_eq!(err.code(), "job_application_not_archivable");
}

#[test]
fn hire_after_the_approval_in_force_does_not_issue_a_second_one() {
    let harness = harness(date(2024, 1, 10));
    let job_seeker = harness.register(profile("js-1"));
    let existing = harness
        .approvals
        .issue_approval(NewApproval {
            job_seeker: job_seeker.clone(),
            start_at: date(2024, 1, 1),
            origin: ApprovalOrigin::Default,
            eligibility_diagnosis: None,
            created_by: None,
        })
        .expect("approval issued");
    assert_eq!(existing.end_at, date(2025, 12, 31));
    harness.diagnose(
        &job_seeker,
        DiagnosisAuthor::Employer {
            user: UserId::new("employer-1"),
            company: CompanyId::new("company-x"),
        },
        vec![AdministrativeCriterion::Deld],
    );

    harness.clock.set_date(date(2025, 12, 20));
    let application = harness.submit(&job_seeker, "company-x");
    harness.process(application.id);
    match harness.accept(application.id, date(2026, 1, 5)) {
        Err(JobApplicationServiceError::Transition(TransitionError::HiringOutsideApproval {
            approval,
            end_at,
            ..
        })) => {
            assert_eq!(approval, existing.id);
            assert_eq!(end_at, date(2025, 12, 31));
        }
        other => panic!("expected a hire outside the approval, got {other:?}"),
    }
    assert_eq!(harness.approvals_of(&job_seeker), vec![existing.clone()]);
    assert_eq!(
        harness.service.get(application.id).expect("application").state,
        JobApplicationState::Processing
    );

    harness.clock.set_date(date(2026, 1, 5));
    let err = harness
        .accept(application.id, date(2026, 1, 5))
        .expect_err("expired employer diagnosis");
    assert_eq!(err.code(), "eligibility_diagnosis_required");

    harness.diagnose(&job_seeker, prescriber(), Vec::new());
    let accepted = harness
        .accept(application.id, date(2026, 1, 5))
        .expect("fresh diagnosis");
    let issued = harness
        .approvals
        .get(accepted.approval.expect("approval linked"))
        .expect("approval stored");
    assert_eq!(issued.number, "XXXXX0000002");
    assert_eq!(issued.start_at, date(2026, 1, 5));
    let in_force = harness
        .approvals_of(&job_seeker)
        .iter()
        .filter(|approval| approval.is_valid(date(2026, 1, 5)))
        .count();
    assert_eq!(in_force, 1);
}

#[test]
fn hire_before_a_start_anchored_by_another_hire_is_rejected() {
    let harness = harness(date(2024, 6, 1));
    let job_seeker = harness.register(profile("js-1"));
    let existing = harness
        .approvals
        .issue_approval(NewApproval {
            job_seeker: job_seeker.clone(),
            start_at: date(2024, 7, 1),
            origin: ApprovalOrigin::Default,
            eligibility_diagnosis: None,
            created_by: None,
        })
        .expect("approval issued");
    let first = harness.submit(&job_seeker, "company-x");
    harness.process(first.id);
    harness
        .accept(first.id, date(2024, 7, 1))
        .expect("first hire");

    let second = harness.submit(&job_seeker, "company-y");
    harness.process(second.id);
    let err = harness
        .accept(second.id, date(2024, 6, 15))
        .expect_err("start is anchored");
    assert_eq!(err.code(), "hiring_outside_approval");
    assert!(!err.is_retryable());
    match err {
        JobApplicationServiceError::Transition(TransitionError::HiringOutsideApproval {
            approval,
            start_at,
            ..
        }) => {
            assert_eq!(approval, existing.id);
            assert_eq!(start_at, date(2024, 7, 1));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(
        harness.approvals.get(existing.id).expect("approval").start_at,
        date(2024, 7, 1)
    );
    assert_eq!(
        harness.service.get(second.id).expect("application").state,
        JobApplicationState::Processing
    );
}
