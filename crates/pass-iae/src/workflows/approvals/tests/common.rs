use std::sync::Arc;

use chrono::NaiveDate;

use crate::clock::FixedClock;
use crate::store::InMemoryStore;
use crate::workflows::approvals::{
    Approval, ApprovalOrigin, ApprovalPolicy, ApprovalService, NewApproval, NewProlongation,
    NewSuspension, ProlongationReason, SuspensionReason,
};
use crate::workflows::ids::{JobSeekerId, UserId};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn staff() -> UserId {
    UserId::new("staff-1")
}

pub(super) fn job_seeker() -> JobSeekerId {
    JobSeekerId::new("js-100")
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) service: ApprovalService<InMemoryStore, FixedClock>,
}

pub(super) fn harness(today: NaiveDate) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::on(today));
    let service = ApprovalService::new(store.clone(), clock.clone(), ApprovalPolicy::default());
    Harness {
        store,
        clock,
        service,
    }
}

impl Harness {
    pub(super) fn issue(&self, start_at: NaiveDate) -> Approval {
        self.service
            .issue_approval(NewApproval {
                job_seeker: job_seeker(),
                start_at,
                origin: ApprovalOrigin::Admin,
                eligibility_diagnosis: None,
                created_by: Some(staff()),
            })
            .expect("approval issued")
    }

    pub(super) fn end_of(&self, approval: &Approval) -> NaiveDate {
        self.service.get(approval.id).expect("approval present").end_at
    }
}

pub(super) fn suspension(
    approval: &Approval,
    start_at: NaiveDate,
    end_at: Option<NaiveDate>,
) -> NewSuspension {
    NewSuspension {
        approval: approval.id,
        start_at,
        end_at,
        reason: SuspensionReason::ContractSuspended,
        reason_explanation: None,
        created_by: staff(),
    }
}

pub(super) fn prolongation(
    approval: &Approval,
    start_at: NaiveDate,
    end_at: NaiveDate,
    reason: ProlongationReason,
) -> NewProlongation {
    NewProlongation {
        approval: approval.id,
        start_at,
        end_at,
        reason,
        reason_explanation: None,
        declared_by: staff(),
    }
}
