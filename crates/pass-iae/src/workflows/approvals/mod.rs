//! PASS IAE approvals and the suspensions and prolongations that move their end date.

pub mod domain;
pub mod ledger;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    next_approval_number, validate_prolongation, validate_suspension, Approval, ApprovalOrigin,
    ApprovalPolicy, ApprovalStatus, IntegrityError, Prolongation, ProlongationCheck,
    ProlongationDraft, ProlongationError, ProlongationReason, Suspension, SuspensionCheck,
    SuspensionDraft, SuspensionError, SuspensionReason,
};
pub use ledger::{expected_end, latest_usable, AdjustmentCause, ApprovalAdjustment};
pub use service::{
    ApprovalService, ApprovalServiceError, EndDateAudit, NewApproval, NewProlongation,
    NewSuspension,
};
