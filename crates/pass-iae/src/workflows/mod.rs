pub mod approvals;
pub mod eligibility;
pub mod events;
pub mod ids;
pub mod job_applications;
pub mod job_seekers;
