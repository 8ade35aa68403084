//! Lifecycle engine for PASS IAE approvals, eligibility diagnoses and job applications.

pub mod clock;
pub mod config;
pub mod error;
pub mod interval;
pub mod store;
pub mod telemetry;
pub mod workflows;
