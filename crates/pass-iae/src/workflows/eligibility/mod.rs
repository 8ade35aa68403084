//! Eligibility diagnoses and the certification of their administrative criteria.

pub mod certification;
pub mod domain;
pub mod registry;
pub mod selection;
pub mod service;

#[cfg(test)]
mod tests;

pub use certification::{
    CertificationConfig, CertificationIdentity, CertificationReport, CriterionOutcome,
    IdentityError,
};
pub use domain::{
    AdministrativeCriterion, CertificationPeriod, DiagnosisAuthor, DiagnosisError,
    EligibilityDiagnosis, EligibilityPolicy, SelectedCriterion,
};
pub use registry::{
    CertificationRegistry, CertificationRequest, CertificationResponse, DisabledRegistry,
    HttpCertificationRegistry, RegistryError,
};
pub use selection::{last_considered_valid, rank_for_reuse};
pub use service::{EligibilityService, EligibilityServiceError, NewDiagnosis};
