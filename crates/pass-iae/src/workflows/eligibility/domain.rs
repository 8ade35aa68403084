use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interval::{add_months, shift_date, DateInterval, IntervalError};
use crate::workflows::ids::{CompanyId, DiagnosisId, JobSeekerId, OrganizationId, UserId};

/// Validity rules for diagnoses and certified criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityPolicy {
    pub prescriber_validity_months: u32,
    pub employer_validity_days: i64,
    /// Days a certification stays usable after the registry confirmed it.
    pub certification_grace_days: i64,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            prescriber_validity_months: 6,
            employer_validity_days: 92,
            certification_grace_days: 92,
        }
    }
}

impl EligibilityPolicy {
    /// First day on which a diagnosis authored on `created_on` is no longer valid.
    pub fn expiry_for(
        &self,
        author: &DiagnosisAuthor,
        created_on: NaiveDate,
    ) -> Result<NaiveDate, IntervalError> {
        match author {
            DiagnosisAuthor::AuthorizedPrescriber { .. } => {
                add_months(created_on, self.prescriber_validity_months)
            }
            DiagnosisAuthor::Employer { .. } => shift_date(created_on, self.employer_validity_days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosisAuthor {
    AuthorizedPrescriber {
        user: UserId,
        organization: OrganizationId,
    },
    Employer {
        user: UserId,
        company: CompanyId,
    },
}

impl DiagnosisAuthor {
    pub fn is_authorized_prescriber(&self) -> bool {
        matches!(self, DiagnosisAuthor::AuthorizedPrescriber { .. })
    }

    pub const fn label(&self) -> &'static str {
        match self {
            DiagnosisAuthor::AuthorizedPrescriber { .. } => "authorized_prescriber",
            DiagnosisAuthor::Employer { .. } => "employer",
        }
    }
}

/// Administrative criteria a diagnosis can rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdministrativeCriterion {
    Rsa,
    Ass,
    Aah,
    Pi,
    Rqth,
    Detld,
    Deld,
    YoungUnder26,
    SeniorOver50,
    Qpv,
    Zrr,
    Ase,
    Refugee,
    Homeless,
    Justice,
    LowQualification,
}

impl AdministrativeCriterion {
    pub const fn label(self) -> &'static str {
        match self {
            AdministrativeCriterion::Rsa => "rsa",
            AdministrativeCriterion::Ass => "ass",
            AdministrativeCriterion::Aah => "aah",
            AdministrativeCriterion::Pi => "pi",
            AdministrativeCriterion::Rqth => "rqth",
            AdministrativeCriterion::Detld => "detld",
            AdministrativeCriterion::Deld => "deld",
            AdministrativeCriterion::YoungUnder26 => "young_under_26",
            AdministrativeCriterion::SeniorOver50 => "senior_over_50",
            AdministrativeCriterion::Qpv => "qpv",
            AdministrativeCriterion::Zrr => "zrr",
            AdministrativeCriterion::Ase => "ase",
            AdministrativeCriterion::Refugee => "refugee",
            AdministrativeCriterion::Homeless => "homeless",
            AdministrativeCriterion::Justice => "justice",
            AdministrativeCriterion::LowQualification => "low_qualification",
        }
    }

    /// Criteria an external registry can confirm.
    pub const fn is_certifiable(self) -> bool {
        matches!(
            self,
            AdministrativeCriterion::Rsa
                | AdministrativeCriterion::Aah
                | AdministrativeCriterion::Pi
                | AdministrativeCriterion::Rqth
        )
    }
}

/// Inclusive date range during which the registry confirms the criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CertificationPeriod {
    pub fn as_interval(&self) -> Result<DateInterval, IntervalError> {
        DateInterval::from_inclusive(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedCriterion {
    pub kind: AdministrativeCriterion,
    pub certified: Option<bool>,
    pub certified_at: Option<DateTime<Utc>>,
    pub certification_period: Option<CertificationPeriod>,
    pub data_returned_by_api: Option<Value>,
    #[serde(default)]
    pub attempts: u32,
}

impl SelectedCriterion {
    pub fn new(kind: AdministrativeCriterion) -> Self {
        Self {
            kind,
            certified: None,
            certified_at: None,
            certification_period: None,
            data_returned_by_api: None,
            attempts: 0,
        }
    }

    pub fn is_pending_certification(&self) -> bool {
        self.kind.is_certifiable() && self.certified_at.is_none()
    }

    /// Certified and inside its period, which already includes the grace delay.
    pub fn is_certified_on(&self, today: NaiveDate) -> bool {
        self.certified == Some(true)
            && self
                .certification_period
                .and_then(|period| period.as_interval().ok())
                .map_or(false, |period| period.contains(today))
    }
}

/// Assessment establishing that a job seeker qualifies for the scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityDiagnosis {
    pub id: DiagnosisId,
    pub job_seeker: JobSeekerId,
    pub author: DiagnosisAuthor,
    pub criteria: Vec<SelectedCriterion>,
    pub created_at: DateTime<Utc>,
    /// First day the diagnosis is no longer valid.
    pub expires_at: NaiveDate,
}

impl EligibilityDiagnosis {
    pub fn validity(&self) -> Result<DateInterval, IntervalError> {
        DateInterval::new(self.created_at.date_naive(), self.expires_at)
    }

    pub fn is_valid_on(&self, today: NaiveDate) -> bool {
        self.validity()
            .map(|window| window.contains(today))
            .unwrap_or(false)
    }

    /// Prescriber diagnoses serve any employer, employer diagnoses only their author.
    pub fn is_reusable_by(&self, company: Option<&CompanyId>) -> bool {
        match &self.author {
            DiagnosisAuthor::AuthorizedPrescriber { .. } => true,
            DiagnosisAuthor::Employer {
                company: author, ..
            } => company.map_or(false, |company| company == author),
        }
    }

    pub fn criteria_can_be_certified(&self) -> bool {
        self.criteria
            .iter()
            .any(|criterion| criterion.kind.is_certifiable())
    }

    pub fn has_pending_certification(&self) -> bool {
        self.criteria
            .iter()
            .any(SelectedCriterion::is_pending_certification)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosisError {
    #[error("diagnosis {0} does not exist")]
    NotFound(DiagnosisId),
    #[error("job seeker {0} is unknown")]
    JobSeekerMissing(JobSeekerId),
    #[error("employer diagnoses must select at least one administrative criterion")]
    NoCriteria,
    #[error(transparent)]
    Interval(#[from] IntervalError),
}

impl DiagnosisError {
    pub const fn code(&self) -> &'static str {
        match self {
            DiagnosisError::NotFound(_) => "diagnosis_not_found",
            DiagnosisError::JobSeekerMissing(_) => "job_seeker_missing",
            DiagnosisError::NoCriteria => "diagnosis_without_criteria",
            DiagnosisError::Interval(err) => err.code(),
        }
    }
}
