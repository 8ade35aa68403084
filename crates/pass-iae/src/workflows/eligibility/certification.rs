use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

use super::domain::{AdministrativeCriterion, CertificationPeriod, SelectedCriterion};
use super::registry::{
    CertificationRegistry, CertificationRequest, CertificationResponse, RegistryError,
};
use crate::interval::{shift_date, IntervalError};
use crate::workflows::job_seekers::JobSeekerProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationConfig {
    /// Calls per criterion and per run before the criterion is left for a later run.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for CertificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Identity fields the registry needs to look a person up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationIdentity {
    pub last_name: String,
    pub first_name: String,
    pub birthdate: NaiveDate,
    pub birth_place: Option<String>,
    pub birth_country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity is missing a first or last name")]
    MissingName,
    #[error("identity is missing a birthdate")]
    MissingBirthdate,
    #[error("identity is missing a birth country")]
    MissingBirthCountry,
    #[error("people born in France need a birth place")]
    MissingBirthPlace,
}

impl IdentityError {
    pub const fn code(&self) -> &'static str {
        match self {
            IdentityError::MissingName => "identity_missing_name",
            IdentityError::MissingBirthdate => "identity_missing_birthdate",
            IdentityError::MissingBirthCountry => "identity_missing_birth_country",
            IdentityError::MissingBirthPlace => "identity_missing_birth_place",
        }
    }
}

impl CertificationIdentity {
    pub fn from_profile(profile: &JobSeekerProfile) -> Result<Self, IdentityError> {
        let first_name = profile.first_name.trim();
        let last_name = profile.last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(IdentityError::MissingName);
        }
        let birthdate = profile.birthdate.ok_or(IdentityError::MissingBirthdate)?;
        let birth_country = profile
            .birth_country
            .as_deref()
            .map(str::trim)
            .filter(|country| !country.is_empty())
            .ok_or(IdentityError::MissingBirthCountry)?
            .to_ascii_uppercase();

        let birth_place = if profile.born_in_france() {
            let place = profile
                .birth_place
                .as_deref()
                .map(str::trim)
                .filter(|place| !place.is_empty())
                .ok_or(IdentityError::MissingBirthPlace)?;
            Some(place.to_string())
        } else {
            None
        };

        Ok(Self {
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
            birthdate,
            birth_place,
            birth_country,
        })
    }

    pub fn request_for(&self, criterion: AdministrativeCriterion) -> CertificationRequest {
        CertificationRequest {
            criterion,
            last_name: self.last_name.clone(),
            first_name: self.first_name.clone(),
            birthdate: self.birthdate,
            birth_place: self.birth_place.clone(),
            birth_country: self.birth_country.clone(),
        }
    }
}

/// Registry answer for one criterion after retries.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CallResult {
    pub criterion: AdministrativeCriterion,
    pub attempts: u32,
    pub outcome: Result<CertificationResponse, RegistryError>,
}

pub(crate) fn call_with_retries<R>(
    registry: &R,
    request: &CertificationRequest,
    config: &CertificationConfig,
) -> CallResult
where
    R: CertificationRegistry + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let outcome = registry.certify(request);
        match &outcome {
            Err(err) if err.is_transient() && attempts < max_attempts => {
                warn!(
                    criterion = request.criterion.label(),
                    attempt = attempts,
                    error = %err,
                    "certification call failed, retrying"
                );
                if !config.retry_backoff.is_zero() {
                    thread::sleep(config.retry_backoff);
                }
            }
            _ => {
                return CallResult {
                    criterion: request.criterion,
                    attempts,
                    outcome,
                }
            }
        }
    }
}

/// How a criterion ended up after applying a registry answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionOutcome {
    Certified,
    NotCertified,
    /// The registry could not answer; the criterion stays pending.
    Deferred,
    /// Nothing was asked, the registry is not configured.
    Skipped,
}

pub(crate) fn apply_result(
    criterion: &mut SelectedCriterion,
    result: CallResult,
    now: DateTime<Utc>,
    grace_days: i64,
) -> Result<CriterionOutcome, IntervalError> {
    match result.outcome {
        Ok(response) => {
            criterion.attempts += result.attempts;
            criterion.certified = Some(response.is_certified);
            criterion.certified_at = Some(now);
            criterion.data_returned_by_api = Some(response.raw_response);
            criterion.certification_period = None;
            if !response.is_certified {
                return Ok(CriterionOutcome::NotCertified);
            }
            let today = now.date_naive();
            let start = response.start_at.unwrap_or(today);
            let end = shift_date(today, grace_days)?;
            if start <= end {
                criterion.certification_period = Some(CertificationPeriod { start, end });
            }
            Ok(CriterionOutcome::Certified)
        }
        Err(RegistryError::Rejected { payload, .. }) => {
            criterion.attempts += result.attempts;
            criterion.certified_at = Some(now);
            criterion.data_returned_by_api = Some(payload);
            Ok(CriterionOutcome::NotCertified)
        }
        Err(RegistryError::NotConfigured) => Ok(CriterionOutcome::Skipped),
        Err(err) => {
            criterion.attempts += result.attempts;
            criterion.data_returned_by_api = Some(Value::String(err.to_string()));
            Ok(CriterionOutcome::Deferred)
        }
    }
}

/// Tally of one certification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CertificationReport {
    pub diagnoses: usize,
    pub certified: usize,
    pub not_certified: usize,
    pub deferred: usize,
    /// Diagnoses left alone because of incomplete identity data or a failed write.
    pub skipped: usize,
}

impl CertificationReport {
    pub fn record(&mut self, outcome: CriterionOutcome) {
        match outcome {
            CriterionOutcome::Certified => self.certified += 1,
            CriterionOutcome::NotCertified => self.not_certified += 1,
            CriterionOutcome::Deferred => self.deferred += 1,
            CriterionOutcome::Skipped => {}
        }
    }

    pub fn merge(&mut self, other: CertificationReport) {
        self.diagnoses += other.diagnoses;
        self.certified += other.certified;
        self.not_certified += other.not_certified;
        self.deferred += other.deferred;
        self.skipped += other.skipped;
    }
}
