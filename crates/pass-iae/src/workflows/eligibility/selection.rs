use std::cmp::Ordering;

use chrono::NaiveDate;

use super::domain::EligibilityDiagnosis;
use crate::workflows::ids::CompanyId;

/// Orders diagnoses by preference: prescriber diagnoses first, then the newest.
pub fn rank_for_reuse(left: &EligibilityDiagnosis, right: &EligibilityDiagnosis) -> Ordering {
    right
        .author
        .is_authorized_prescriber()
        .cmp(&left.author.is_authorized_prescriber())
        .then_with(|| right.created_at.cmp(&left.created_at))
        .then_with(|| right.id.cmp(&left.id))
}

/// Diagnosis that currently stands for the job seeker.
///
/// A diagnosis counts while it is valid, or regardless of its expiry while the job seeker
/// holds a valid approval. Employer diagnoses only count for their own company.
pub fn last_considered_valid<'a>(
    diagnoses: &'a [EligibilityDiagnosis],
    for_company: Option<&CompanyId>,
    today: NaiveDate,
    has_valid_approval: bool,
) -> Option<&'a EligibilityDiagnosis> {
    diagnoses
        .iter()
        .filter(|diagnosis| diagnosis.is_reusable_by(for_company))
        .filter(|diagnosis| has_valid_approval || diagnosis.is_valid_on(today))
        .min_by(|left, right| rank_for_reuse(left, right))
}
