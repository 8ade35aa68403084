use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::JobSeekerId;

/// Read model of a job seeker as provided by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSeekerProfile {
    pub id: JobSeekerId,
    pub first_name: String,
    pub last_name: String,
    pub birthdate: Option<NaiveDate>,
    /// Commune code, only meaningful for people born in France.
    pub birth_place: Option<String>,
    /// ISO 3166 alpha-2 code.
    pub birth_country: Option<String>,
    pub nir: Option<String>,
    pub lack_of_nir_reason: Option<LackOfNirReason>,
}

impl JobSeekerProfile {
    pub fn born_in_france(&self) -> bool {
        self.birth_country
            .as_deref()
            .map_or(false, |country| country.trim().eq_ignore_ascii_case(FRANCE))
    }

    /// Whether the profile carries enough identity data to match an approval automatically.
    pub fn identity_matchable(&self) -> bool {
        let has_nir = self
            .nir
            .as_deref()
            .map_or(false, |nir| !nir.trim().is_empty());
        if has_nir {
            return true;
        }
        matches!(
            self.lack_of_nir_reason,
            Some(LackOfNirReason::TemporaryNumber) | Some(LackOfNirReason::NoNir)
        )
    }
}

pub const FRANCE: &str = "FR";

/// Declared reason for a profile without a social security number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LackOfNirReason {
    TemporaryNumber,
    NoNir,
    /// The job seeker has a NIR but it was not provided.
    NirAssociatedToOtherAccount,
}

impl LackOfNirReason {
    pub const fn label(self) -> &'static str {
        match self {
            LackOfNirReason::TemporaryNumber => "temporary_number",
            LackOfNirReason::NoNir => "no_nir",
            LackOfNirReason::NirAssociatedToOtherAccount => "nir_associated_to_other",
        }
    }
}
