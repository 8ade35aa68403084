use serde_json::json;

use super::common::*;
use crate::workflows::eligibility::{
    AdministrativeCriterion, CertificationIdentity, CertificationPeriod, CertificationResponse,
    IdentityError, RegistryError,
};

#[test]
fn certified_criterion_gets_a_period_with_grace() {
    let harness = harness(date(2024, 5, 10), vec![certified_from(date(2024, 1, 1))]);
    harness.register(profile("js-1"));
    let diagnosis = harness.diagnose(
        "js-1",
        prescriber(),
        vec![AdministrativeCriterion::Rsa, AdministrativeCriterion::Deld],
    );
    assert!(diagnosis.has_pending_certification());

    let report = harness
        .service
        .certify_diagnosis(diagnosis.id)
        .expect("certification ran");
    assert_eq!(report.certified, 1);
    assert_eq!(harness.registry.calls().len(), 1);
    assert_eq!(harness.registry.calls()[0].birth_place.as_deref(), Some("75056"));

    let stored = harness.service.diagnosis(diagnosis.id).expect("diagnosis");
    let rsa = stored
        .criteria
        .iter()
        .find(|criterion| criterion.kind == AdministrativeCriterion::Rsa)
        .expect("rsa selected");
    assert_eq!(rsa.certified, Some(true));
    assert_eq!(
        rsa.certification_period,
        Some(CertificationPeriod {
            start: date(2024, 1, 1),
            end: date(2024, 8, 10),
        })
    );
    assert!(rsa.is_certified_on(date(2024, 8, 10)));
    assert!(!rsa.is_certified_on(date(2024, 8, 11)));
    assert!(!stored.has_pending_certification());

    let again = harness
        .service
        .certify_diagnosis(diagnosis.id)
        .expect("second run");
    assert_eq!(again.certified, 0);
    assert_eq!(harness.registry.calls().len(), 1);
}

#[test]
fn transient_failures_are_retried_then_deferred() {
    let harness = harness(
        date(2024, 5, 10),
        vec![
            Err(RegistryError::Timeout),
            Err(RegistryError::RateLimited),
            Err(RegistryError::Unavailable("maintenance".to_string())),
        ],
    );
    harness.register(profile("js-1"));
    let diagnosis = harness.diagnose("js-1", prescriber(), vec![AdministrativeCriterion::Aah]);

    let report = harness
        .service
        .certify_diagnosis(diagnosis.id)
        .expect("certification ran");
    assert_eq!(report.deferred, 1);
    assert_eq!(harness.registry.calls().len(), 3);

    let stored = harness.service.diagnosis(diagnosis.id).expect("diagnosis");
    assert!(stored.has_pending_certification());
    assert_eq!(stored.criteria[0].attempts, 3);
    assert_eq!(stored.criteria[0].certified, None);
}

#[test]
fn a_retry_can_still_succeed() {
    let harness = harness(
        date(2024, 5, 10),
        vec![Err(RegistryError::Timeout), certified_from(date(2024, 3, 1))],
    );
    harness.register(profile("js-1"));
    let diagnosis = harness.diagnose("js-1", prescriber(), vec![AdministrativeCriterion::Pi]);

    let report = harness
        .service
        .certify_diagnosis(diagnosis.id)
        .expect("certification ran");
    assert_eq!(report.certified, 1);
    let stored = harness.service.diagnosis(diagnosis.id).expect("diagnosis");
    assert_eq!(stored.criteria[0].attempts, 2);
}

#[test]
fn rejected_lookups_are_final_without_certifying() {
    let harness = harness(
        date(2024, 5, 10),
        vec![
            Err(RegistryError::Rejected {
                status: 404,
                payload: json!({ "error": "not_found" }),
            }),
            Ok(CertificationResponse {
                is_certified: false,
                start_at: None,
                raw_response: json!({ "status": "non_beneficiaire" }),
            }),
        ],
    );
    harness.register(profile("js-1"));
    let diagnosis = harness.diagnose(
        "js-1",
        prescriber(),
        vec![AdministrativeCriterion::Rsa, AdministrativeCriterion::Rqth],
    );

    let report = harness
        .service
        .certify_diagnosis(diagnosis.id)
        .expect("certification ran");
    assert_eq!(report.not_certified, 2);

    let stored = harness.service.diagnosis(diagnosis.id).expect("diagnosis");
    assert!(!stored.has_pending_certification());
    assert_eq!(stored.criteria[0].certified, None);
    assert_eq!(
        stored.criteria[0].data_returned_by_api,
        Some(json!({ "error": "not_found" }))
    );
    assert_eq!(stored.criteria[1].certified, Some(false));
    assert!(stored.criteria[1].certification_period.is_none());
}

#[test]
fn batch_skips_incomplete_identities_and_continues() {
    let harness = harness(date(2024, 5, 10), vec![certified_from(date(2024, 1, 1))]);
    let mut incomplete = profile("js-1");
    incomplete.birthdate = None;
    harness.register(incomplete);
    harness.register(profile("js-2"));
    harness.diagnose("js-1", prescriber(), vec![AdministrativeCriterion::Rsa]);
    let complete = harness.diagnose("js-2", prescriber(), vec![AdministrativeCriterion::Rsa]);

    let report = harness.service.certify_pending().expect("batch ran");
    assert_eq!(report.diagnoses, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.certified, 1);

    let stored = harness.service.diagnosis(complete.id).expect("diagnosis");
    assert!(!stored.has_pending_certification());
}

#[test]
fn identity_requires_a_birth_place_only_for_france() {
    let mut french = profile("js-1");
    french.birth_place = None;
    assert_eq!(
        CertificationIdentity::from_profile(&french),
        Err(IdentityError::MissingBirthPlace)
    );

    let mut foreign = profile("js-2");
    foreign.birth_country = Some("be".to_string());
    let identity = CertificationIdentity::from_profile(&foreign).expect("identity");
    assert_eq!(identity.birth_place, None);
    assert_eq!(identity.birth_country, "BE");

    let mut unnamed = profile("js-3");
    unnamed.last_name = "  ".to_string();
    assert_eq!(
        CertificationIdentity::from_profile(&unnamed),
        Err(IdentityError::MissingName)
    );
}

#[test]
fn only_registry_backed_criteria_can_be_certified() {
    let harness = harness(date(2024, 5, 10), vec![certified_from(date(2024, 1, 1))]);
    harness.register(profile("js-1"));

    let declarative = harness.diagnose(
        "js-1",
        prescriber(),
        vec![AdministrativeCriterion::Deld, AdministrativeCriterion::Qpv],
    );
    assert!(!declarative.criteria_can_be_certified());
    assert!(!declarative.has_pending_certification());

    let mixed = harness.diagnose(
        "js-1",
        employer("company-x"),
        vec![AdministrativeCriterion::Deld, AdministrativeCriterion::Rqth],
    );
    assert!(mixed.criteria_can_be_certified());

    harness
        .service
        .certify_diagnosis(mixed.id)
        .expect("certification ran");
    let certified = harness.service.diagnosis(mixed.id).expect("diagnosis");
    assert!(!certified.has_pending_certification());
    assert!(certified.criteria_can_be_certified());
}
