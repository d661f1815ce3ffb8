//! Scenario: submission is all-or-nothing.
//!
//! # Invariants under test
//! 1. Incomplete KYC data (missing id number, unverified proof of address,
//!    directorless business registration) refuses the filing with
//!    "incomplete data" and persists no submission row — and never even
//!    reaches the regulator.
//! 2. A regulator outage after validation equally persists nothing; the
//!    error is retryable and a later retry files exactly one row.

use ff_pipeline::{PipelineError, Store};
use ff_schemas::CompanyRegistration;
use ff_testkit::{clean_extract, t0, World, TEST_ICCID};

#[test]
fn missing_id_number_is_refused_without_a_ledger_row() {
    let world = World::new();
    let mut extract = clean_extract();
    extract.id_number = "".to_string();
    let session_id = world.seed_kyc_session(extract);
    let seeded = world.seed_ready_order(session_id);

    let err = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect_err("incomplete data must refuse the filing");

    match &err {
        PipelineError::Validation(msg) => {
            assert!(msg.contains("incomplete data"), "got: {msg}")
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(world.store.count_submissions().unwrap(), 0);
    assert_eq!(
        world.regulator.request_count(),
        0,
        "validation failures must never reach the regulator"
    );
}

#[test]
fn unverified_proof_of_address_is_refused() {
    let world = World::new();
    let mut extract = clean_extract();
    extract.proof_of_address.as_mut().unwrap().verified = false;
    let session_id = world.seed_kyc_session(extract);
    let seeded = world.seed_ready_order(session_id);

    let err = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect_err("unverified address must refuse the filing");
    assert!(err.to_string().contains("incomplete data"), "{err}");
    assert_eq!(world.store.count_submissions().unwrap(), 0);
}

#[test]
fn business_account_without_directors_is_refused() {
    let world = World::new();
    let mut extract = clean_extract();
    extract.company = Some(CompanyRegistration {
        registration_number: "2019/123456/07".to_string(),
        company_name: "Example Trading (Pty) Ltd".to_string(),
        verified: true,
        directors: vec![],
    });
    let session_id = world.seed_kyc_session(extract);
    let seeded = world.seed_ready_order(session_id);

    let err = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect_err("directorless business must refuse the filing");
    assert!(err.to_string().contains("incomplete data"), "{err}");
    assert_eq!(world.store.count_submissions().unwrap(), 0);
}

#[test]
fn regulator_outage_leaves_no_half_written_submission() {
    let world = World::new();
    let session_id = world.seed_kyc_session(clean_extract());
    let seeded = world.seed_ready_order(session_id);

    world.regulator.fail_next("connection reset by peer");
    let err = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect_err("outage must surface");
    assert!(err.is_retryable(), "an outage is a retry signal: {err}");
    assert_eq!(
        world.store.count_submissions().unwrap(),
        0,
        "a failed regulator call must write nothing"
    );

    // The retry files exactly one row.
    world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("retry succeeds");
    assert_eq!(world.store.count_submissions().unwrap(), 1);

    // And re-submitting after success is idempotent: same row, no second
    // regulator filing.
    world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("re-submit returns the existing receipt");
    assert_eq!(world.store.count_submissions().unwrap(), 1);
    assert_eq!(world.regulator.request_count(), 1);
}
