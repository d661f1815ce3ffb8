//! Scenario: the filing is gated on the risk score.
//!
//! # Invariants under test
//! 1. A medium-tier extract is held for a compliance reviewer: no filing
//!    happens until the session carries the reviewer's approval.
//! 2. After the reviewer approves, the same submission call files normally.
//! 3. A sanctioned match is high tier no matter how clean the rest of the
//!    profile is, and never files at all.

use ff_pipeline::{PipelineError, Store};
use ff_risk::RiskTier;
use ff_schemas::KycVerificationResult;
use ff_testkit::{clean_extract, t0, World, TEST_ICCID};

#[test]
fn medium_tier_waits_for_the_reviewer() {
    let world = World::new();
    let mut extract = clean_extract();
    // 25 + 30 + 15 = 70: medium tier.
    extract.liveness_score = Some(0.75);
    extract.aml_flags = vec!["adverse media".to_string()];
    assert_eq!(ff_risk::score(&extract).risk_tier, RiskTier::Medium);

    // Reviewer has not looked at it yet.
    let session_id =
        world.seed_kyc_session_with_result(extract, Some(KycVerificationResult::PendingReview));
    let seeded = world.seed_ready_order(session_id);

    let err = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect_err("medium tier must be held before filing");
    match &err {
        PipelineError::Validation(msg) => {
            assert!(msg.contains("compliance review"), "got: {msg}")
        }
        other => panic!("expected a validation hold, got {other:?}"),
    }
    assert_eq!(world.store.count_submissions().unwrap(), 0);
    assert_eq!(world.regulator.request_count(), 0);

    // The reviewer approves; the identical call now files.
    world.set_session_result(session_id, KycVerificationResult::Approved);
    world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("reviewed session files normally");
    assert_eq!(world.store.count_submissions().unwrap(), 1);
}

#[test]
fn sanctioned_match_never_files() {
    let world = World::new();
    let mut extract = clean_extract();
    extract.sanctions_match = true;
    assert_eq!(ff_risk::score(&extract).risk_tier, RiskTier::High);

    // Even a (mistaken) reviewer approval cannot push a sanctioned match
    // through: the veto is scored, not reviewed.
    let session_id = world.seed_kyc_session(extract);
    let seeded = world.seed_ready_order(session_id);

    let err = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect_err("high tier must never file");
    assert!(err.to_string().contains("declined"), "{err}");
    assert_eq!(world.store.count_submissions().unwrap(), 0);
    assert_eq!(world.regulator.request_count(), 0);
}
