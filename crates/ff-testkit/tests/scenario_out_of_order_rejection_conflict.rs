//! Scenario: a rejection arriving after a processed approval is a conflict.
//!
//! # Invariants under test
//! Webhook delivery may reorder. Once a submission is Approved (and the
//! order activated), a late `rejected` event must be refused: the submission
//! stays Approved, the order stays Active, and the outcome is Conflict —
//! which the HTTP surface still answers with success so the regulator stops
//! re-sending. The mirror case (approval after rejection) must equally never
//! resurrect a rejected filing.

use ff_orders::OrderStatus;
use ff_pipeline::{Store, WebhookOutcome};
use ff_schemas::SubmissionStatus;
use ff_testkit::{approved_event, clean_extract, rejected_event, t0, World, TEST_ICCID};

#[test]
fn late_rejection_never_overwrites_an_approval() {
    let world = World::new();
    let session_id = world.seed_kyc_session(clean_extract());
    let seeded = world.seed_ready_order(session_id);
    let receipt = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("submit");

    let approve = approved_event(
        receipt.submission_id,
        seeded.order_id,
        &receipt.regulator_tracking_id,
    );
    assert_eq!(
        world.process_webhook(&approve, t0()).unwrap(),
        WebhookOutcome::Applied
    );

    // The stale rejection arrives afterwards.
    let reject = rejected_event(
        receipt.submission_id,
        seeded.order_id,
        &receipt.regulator_tracking_id,
        "id number does not match national registry",
    );
    assert_eq!(
        world.process_webhook(&reject, t0()).unwrap(),
        WebhookOutcome::Conflict
    );

    let submission = world
        .store
        .load_submission(receipt.submission_id)
        .unwrap()
        .unwrap();
    assert_eq!(
        submission.status,
        SubmissionStatus::Approved,
        "approval must stand"
    );
    assert!(submission.rejection_reason.is_none());

    let order = world.store.load_order(seeded.order_id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Active, "service stays live");
}

#[test]
fn late_approval_never_resurrects_a_rejection() {
    let world = World::new();
    let session_id = world.seed_kyc_session(clean_extract());
    let seeded = world.seed_ready_order(session_id);
    let receipt = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("submit");

    let reject = rejected_event(
        receipt.submission_id,
        seeded.order_id,
        &receipt.regulator_tracking_id,
        "address could not be verified",
    );
    assert_eq!(
        world.process_webhook(&reject, t0()).unwrap(),
        WebhookOutcome::Applied
    );

    let approve = approved_event(
        receipt.submission_id,
        seeded.order_id,
        &receipt.regulator_tracking_id,
    );
    assert_eq!(
        world.process_webhook(&approve, t0()).unwrap(),
        WebhookOutcome::Conflict
    );

    let submission = world
        .store
        .load_submission(receipt.submission_id)
        .unwrap()
        .unwrap();
    assert_eq!(submission.status, SubmissionStatus::Rejected);

    let order = world.store.load_order(seeded.order_id).unwrap().unwrap();
    assert_eq!(
        order.status,
        OrderStatus::Failed,
        "order stays parked for review; the stale approval changes nothing"
    );
    assert!(
        world.store.billing_cycle(seeded.order_id).unwrap().is_none(),
        "no provisioning may run off a conflicting approval"
    );
}
