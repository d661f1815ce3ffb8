//! Scenario: activation retries never re-run completed work.
//!
//! # Invariants under test
//! 1. A billing-platform outage mid-activation leaves the order in its
//!    pre-activation status, with the activation durably queued and no
//!    partial billing row written.
//! 2. The retry completes the remaining steps and reuses the account created
//!    on the first attempt.
//! 3. Invoking `activate` again after success is a clean `AlreadyActive`
//!    no-op: still one account, one billing cycle, one Active transition.

use ff_orders::OrderStatus;
use ff_pipeline::{ActivationOutcome, Store, WebhookOutcome};
use ff_testkit::{approved_event, clean_extract, t0, World, TEST_ICCID};

#[test]
fn partial_failure_then_retry_converges_on_one_of_everything() {
    let world = World::new();
    let session_id = world.seed_kyc_session(clean_extract());
    let seeded = world.seed_ready_order(session_id);
    let receipt = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("submit");

    // First attempt: the billing platform is down. The webhook is still
    // absorbed (success to the sender); activation stays queued.
    world.billing.fail_next("gateway timeout");
    let event = approved_event(
        receipt.submission_id,
        seeded.order_id,
        &receipt.regulator_tracking_id,
    );
    assert_eq!(
        world.process_webhook(&event, t0()).unwrap(),
        WebhookOutcome::Applied
    );

    let order = world.store.load_order(seeded.order_id).unwrap().unwrap();
    assert_eq!(
        order.status,
        OrderStatus::PendingActivation,
        "failed activation must leave the order in its pre-activation status"
    );
    assert!(
        world.store.billing_cycle(seeded.order_id).unwrap().is_none(),
        "no partial billing row may survive the outage"
    );
    assert_eq!(
        world.store.pending_activations().unwrap(),
        vec![seeded.order_id],
        "activation must remain durably queued for the retry job"
    );
    // The account step had already completed; the retry must reuse it.
    assert_eq!(world.identity.account_count(), 1);

    // Retry (what the retry job or an admin retrigger does).
    let outcome = world
        .activation_service()
        .activate(seeded.order_id, t0())
        .expect("retry succeeds once billing is back");
    assert!(matches!(outcome, ActivationOutcome::Activated { .. }));

    let order = world.store.load_order(seeded.order_id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Active);

    // A second invocation (simulated duplicate retry) is a no-op.
    let again = world
        .activation_service()
        .activate(seeded.order_id, t0())
        .expect("re-invocation is safe");
    assert_eq!(again, ActivationOutcome::AlreadyActive);

    assert_eq!(world.identity.account_count(), 1, "exactly one account");
    assert_eq!(
        world.identity.create_call_count(),
        1,
        "the retry found the account instead of re-creating it"
    );
    assert_eq!(world.billing.subscription_count(), 1);
    assert_eq!(world.transitions_into(seeded.order_id, OrderStatus::Active), 1);
}
