//! Scenario: duplicate approval delivery must not duplicate side effects.
//!
//! # Invariants under test
//! Webhook delivery is at-least-once. Delivering the same `approved` event
//! twice (and thrice) yields exactly one billing cycle, one customer
//! account, one Active transition, and one welcome notification. The second
//! delivery is reported as a no-op Duplicate — still success to the sender.

use ff_orders::OrderStatus;
use ff_pipeline::{Store, WebhookOutcome};
use ff_testkit::{approved_event, clean_extract, t0, World, TEST_ICCID};

#[test]
fn second_and_third_deliveries_are_noops() {
    let world = World::new();
    let session_id = world.seed_kyc_session(clean_extract());
    let seeded = world.seed_ready_order(session_id);
    let receipt = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("submit");

    let event = approved_event(
        receipt.submission_id,
        seeded.order_id,
        &receipt.regulator_tracking_id,
    );

    let first = world.process_webhook(&event, t0()).expect("first delivery");
    assert_eq!(first, WebhookOutcome::Applied);

    for n in 2..=3 {
        let redelivery = world.process_webhook(&event, t0()).expect("redelivery");
        assert_eq!(
            redelivery,
            WebhookOutcome::Duplicate,
            "delivery #{n} must be absorbed as a duplicate"
        );
    }

    // Side effects happened exactly once.
    let order = world.store.load_order(seeded.order_id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    assert_eq!(
        world.transitions_into(seeded.order_id, OrderStatus::Active),
        1,
        "exactly one Active transition in the audit trail"
    );
    assert!(world.store.billing_cycle(seeded.order_id).unwrap().is_some());
    assert_eq!(world.billing.subscription_count(), 1);
    assert_eq!(world.identity.account_count(), 1);
    assert_eq!(
        world.notifier.count_template("service-activated"),
        1,
        "welcome notification must not be re-sent on redelivery"
    );
}
