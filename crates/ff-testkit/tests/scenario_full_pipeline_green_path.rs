//! Scenario: the whole pipeline, clean inputs, no failures.
//!
//! # Invariants under test
//! 1. A clean KYC extract scores low-tier and auto-approves.
//! 2. Filing the registration persists exactly one Submitted row with the
//!    regulator's tracking id, built entirely from the extract.
//! 3. The approval webhook drives activation to completion: customer account
//!    created, billing cycle seeded from the contract, order Active, SLA
//!    stamped, welcome notification sent.
//!
//! All in-process; no DB or network required.

use ff_orders::OrderStatus;
use ff_pipeline::{Store, WebhookOutcome};
use ff_risk::RiskTier;
use ff_schemas::SubmissionStatus;
use ff_testkit::{approved_event, clean_extract, t0, World, TEST_ICCID};

#[test]
fn clean_profile_flows_from_kyc_to_active_service() {
    let world = World::new();

    // KYC completes and the extract auto-approves.
    let extract = clean_extract();
    let breakdown = ff_risk::score(&extract);
    assert_eq!(breakdown.total_score, 100);
    assert_eq!(breakdown.risk_tier, RiskTier::Low);
    assert!(breakdown.auto_approved);

    let session_id = world.seed_kyc_session(extract);
    let seeded = world.seed_ready_order(session_id);

    // File the registration.
    let receipt = world
        .submission_service()
        .submit(session_id, seeded.order_id, &[TEST_ICCID.to_string()], t0())
        .expect("submission must succeed on complete data");
    assert_eq!(world.store.count_submissions().unwrap(), 1);
    assert_eq!(world.regulator.request_count(), 1);

    // The filing is auto-populated: subscriber and address come straight
    // from the extract, provider identity from config.
    let filed = world.regulator.last_request().expect("request recorded");
    assert_eq!(filed.subscriber.id_number, "8001015009087");
    assert_eq!(filed.address.city, "Cape Town");
    assert_eq!(filed.service_lines.len(), 1);
    assert_eq!(filed.provider_license, ff_testkit::PROVIDER_LICENSE);

    // The regulator approves asynchronously.
    let event = approved_event(
        receipt.submission_id,
        seeded.order_id,
        &receipt.regulator_tracking_id,
    );
    let outcome = world.process_webhook(&event, t0()).expect("webhook ok");
    assert_eq!(outcome, WebhookOutcome::Applied);

    // Submission approved, order active.
    let submission = world
        .store
        .load_submission(receipt.submission_id)
        .unwrap()
        .unwrap();
    assert_eq!(submission.status, SubmissionStatus::Approved);

    let order = world.store.load_order(seeded.order_id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    assert!(order.customer_id.is_some(), "order linked to the new account");
    assert!(order.account_number.is_some());
    assert_eq!(
        order.external_subscription_id.as_deref(),
        Some("sandbox:sub:ORD-2025-0001"),
        "billing platform id persisted back onto the order"
    );

    // Provisioning ran exactly once each.
    assert_eq!(world.identity.account_count(), 1);
    assert_eq!(world.billing.subscription_count(), 1);
    let cycle = world.store.billing_cycle(seeded.order_id).unwrap().unwrap();
    assert_eq!(cycle.monthly_amount_cents, 69_900);

    let sla = world.store.sla_tracking(seeded.order_id).unwrap().unwrap();
    assert!(sla.activated_at.is_some(), "activation timestamp stamped");

    // Welcome notification carried the temporary credential.
    assert_eq!(world.notifier.count_template("service-activated"), 1);
    let welcome = &world.notifier.sent()[0];
    assert_eq!(welcome.to, "john@example.com");
    assert!(welcome.data["temporary_credential"].is_string());

    // Activation no longer queued.
    assert!(world.store.pending_activations().unwrap().is_empty());

    // The audit trail shows exactly one entry into Active.
    assert_eq!(world.transitions_into(seeded.order_id, OrderStatus::Active), 1);
}
