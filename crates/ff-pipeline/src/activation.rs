//! Activation & provisioning service.
//!
//! Turns a regulator-approved, installation-complete order into a live
//! service: customer login, billing cycle, status flip, SLA stamp. Every
//! step is independently idempotent, so a retry after a partial failure
//! never re-runs completed work and concurrent attempts converge on one
//! account, one billing cycle, and one `Active` transition.

use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use ff_orders::{plan_transition, Order, OrderStatus, TransitionContext};
use ff_schemas::{BillingCycle, Notification, SlaTracking, SubmissionStatus};

use crate::adapters::{
    plan_code_for_package, AccountCreateOutcome, BillingPlatform, IdentityProvider, Notifier,
    SubscriptionRequest,
};
use crate::billing::prorata_for_activation;
use crate::credentials::{generate_account_number, generate_temp_credential};
use crate::error::{PipelineError, PipelineResult};
use crate::store::Store;

/// What `activate` did. `NotReady` and `AlreadyActive` are successes — the
/// caller (webhook processor, retry job, admin retrigger) decides whether to
/// keep the order queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated { account_number: String },
    /// A concurrent attempt already won; nothing left to do.
    AlreadyActive,
    /// The order has not reached `PendingActivation` yet (installation still
    /// in flight). Activation stays queued.
    NotReady { status: OrderStatus },
}

pub struct ActivationService<'a> {
    store: &'a dyn Store,
    identity: &'a dyn IdentityProvider,
    billing: &'a dyn BillingPlatform,
    notifier: &'a dyn Notifier,
    currency: String,
}

impl<'a> ActivationService<'a> {
    pub fn new(
        store: &'a dyn Store,
        identity: &'a dyn IdentityProvider,
        billing: &'a dyn BillingPlatform,
        notifier: &'a dyn Notifier,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            identity,
            billing,
            notifier,
            currency: currency.into(),
        }
    }

    /// Activate `order_id`. Safe to re-invoke: a failure in any step leaves
    /// the order in its pre-activation status and completed steps are
    /// detected and skipped on the next attempt.
    pub fn activate(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> PipelineResult<ActivationOutcome> {
        // Step 1 — load the full context. A missing contract is fatal: there
        // is nothing to bill against and retrying cannot conjure one.
        let mut order = self
            .store
            .load_order(order_id)?
            .ok_or_else(|| PipelineError::FatalData(format!("order {order_id} not found")))?;

        let contract_id = order.contract_id.ok_or_else(|| {
            PipelineError::FatalData(format!(
                "order {} has no signed contract; cannot bill",
                order.order_number
            ))
        })?;
        let contract = self.store.load_contract(contract_id)?.ok_or_else(|| {
            PipelineError::FatalData(format!("contract {contract_id} missing for order {order_id}"))
        })?;

        match order.status {
            OrderStatus::Active => return Ok(ActivationOutcome::AlreadyActive),
            OrderStatus::PendingActivation => {}
            status => return Ok(ActivationOutcome::NotReady { status }),
        }

        let submission = self.store.find_submission_by_order(order_id)?;
        let tracking_id = match &submission {
            Some(s) if s.status == SubmissionStatus::Approved => s.regulator_tracking_id.clone(),
            _ => {
                return Err(PipelineError::Validation(
                    "regulatory submission not approved; order cannot activate".to_string(),
                ))
            }
        };

        // Step 2 — customer login at the identity provider. Lookup goes to
        // the provider, not a local row; creation folds a uniqueness
        // violation into "already exists, fetch and continue".
        let mut issued_credential: Option<String> = None;
        let account = match self.identity.find_account(&order.customer_email)? {
            Some(existing) => existing,
            None => {
                let credential = generate_temp_credential(&mut rand::thread_rng(), 12);
                match self.identity.create_account(
                    &order.customer_email,
                    &order.customer_name,
                    &credential,
                )? {
                    AccountCreateOutcome::Created(account) => {
                        issued_credential = Some(credential);
                        account
                    }
                    AccountCreateOutcome::AlreadyExists(account) => account,
                }
            }
        };
        if order.customer_id != Some(account.customer_id) {
            order.customer_id = Some(account.customer_id);
            self.store.save_order(&order)?;
        }

        // Step 3 — billing cycle, exactly once. The platform call happens
        // before the local insert; a platform failure therefore writes
        // nothing and the whole step reruns cleanly.
        if self.store.billing_cycle(order_id)?.is_none() {
            let prorata = prorata_for_activation(contract.monthly_amount_cents, now.date_naive());
            let external_id = self.billing.create_subscription(&SubscriptionRequest {
                customer_id: account.customer_id,
                plan_code: plan_code_for_package(&order.package_name),
                amount_cents: contract.monthly_amount_cents,
                currency: self.currency.clone(),
                reference: order.order_number.clone(),
                start_date: prorata.next_billing_date,
            })?;

            let cycle = BillingCycle {
                order_id,
                monthly_amount_cents: contract.monthly_amount_cents,
                prorata_amount_cents: prorata.amount_cents,
                prorata_days: prorata.days,
                billing_cycle_day: prorata.billing_cycle_day,
                next_billing_date: prorata.next_billing_date,
                created_at: now,
            };
            match self.store.insert_billing_cycle(&cycle) {
                Ok(()) => {}
                // A concurrent attempt inserted first; theirs stands.
                Err(PipelineError::Conflict(_)) => {}
                Err(other) => return Err(other),
            }

            if order.external_subscription_id.as_deref() != Some(external_id.as_str()) {
                order.external_subscription_id = Some(external_id);
                self.store.save_order(&order)?;
            }
        }

        if order.account_number.is_none() {
            order.account_number =
                Some(generate_account_number(&mut rand::thread_rng(), now.year()));
            self.store.save_order(&order)?;
        }

        // Step 4 — the status flip. The store's compare-and-swap on the
        // expected prior status is the concurrency guard; a loser observes
        // Active and no-ops.
        let ctx = TransitionContext {
            reason: Some(format!("regulatory registration {tracking_id} approved")),
            automated: true,
            customer_notified: true,
            regulatory_approved: true,
            ..Default::default()
        };
        let change = plan_transition(
            order.id,
            OrderStatus::PendingActivation,
            OrderStatus::Active,
            &ctx,
            now,
        )
        .map_err(|e| PipelineError::Validation(e.to_string()))?;

        match self.store.apply_transition(&change) {
            Ok(updated) => order = updated,
            Err(PipelineError::Conflict(_)) => {
                let current = self.store.load_order(order_id)?.ok_or_else(|| {
                    PipelineError::FatalData(format!("order {order_id} vanished mid-activation"))
                })?;
                if current.status == OrderStatus::Active {
                    self.stamp_sla(&current, now)?;
                    return Ok(ActivationOutcome::AlreadyActive);
                }
                return Err(PipelineError::Conflict(format!(
                    "order {} moved to {} during activation",
                    order_id,
                    current.status.as_str()
                )));
            }
            Err(other) => return Err(other),
        }

        // Step 5 — SLA stamp, once.
        self.stamp_sla(&order, now)?;

        self.send_welcome(&order, issued_credential.as_deref());

        let account_number = order
            .account_number
            .clone()
            .unwrap_or_else(|| order.order_number.clone());
        info!(
            order_id = %order_id,
            account_number = %account_number,
            "service activated"
        );
        Ok(ActivationOutcome::Activated { account_number })
    }

    fn stamp_sla(&self, order: &Order, now: DateTime<Utc>) -> PipelineResult<()> {
        let mut sla = self
            .store
            .sla_tracking(order.id)?
            .unwrap_or(SlaTracking {
                order_id: order.id,
                order_placed_at: order.created_at,
                installation_completed_at: None,
                activated_at: None,
            });
        if sla.activated_at.is_none() {
            sla.activated_at = Some(now);
            self.store.upsert_sla_tracking(&sla)?;
        }
        Ok(())
    }

    /// Welcome notification. Fire-and-forget: a delivery failure is logged
    /// and never fails the activation.
    fn send_welcome(&self, order: &Order, credential: Option<&str>) {
        let mut data = json!({
            "customer_name": order.customer_name,
            "order_number": order.order_number,
            "package_name": order.package_name,
            "account_number": order.account_number,
        });
        if let Some(credential) = credential {
            data["temporary_credential"] = json!(credential);
            data["password_change_required"] = json!(true);
        }
        let notification = Notification {
            to: order.customer_email.clone(),
            template: "service-activated".to_string(),
            data,
        };
        if let Err(err) = self.notifier.send(&notification) {
            warn!(order_id = %order.id, error = %err, "welcome notification failed; continuing");
        }
    }
}
