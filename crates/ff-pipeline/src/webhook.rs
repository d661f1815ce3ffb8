//! Regulatory webhook processor.
//!
//! Consumes the regulator's asynchronous approve/reject callbacks and drives
//! the next pipeline step. Delivery is at-least-once and unordered, so the
//! processor is built around three rules:
//!
//! 1. **Dedup first.** An inbox gate keyed on (submission id, event kind)
//!    makes redelivery a no-op before any side effect can run.
//! 2. **Terminal status wins.** A stale event that conflicts with an
//!    already-terminal submission is logged and refused — a rejection can
//!    never overwrite an approval.
//! 3. **Success to the sender.** Duplicates and conflicts are reported as
//!    success so the regulator stops re-sending; the distinction survives in
//!    the returned [`WebhookOutcome`] and the logs.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use ff_orders::{plan_transition, OrderStatus, TransitionContext};
use ff_schemas::{Notification, RegulatorEvent, SubmissionStatus};

use crate::activation::{ActivationOutcome, ActivationService};
use crate::adapters::Notifier;
use crate::error::{PipelineError, PipelineResult};
use crate::store::Store;

/// How the event was absorbed. All three are "success" to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// First delivery; side effects ran.
    Applied,
    /// Redelivery of an already-processed event; no side effects.
    Duplicate,
    /// Stale/out-of-order event conflicting with a terminal status; refused
    /// without overwriting anything.
    Conflict,
}

pub struct WebhookProcessor<'a> {
    store: &'a dyn Store,
    activation: &'a ActivationService<'a>,
    notifier: &'a dyn Notifier,
}

impl<'a> WebhookProcessor<'a> {
    pub fn new(
        store: &'a dyn Store,
        activation: &'a ActivationService<'a>,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            store,
            activation,
            notifier,
        }
    }

    pub fn process(
        &self,
        event: &RegulatorEvent,
        now: DateTime<Utc>,
    ) -> PipelineResult<WebhookOutcome> {
        let submission = self
            .store
            .load_submission(event.submission_id())?
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "unknown submission {} in webhook",
                    event.submission_id()
                ))
            })?;

        if submission.order_id != event.order_id() {
            return Err(PipelineError::Validation(format!(
                "webhook order {} does not match submission order {}",
                event.order_id(),
                submission.order_id
            )));
        }

        // Inbox gate: first delivery of this (submission, kind) only.
        if !self.store.mark_webhook_seen(submission.id, event.kind())? {
            info!(
                submission_id = %submission.id,
                kind = event.kind(),
                "duplicate webhook delivery; no-op"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        match (submission.status, event) {
            (SubmissionStatus::Submitted, RegulatorEvent::Approved { .. }) => {
                self.apply_approval(submission.id, event, now)
            }
            (SubmissionStatus::Submitted, RegulatorEvent::Rejected { rejection_reason, .. }) => {
                self.apply_rejection(event, rejection_reason, now)
            }

            // Status already matches the event: the work was done on an
            // earlier delivery (inbox state may have been rebuilt since).
            (SubmissionStatus::Approved, RegulatorEvent::Approved { .. })
            | (SubmissionStatus::Rejected, RegulatorEvent::Rejected { .. }) => {
                info!(
                    submission_id = %submission.id,
                    kind = event.kind(),
                    "submission already in matching terminal status; no-op"
                );
                Ok(WebhookOutcome::Duplicate)
            }

            // Out-of-order contradiction. The terminal status stands.
            (terminal, _) => {
                warn!(
                    submission_id = %submission.id,
                    current = terminal.as_str(),
                    incoming = event.kind(),
                    "conflicting webhook for terminal submission; refusing to overwrite"
                );
                Ok(WebhookOutcome::Conflict)
            }
        }
    }

    fn apply_approval(
        &self,
        submission_id: Uuid,
        event: &RegulatorEvent,
        now: DateTime<Utc>,
    ) -> PipelineResult<WebhookOutcome> {
        let order_id = event.order_id();
        self.store
            .resolve_submission(submission_id, SubmissionStatus::Approved, None, now)?;

        // Durable trigger first: even if the inline attempt below cannot
        // finish, the order stays queued for the retry job.
        self.store.enqueue_activation(order_id)?;

        match self.activation.activate(order_id, now) {
            Ok(ActivationOutcome::Activated { .. }) | Ok(ActivationOutcome::AlreadyActive) => {
                self.store.dequeue_activation(order_id)?;
            }
            Ok(ActivationOutcome::NotReady { status }) => {
                info!(
                    order_id = %order_id,
                    status = status.as_str(),
                    "approval recorded; activation deferred until installation completes"
                );
            }
            Err(err) if err.is_retryable() => {
                warn!(order_id = %order_id, error = %err, "activation attempt failed; left queued for retry");
            }
            Err(PipelineError::FatalData(detail)) => {
                error!(order_id = %order_id, detail = %detail, "activation needs human attention");
                self.store.dequeue_activation(order_id)?;
                self.escalate(order_id, &detail);
            }
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "activation attempt refused; left queued");
            }
        }

        Ok(WebhookOutcome::Applied)
    }

    fn apply_rejection(
        &self,
        event: &RegulatorEvent,
        reason: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<WebhookOutcome> {
        let order_id = event.order_id();
        let submission = self.store.resolve_submission(
            event.submission_id(),
            SubmissionStatus::Rejected,
            Some(reason.to_string()),
            now,
        )?;

        // Never auto-cancel: rejections can stem from benign data-entry
        // errors, and a human must decide. The order is parked for review.
        let order = self
            .store
            .load_order(order_id)?
            .ok_or_else(|| PipelineError::FatalData(format!("order {order_id} not found")))?;

        match order.status {
            OrderStatus::Failed | OrderStatus::Cancelled => {
                info!(
                    order_id = %order_id,
                    status = order.status.as_str(),
                    "rejection recorded; order already parked"
                );
            }
            from => {
                let ctx = TransitionContext {
                    reason: Some(format!(
                        "regulatory registration rejected: {reason}; held for compliance review"
                    )),
                    automated: true,
                    ..Default::default()
                };
                let change = plan_transition(order_id, from, OrderStatus::Failed, &ctx, now)
                    .map_err(|e| PipelineError::Validation(e.to_string()))?;
                match self.store.apply_transition(&change) {
                    Ok(_) => {}
                    // A racing admin moved the order; the rejection is
                    // recorded on the submission either way.
                    Err(PipelineError::Conflict(detail)) => {
                        warn!(order_id = %order_id, detail = %detail, "order moved during rejection handling");
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        self.escalate(
            order_id,
            &format!(
                "regulatory registration {} rejected: {reason}",
                submission.regulator_tracking_id
            ),
        );

        // Customer-facing copy never exposes the internal rejection detail:
        // the application simply remains under review until an admin decides.
        let under_review = Notification {
            to: order.customer_email.clone(),
            template: "application-under-review".to_string(),
            data: json!({
                "customer_name": order.customer_name,
                "order_number": order.order_number,
            }),
        };
        if let Err(err) = self.notifier.send(&under_review) {
            warn!(order_id = %order_id, error = %err, "customer notification failed; continuing");
        }

        Ok(WebhookOutcome::Applied)
    }

    /// Admin escalation message. Fire-and-forget.
    fn escalate(&self, order_id: Uuid, detail: &str) {
        let notification = Notification {
            to: "compliance-review".to_string(),
            template: "admin-escalation".to_string(),
            data: json!({
                "order_id": order_id.to_string(),
                "detail": detail,
                "severity": "warning",
            }),
        };
        if let Err(err) = self.notifier.send(&notification) {
            warn!(order_id = %order_id, error = %err, "admin escalation failed; continuing");
        }
    }
}
