//! In-memory implementation of the pipeline store contract.
//!
//! Backs the daemon in sandbox mode and every in-process scenario test.
//! Status writes go through the same compare-and-swap discipline a SQL
//! deployment uses, so races exercised against this store behave like the
//! real thing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ff_orders::{Order, StatusChange};
use ff_pipeline::{PipelineError, PipelineResult, Store};
use ff_schemas::{
    BillingCycle, Contract, KycSession, RegulatorySubmission, SlaTracking, SubmissionStatus,
};

#[derive(Default)]
struct Inner {
    orders: BTreeMap<Uuid, Order>,
    history: BTreeMap<Uuid, Vec<StatusChange>>,
    contracts: BTreeMap<Uuid, Contract>,
    kyc_sessions: BTreeMap<Uuid, KycSession>,
    submissions: BTreeMap<Uuid, RegulatorySubmission>,
    webhook_inbox: BTreeSet<(Uuid, String)>,
    activation_queue: BTreeSet<Uuid>,
    billing_cycles: BTreeMap<Uuid, BillingCycle>,
    sla: BTreeMap<Uuid, SlaTracking>,
}

/// Shared in-memory store. Cheap to clone behind an `Arc`; all access is
/// serialized on one mutex, which is plenty for a sandbox.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning only happens if a holder panicked; the data is still
        // consistent for our append-only structures, so recover.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn insert_order(&self, order: &Order) -> PipelineResult<()> {
        let mut inner = self.lock();
        if inner.orders.contains_key(&order.id) {
            return Err(PipelineError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    fn load_order(&self, id: Uuid) -> PipelineResult<Option<Order>> {
        Ok(self.lock().orders.get(&id).cloned())
    }

    fn save_order(&self, order: &Order) -> PipelineResult<()> {
        let mut inner = self.lock();
        let stored = inner.orders.get_mut(&order.id).ok_or_else(|| {
            PipelineError::Validation(format!("unknown order {}", order.id))
        })?;
        if stored.status != order.status {
            return Err(PipelineError::Conflict(
                "status may only change through apply_transition".to_string(),
            ));
        }
        *stored = order.clone();
        Ok(())
    }

    fn apply_transition(&self, change: &StatusChange) -> PipelineResult<Order> {
        let mut inner = self.lock();
        let order = inner.orders.get_mut(&change.order_id).ok_or_else(|| {
            PipelineError::Validation(format!("unknown order {}", change.order_id))
        })?;

        // The compare-and-swap: the expectation captured at planning time
        // must still hold at write time.
        if order.status != change.old_status {
            return Err(PipelineError::Conflict(format!(
                "expected order {} in {}, found {}",
                change.order_id,
                change.old_status.as_str(),
                order.status.as_str()
            )));
        }

        order.status = change.new_status;
        order.updated_at = change.changed_at;
        let updated = order.clone();
        inner
            .history
            .entry(change.order_id)
            .or_default()
            .push(change.clone());
        Ok(updated)
    }

    fn status_history(&self, order_id: Uuid) -> PipelineResult<Vec<StatusChange>> {
        Ok(self.lock().history.get(&order_id).cloned().unwrap_or_default())
    }

    fn insert_contract(&self, contract: &Contract) -> PipelineResult<()> {
        self.lock().contracts.insert(contract.id, contract.clone());
        Ok(())
    }

    fn load_contract(&self, id: Uuid) -> PipelineResult<Option<Contract>> {
        Ok(self.lock().contracts.get(&id).cloned())
    }

    fn insert_kyc_session(&self, session: &KycSession) -> PipelineResult<()> {
        self.lock().kyc_sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn load_kyc_session(&self, id: Uuid) -> PipelineResult<Option<KycSession>> {
        Ok(self.lock().kyc_sessions.get(&id).cloned())
    }

    fn insert_submission(&self, submission: &RegulatorySubmission) -> PipelineResult<()> {
        let mut inner = self.lock();
        if inner.submissions.contains_key(&submission.id) {
            return Err(PipelineError::Conflict(format!(
                "submission {} already exists",
                submission.id
            )));
        }
        inner.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    fn load_submission(&self, id: Uuid) -> PipelineResult<Option<RegulatorySubmission>> {
        Ok(self.lock().submissions.get(&id).cloned())
    }

    fn find_submission_by_order(
        &self,
        order_id: Uuid,
    ) -> PipelineResult<Option<RegulatorySubmission>> {
        let inner = self.lock();
        Ok(inner
            .submissions
            .values()
            .filter(|s| s.order_id == order_id)
            .max_by_key(|s| s.submitted_at)
            .cloned())
    }

    fn count_submissions(&self) -> PipelineResult<usize> {
        Ok(self.lock().submissions.len())
    }

    fn resolve_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        rejection_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> PipelineResult<RegulatorySubmission> {
        let mut inner = self.lock();
        let submission = inner
            .submissions
            .get_mut(&id)
            .ok_or_else(|| PipelineError::Validation(format!("unknown submission {id}")))?;

        match (submission.status, status) {
            (SubmissionStatus::Submitted, SubmissionStatus::Approved)
            | (SubmissionStatus::Submitted, SubmissionStatus::Rejected) => {
                submission.status = status;
                submission.rejection_reason = rejection_reason;
                submission.updated_at = now;
                Ok(submission.clone())
            }
            // Idempotent re-resolution to the same terminal status.
            (current, requested) if current == requested => Ok(submission.clone()),
            (current, requested) => Err(PipelineError::Conflict(format!(
                "submission {id} is {}; cannot move to {}",
                current.as_str(),
                requested.as_str()
            ))),
        }
    }

    fn mark_webhook_seen(&self, submission_id: Uuid, event_kind: &str) -> PipelineResult<bool> {
        Ok(self
            .lock()
            .webhook_inbox
            .insert((submission_id, event_kind.to_string())))
    }

    fn enqueue_activation(&self, order_id: Uuid) -> PipelineResult<()> {
        self.lock().activation_queue.insert(order_id);
        Ok(())
    }

    fn dequeue_activation(&self, order_id: Uuid) -> PipelineResult<()> {
        self.lock().activation_queue.remove(&order_id);
        Ok(())
    }

    fn pending_activations(&self) -> PipelineResult<Vec<Uuid>> {
        Ok(self.lock().activation_queue.iter().copied().collect())
    }

    fn billing_cycle(&self, order_id: Uuid) -> PipelineResult<Option<BillingCycle>> {
        Ok(self.lock().billing_cycles.get(&order_id).cloned())
    }

    fn insert_billing_cycle(&self, cycle: &BillingCycle) -> PipelineResult<()> {
        let mut inner = self.lock();
        if inner.billing_cycles.contains_key(&cycle.order_id) {
            return Err(PipelineError::Conflict(format!(
                "billing cycle for order {} already exists",
                cycle.order_id
            )));
        }
        inner.billing_cycles.insert(cycle.order_id, cycle.clone());
        Ok(())
    }

    fn sla_tracking(&self, order_id: Uuid) -> PipelineResult<Option<SlaTracking>> {
        Ok(self.lock().sla.get(&order_id).cloned())
    }

    fn upsert_sla_tracking(&self, sla: &SlaTracking) -> PipelineResult<()> {
        self.lock().sla.insert(sla.order_id, sla.clone());
        Ok(())
    }
}
