//! The persistence contract the pipeline runs against.
//!
//! One object-safe trait so services can hold `&dyn Store`. The in-memory
//! implementation lives in `ff-sandbox`; a Postgres-backed deployment maps
//! these operations onto `ff-db`'s conditional updates and unique
//! constraints.
//!
//! # Concurrency contract
//!
//! [`Store::apply_transition`] is the concurrency guard for the whole
//! pipeline: it must be a *conditional* write keyed on the audit row's
//! `old_status` (compare-and-swap), never read-then-write. A caller whose
//! expectation no longer holds gets [`PipelineError::Conflict`] and must
//! re-read to decide whether the desired state was reached by someone else.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ff_orders::{Order, StatusChange};
use ff_schemas::{
    BillingCycle, Contract, KycSession, RegulatorySubmission, SlaTracking, SubmissionStatus,
};

use crate::error::PipelineResult;

pub trait Store {
    // -- orders ------------------------------------------------------------

    fn insert_order(&self, order: &Order) -> PipelineResult<()>;
    fn load_order(&self, id: Uuid) -> PipelineResult<Option<Order>>;

    /// Persist non-status order fields (customer link, billing references,
    /// schedule). Implementations MUST refuse a status change smuggled
    /// through this path — status only moves via [`Store::apply_transition`].
    fn save_order(&self, order: &Order) -> PipelineResult<()>;

    /// Compare-and-swap status transition: applies `change` only while the
    /// order's current status equals `change.old_status`, appending the
    /// audit row in the same atomic step. Returns the updated order, or
    /// `Conflict` when the expectation no longer holds.
    fn apply_transition(&self, change: &StatusChange) -> PipelineResult<Order>;

    /// Append-only history, oldest first.
    fn status_history(&self, order_id: Uuid) -> PipelineResult<Vec<StatusChange>>;

    // -- contracts & KYC read models ---------------------------------------

    fn insert_contract(&self, contract: &Contract) -> PipelineResult<()>;
    fn load_contract(&self, id: Uuid) -> PipelineResult<Option<Contract>>;

    fn insert_kyc_session(&self, session: &KycSession) -> PipelineResult<()>;
    fn load_kyc_session(&self, id: Uuid) -> PipelineResult<Option<KycSession>>;

    // -- regulatory submissions --------------------------------------------

    fn insert_submission(&self, submission: &RegulatorySubmission) -> PipelineResult<()>;
    fn load_submission(&self, id: Uuid) -> PipelineResult<Option<RegulatorySubmission>>;
    fn find_submission_by_order(&self, order_id: Uuid)
        -> PipelineResult<Option<RegulatorySubmission>>;
    fn count_submissions(&self) -> PipelineResult<usize>;

    /// Forward-only resolution `Submitted → {Approved | Rejected}`. Any
    /// other move is a `Conflict`; a terminal status is never reset.
    fn resolve_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        rejection_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> PipelineResult<RegulatorySubmission>;

    // -- webhook inbox (at-least-once delivery dedup) ----------------------

    /// Records that `(submission_id, event_kind)` was delivered. Returns
    /// `true` the first time, `false` on redelivery. Mirrors an
    /// `INSERT ... ON CONFLICT DO NOTHING` on a unique key.
    fn mark_webhook_seen(&self, submission_id: Uuid, event_kind: &str) -> PipelineResult<bool>;

    // -- durable activation trigger ----------------------------------------

    fn enqueue_activation(&self, order_id: Uuid) -> PipelineResult<()>;
    fn dequeue_activation(&self, order_id: Uuid) -> PipelineResult<()>;
    fn pending_activations(&self) -> PipelineResult<Vec<Uuid>>;

    // -- provisioning records ----------------------------------------------

    fn billing_cycle(&self, order_id: Uuid) -> PipelineResult<Option<BillingCycle>>;
    /// Exactly-once creation: inserting a second cycle for the same order is
    /// a `Conflict`.
    fn insert_billing_cycle(&self, cycle: &BillingCycle) -> PipelineResult<()>;

    fn sla_tracking(&self, order_id: Uuid) -> PipelineResult<Option<SlaTracking>>;
    fn upsert_sla_tracking(&self, sla: &SlaTracking) -> PipelineResult<()>;
}
