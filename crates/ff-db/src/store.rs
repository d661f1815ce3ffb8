//! Postgres-backed implementations of the pipeline's store and identity
//! contracts.
//!
//! The pipeline services are synchronous; sqlx is async. [`PgStore`] bridges
//! the two by driving each query to completion on the runtime handle it
//! captured at construction.
//!
//! # Threading contract
//!
//! Methods MUST be called from a blocking context (`spawn_blocking`), never
//! from an async task — `Handle::block_on` panics inside an async execution
//! context. The daemon routes every store-touching handler through
//! `spawn_blocking` for exactly this reason.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::runtime::Handle;
use uuid::Uuid;

use ff_orders::{Order, StatusChange};
use ff_pipeline::{
    AccountCreateOutcome, IdentityProvider, PipelineError, PipelineResult, Store,
};
use ff_schemas::{
    BillingCycle, Contract, CustomerAccount, KycSession, RegulatorySubmission, SlaTracking,
    SubmissionStatus,
};

fn db_err(err: anyhow::Error) -> PipelineError {
    PipelineError::external("database", format!("{err:#}"))
}

/// Durable store over Postgres. All of the contract's sharp edges land on
/// the database: the status compare-and-swap is a conditional `UPDATE`, the
/// webhook inbox is a unique-key `ON CONFLICT DO NOTHING`, and billing-cycle
/// exactly-once rides the primary key.
pub struct PgStore {
    pool: PgPool,
    handle: Handle,
}

impl PgStore {
    /// Capture the current runtime handle; must be constructed inside the
    /// tokio runtime that will outlive it.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            handle: Handle::current(),
        }
    }

    fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> PipelineResult<T> {
        self.handle.block_on(fut).map_err(db_err)
    }
}

impl Store for PgStore {
    fn insert_order(&self, order: &Order) -> PipelineResult<()> {
        self.run(crate::insert_order(&self.pool, order))
    }

    fn load_order(&self, id: Uuid) -> PipelineResult<Option<Order>> {
        self.run(crate::load_order(&self.pool, id))
    }

    fn save_order(&self, order: &Order) -> PipelineResult<()> {
        if self.run(crate::save_order_fields(&self.pool, order))? {
            return Ok(());
        }
        // The guarded update missed: either the row is gone or the status
        // moved under us.
        match self.run(crate::load_order(&self.pool, order.id))? {
            None => Err(PipelineError::Validation(format!(
                "unknown order {}",
                order.id
            ))),
            Some(_) => Err(PipelineError::Conflict(
                "status may only change through apply_transition".to_string(),
            )),
        }
    }

    fn apply_transition(&self, change: &StatusChange) -> PipelineResult<Order> {
        if !self.run(crate::conditional_status_update(&self.pool, change))? {
            return match self.run(crate::load_order(&self.pool, change.order_id))? {
                None => Err(PipelineError::Validation(format!(
                    "unknown order {}",
                    change.order_id
                ))),
                Some(current) => Err(PipelineError::Conflict(format!(
                    "expected order {} in {}, found {}",
                    change.order_id,
                    change.old_status.as_str(),
                    current.status.as_str()
                ))),
            };
        }
        self.run(crate::load_order(&self.pool, change.order_id))?
            .ok_or_else(|| {
                PipelineError::Validation(format!("order {} vanished", change.order_id))
            })
    }

    fn status_history(&self, order_id: Uuid) -> PipelineResult<Vec<StatusChange>> {
        self.run(crate::status_history(&self.pool, order_id))
    }

    fn insert_contract(&self, contract: &Contract) -> PipelineResult<()> {
        self.run(crate::insert_contract(&self.pool, contract))
    }

    fn load_contract(&self, id: Uuid) -> PipelineResult<Option<Contract>> {
        self.run(crate::load_contract(&self.pool, id))
    }

    fn insert_kyc_session(&self, session: &KycSession) -> PipelineResult<()> {
        self.run(crate::upsert_kyc_session(&self.pool, session))
    }

    fn load_kyc_session(&self, id: Uuid) -> PipelineResult<Option<KycSession>> {
        self.run(crate::load_kyc_session(&self.pool, id))
    }

    fn insert_submission(&self, submission: &RegulatorySubmission) -> PipelineResult<()> {
        self.run(crate::insert_submission(&self.pool, submission))
    }

    fn load_submission(&self, id: Uuid) -> PipelineResult<Option<RegulatorySubmission>> {
        self.run(crate::load_submission(&self.pool, id))
    }

    fn find_submission_by_order(
        &self,
        order_id: Uuid,
    ) -> PipelineResult<Option<RegulatorySubmission>> {
        self.run(crate::find_submission_by_order(&self.pool, order_id))
    }

    fn count_submissions(&self) -> PipelineResult<usize> {
        self.run(crate::count_submissions(&self.pool))
            .map(|n| n as usize)
    }

    fn resolve_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        rejection_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> PipelineResult<RegulatorySubmission> {
        let moved = self.run(crate::resolve_submission(
            &self.pool,
            id,
            status,
            rejection_reason.as_deref(),
            now,
        ))?;

        let current = self
            .run(crate::load_submission(&self.pool, id))?
            .ok_or_else(|| PipelineError::Validation(format!("unknown submission {id}")))?;

        if moved || current.status == status {
            // Either we moved it, or it already carried the requested
            // terminal status (idempotent re-resolution).
            Ok(current)
        } else {
            Err(PipelineError::Conflict(format!(
                "submission {id} is {}; cannot move to {}",
                current.status.as_str(),
                status.as_str()
            )))
        }
    }

    fn mark_webhook_seen(&self, submission_id: Uuid, event_kind: &str) -> PipelineResult<bool> {
        self.run(crate::inbox_insert_deduped(
            &self.pool,
            submission_id,
            event_kind,
        ))
    }

    fn enqueue_activation(&self, order_id: Uuid) -> PipelineResult<()> {
        self.run(crate::enqueue_activation(&self.pool, order_id))
    }

    fn dequeue_activation(&self, order_id: Uuid) -> PipelineResult<()> {
        self.run(crate::dequeue_activation(&self.pool, order_id))
    }

    fn pending_activations(&self) -> PipelineResult<Vec<Uuid>> {
        self.run(crate::pending_activations(&self.pool))
    }

    fn billing_cycle(&self, order_id: Uuid) -> PipelineResult<Option<BillingCycle>> {
        self.run(crate::load_billing_cycle(&self.pool, order_id))
    }

    fn insert_billing_cycle(&self, cycle: &BillingCycle) -> PipelineResult<()> {
        if self.run(crate::insert_billing_cycle(&self.pool, cycle))? {
            Ok(())
        } else {
            Err(PipelineError::Conflict(format!(
                "billing cycle for order {} already exists",
                cycle.order_id
            )))
        }
    }

    fn sla_tracking(&self, order_id: Uuid) -> PipelineResult<Option<SlaTracking>> {
        self.run(crate::load_sla_tracking(&self.pool, order_id))
    }

    fn upsert_sla_tracking(&self, sla: &SlaTracking) -> PipelineResult<()> {
        self.run(crate::upsert_sla_tracking(&self.pool, sla))
    }
}

/// Identity provider backed by our own datastore: the customer directory is
/// the `customer_accounts` table and provisioning is the unique-email
/// upsert. Used when no external identity endpoint is configured. Same
/// threading contract as [`PgStore`].
pub struct PgIdentityDirectory {
    pool: PgPool,
    handle: Handle,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            handle: Handle::current(),
        }
    }

    fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> PipelineResult<T> {
        self.handle.block_on(fut).map_err(db_err)
    }
}

impl IdentityProvider for PgIdentityDirectory {
    fn find_account(&self, email: &str) -> PipelineResult<Option<CustomerAccount>> {
        self.run(crate::find_customer_account(&self.pool, email))
    }

    fn create_account(
        &self,
        email: &str,
        full_name: &str,
        temporary_credential: &str,
    ) -> PipelineResult<AccountCreateOutcome> {
        let candidate = CustomerAccount {
            customer_id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            created_at: Utc::now(),
        };
        // Only the hash is persisted; the cleartext credential goes to the
        // customer through the welcome notification and nowhere else.
        let credential_sha256 = hex::encode(Sha256::digest(temporary_credential.as_bytes()));

        let stored = self.run(crate::upsert_customer_account(
            &self.pool,
            &candidate,
            Some(&credential_sha256),
        ))?;

        if stored.customer_id == candidate.customer_id {
            Ok(AccountCreateOutcome::Created(stored))
        } else {
            // Unique-email constraint kept the earlier row: already exists,
            // fetch and continue.
            Ok(AccountCreateOutcome::AlreadyExists(stored))
        }
    }
}
