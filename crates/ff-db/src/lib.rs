//! ff-db
//!
//! Postgres persistence for the activation pipeline. Free async functions
//! over a `PgPool`, runtime-bound queries, embedded migrations. The critical
//! pieces are the conditional status update (the compare-and-swap the whole
//! concurrency model hangs on), the webhook inbox dedup insert, and the
//! unique-email account upsert. [`PgStore`] wraps these functions into the
//! pipeline's `Store` contract for the live daemon.

mod store;

pub use store::{PgIdentityDirectory, PgStore};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ff_orders::{Order, OrderStatus, StatusChange};
use ff_schemas::{
    BillingCycle, Contract, CustomerAccount, KycSession, KycVerificationResult,
    RegulatorySubmission, SlaTracking, SubmissionStatus,
};

pub const ENV_DB_URL: &str = "FF_DATABASE_URL";

/// Connect to Postgres using FF_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Count orders currently mid-activation (approved but not yet active).
/// Used by CLI guardrails to refuse migrating a database with in-flight
/// activations.
pub async fn count_orders_mid_activation(pool: &PgPool) -> Result<i64> {
    // If the schema doesn't exist yet, treat as 0 (safe) rather than failing.
    let st = status(pool).await?;
    if !st.has_orders_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from orders
        where status in ('pending_activation', 'installation_in_progress')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_orders_mid_activation failed")?;

    Ok(n)
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub async fn insert_order(pool: &PgPool, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        insert into orders (
          order_id, order_number, customer_id, contract_id, kyc_session_id,
          customer_email, customer_name, package_name,
          monthly_amount_cents, installation_fee_cents,
          status, scheduled_date, scheduled_time_slot,
          external_subscription_id, account_number, created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
        )
        "#,
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.customer_id)
    .bind(order.contract_id)
    .bind(order.kyc_session_id)
    .bind(&order.customer_email)
    .bind(&order.customer_name)
    .bind(&order.package_name)
    .bind(order.monthly_amount_cents)
    .bind(order.installation_fee_cents)
    .bind(order.status.as_str())
    .bind(order.scheduled_date)
    .bind(&order.scheduled_time_slot)
    .bind(&order.external_subscription_id)
    .bind(&order.account_number)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await
    .context("insert_order failed")?;

    Ok(())
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order> {
    let status_raw: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("invalid order status in db: {status_raw}"))?;
    Ok(Order {
        id: row.try_get("order_id")?,
        order_number: row.try_get("order_number")?,
        customer_id: row.try_get("customer_id")?,
        contract_id: row.try_get("contract_id")?,
        kyc_session_id: row.try_get("kyc_session_id")?,
        customer_email: row.try_get("customer_email")?,
        customer_name: row.try_get("customer_name")?,
        package_name: row.try_get("package_name")?,
        monthly_amount_cents: row.try_get("monthly_amount_cents")?,
        installation_fee_cents: row.try_get("installation_fee_cents")?,
        status,
        scheduled_date: row.try_get("scheduled_date")?,
        scheduled_time_slot: row.try_get("scheduled_time_slot")?,
        external_subscription_id: row.try_get("external_subscription_id")?,
        account_number: row.try_get("account_number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn load_order(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>> {
    let row = sqlx::query("select * from orders where order_id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .context("load_order failed")?;
    row.as_ref().map(order_from_row).transpose()
}

/// Persist non-status order fields, guarded on the caller's view of the
/// status so a status change can never be smuggled through this path.
/// Returns `false` when the guard did not match (missing row or drift);
/// the caller re-reads to tell the two apart.
pub async fn save_order_fields(pool: &PgPool, order: &Order) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        update orders
        set customer_id = $1, contract_id = $2, kyc_session_id = $3,
            scheduled_date = $4, scheduled_time_slot = $5,
            external_subscription_id = $6, account_number = $7, updated_at = $8
        where order_id = $9 and status = $10
        "#,
    )
    .bind(order.customer_id)
    .bind(order.contract_id)
    .bind(order.kyc_session_id)
    .bind(order.scheduled_date)
    .bind(&order.scheduled_time_slot)
    .bind(&order.external_subscription_id)
    .bind(&order.account_number)
    .bind(order.updated_at)
    .bind(order.id)
    .bind(order.status.as_str())
    .execute(pool)
    .await
    .context("save_order_fields failed")?;
    Ok(updated.rows_affected() == 1)
}

fn status_change_from_row(row: &sqlx::postgres::PgRow) -> Result<StatusChange> {
    let old_raw: String = row.try_get("old_status")?;
    let new_raw: String = row.try_get("new_status")?;
    Ok(StatusChange {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        old_status: OrderStatus::parse(&old_raw)
            .ok_or_else(|| anyhow!("invalid status in history: {old_raw}"))?,
        new_status: OrderStatus::parse(&new_raw)
            .ok_or_else(|| anyhow!("invalid status in history: {new_raw}"))?,
        reason: row.try_get("reason")?,
        changed_by: row.try_get("changed_by")?,
        automated: row.try_get("automated")?,
        customer_notified: row.try_get("customer_notified")?,
        changed_at: row.try_get("changed_at")?,
    })
}

/// Append-only history for one order, oldest first.
pub async fn status_history(pool: &PgPool, order_id: Uuid) -> Result<Vec<StatusChange>> {
    let rows = sqlx::query(
        "select * from order_status_history where order_id = $1 order by changed_at, id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
    .context("status_history failed")?;
    rows.iter().map(status_change_from_row).collect()
}

/// The compare-and-swap status write. Applies the transition and appends the
/// history row in one transaction, but only while the order is still in
/// `change.old_status`. Returns `false` when the expectation no longer holds
/// (a concurrent caller won); the caller re-reads and decides.
pub async fn conditional_status_update(pool: &PgPool, change: &StatusChange) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin transition tx")?;

    let updated = sqlx::query(
        r#"
        update orders
        set status = $1, updated_at = $2
        where order_id = $3 and status = $4
        "#,
    )
    .bind(change.new_status.as_str())
    .bind(change.changed_at)
    .bind(change.order_id)
    .bind(change.old_status.as_str())
    .execute(&mut *tx)
    .await
    .context("conditional status update failed")?;

    if updated.rows_affected() != 1 {
        tx.rollback().await.ok();
        return Ok(false);
    }

    sqlx::query(
        r#"
        insert into order_status_history (
          id, order_id, old_status, new_status, reason, changed_by,
          automated, customer_notified, changed_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(change.id)
    .bind(change.order_id)
    .bind(change.old_status.as_str())
    .bind(change.new_status.as_str())
    .bind(&change.reason)
    .bind(&change.changed_by)
    .bind(change.automated)
    .bind(change.customer_notified)
    .bind(change.changed_at)
    .execute(&mut *tx)
    .await
    .context("append status history failed")?;

    tx.commit().await.context("commit transition tx")?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Contracts & KYC read models
// ---------------------------------------------------------------------------

pub async fn insert_contract(pool: &PgPool, contract: &Contract) -> Result<()> {
    sqlx::query(
        r#"
        insert into contracts (contract_id, contract_number, monthly_amount_cents, signed_at)
        values ($1, $2, $3, $4)
        on conflict (contract_id) do nothing
        "#,
    )
    .bind(contract.id)
    .bind(&contract.contract_number)
    .bind(contract.monthly_amount_cents)
    .bind(contract.signed_at)
    .execute(pool)
    .await
    .context("insert_contract failed")?;
    Ok(())
}

pub async fn load_contract(pool: &PgPool, contract_id: Uuid) -> Result<Option<Contract>> {
    let row = sqlx::query("select * from contracts where contract_id = $1")
        .bind(contract_id)
        .fetch_optional(pool)
        .await
        .context("load_contract failed")?;
    row.map(|r| {
        Ok(Contract {
            id: r.try_get("contract_id")?,
            contract_number: r.try_get("contract_number")?,
            monthly_amount_cents: r.try_get("monthly_amount_cents")?,
            signed_at: r.try_get("signed_at")?,
        })
    })
    .transpose()
}

/// Insert-or-replace: the session read model is fed by the verification
/// subsystem and may be updated (e.g. a reviewer's verdict lands later).
pub async fn upsert_kyc_session(pool: &PgPool, session: &KycSession) -> Result<()> {
    sqlx::query(
        r#"
        insert into kyc_sessions (
          session_id, verification_result, risk_tier, extracted_data, completed_at
        ) values ($1, $2, $3, $4, $5)
        on conflict (session_id) do update set
          verification_result = excluded.verification_result,
          risk_tier = excluded.risk_tier,
          extracted_data = excluded.extracted_data,
          completed_at = excluded.completed_at
        "#,
    )
    .bind(session.id)
    .bind(session.verification_result.map(|r| r.as_str()))
    .bind(&session.risk_tier)
    .bind(serde_json::to_value(&session.extracted_data)?)
    .bind(session.completed_at)
    .execute(pool)
    .await
    .context("upsert_kyc_session failed")?;
    Ok(())
}

pub async fn load_kyc_session(pool: &PgPool, session_id: Uuid) -> Result<Option<KycSession>> {
    let row = sqlx::query("select * from kyc_sessions where session_id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await
        .context("load_kyc_session failed")?;
    row.map(|r| {
        let result_raw: Option<String> = r.try_get("verification_result")?;
        let verification_result = match result_raw {
            Some(s) => Some(
                KycVerificationResult::parse(&s)
                    .ok_or_else(|| anyhow!("invalid verification result in db: {s}"))?,
            ),
            None => None,
        };
        Ok(KycSession {
            id: r.try_get("session_id")?,
            verification_result,
            risk_tier: r.try_get("risk_tier")?,
            extracted_data: serde_json::from_value(r.try_get("extracted_data")?)
                .context("decode extracted_data")?,
            completed_at: r.try_get("completed_at")?,
        })
    })
    .transpose()
}

// ---------------------------------------------------------------------------
// Regulatory submissions
// ---------------------------------------------------------------------------

pub async fn insert_submission(pool: &PgPool, submission: &RegulatorySubmission) -> Result<()> {
    sqlx::query(
        r#"
        insert into regulatory_submissions (
          submission_id, order_id, kyc_session_id, device_identifiers,
          regulator_tracking_id, status, rejection_reason, submitted_at, updated_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(submission.id)
    .bind(submission.order_id)
    .bind(submission.kyc_session_id)
    .bind(serde_json::to_value(&submission.device_identifiers)?)
    .bind(&submission.regulator_tracking_id)
    .bind(submission.status.as_str())
    .bind(&submission.rejection_reason)
    .bind(submission.submitted_at)
    .bind(submission.updated_at)
    .execute(pool)
    .await
    .context("insert_submission failed")?;
    Ok(())
}

fn submission_from_row(row: &sqlx::postgres::PgRow) -> Result<RegulatorySubmission> {
    let status_raw: String = row.try_get("status")?;
    let status = SubmissionStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("invalid submission status in db: {status_raw}"))?;
    Ok(RegulatorySubmission {
        id: row.try_get("submission_id")?,
        order_id: row.try_get("order_id")?,
        kyc_session_id: row.try_get("kyc_session_id")?,
        device_identifiers: serde_json::from_value(row.try_get("device_identifiers")?)
            .context("decode device_identifiers")?,
        regulator_tracking_id: row.try_get("regulator_tracking_id")?,
        status,
        rejection_reason: row.try_get("rejection_reason")?,
        submitted_at: row.try_get("submitted_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn load_submission(
    pool: &PgPool,
    submission_id: Uuid,
) -> Result<Option<RegulatorySubmission>> {
    let row = sqlx::query("select * from regulatory_submissions where submission_id = $1")
        .bind(submission_id)
        .fetch_optional(pool)
        .await
        .context("load_submission failed")?;
    row.as_ref().map(submission_from_row).transpose()
}

/// Latest filing for an order (re-filings after a rejection supersede).
pub async fn find_submission_by_order(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Option<RegulatorySubmission>> {
    let row = sqlx::query(
        r#"
        select * from regulatory_submissions
        where order_id = $1
        order by submitted_at desc
        limit 1
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await
    .context("find_submission_by_order failed")?;
    row.as_ref().map(submission_from_row).transpose()
}

pub async fn count_submissions(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*)::bigint from regulatory_submissions")
            .fetch_one(pool)
            .await
            .context("count_submissions failed")?;
    Ok(n)
}

/// Forward-only resolution: succeeds only from the `submitted` state, so a
/// terminal status can never be overwritten or reset.
pub async fn resolve_submission(
    pool: &PgPool,
    submission_id: Uuid,
    status: SubmissionStatus,
    rejection_reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        update regulatory_submissions
        set status = $1, rejection_reason = $2, updated_at = $3
        where submission_id = $4 and status = 'submitted'
        "#,
    )
    .bind(status.as_str())
    .bind(rejection_reason)
    .bind(now)
    .bind(submission_id)
    .execute(pool)
    .await
    .context("resolve_submission failed")?;
    Ok(updated.rows_affected() == 1)
}

// ---------------------------------------------------------------------------
// Webhook inbox
// ---------------------------------------------------------------------------

/// Dedup gate for at-least-once webhook delivery. Returns `true` the first
/// time a (submission, kind) pair is seen, `false` on redelivery.
pub async fn inbox_insert_deduped(
    pool: &PgPool,
    submission_id: Uuid,
    event_kind: &str,
) -> Result<bool> {
    let inserted = sqlx::query(
        r#"
        insert into webhook_inbox (submission_id, event_kind)
        values ($1, $2)
        on conflict do nothing
        "#,
    )
    .bind(submission_id)
    .bind(event_kind)
    .execute(pool)
    .await
    .context("inbox_insert_deduped failed")?;
    Ok(inserted.rows_affected() == 1)
}

// ---------------------------------------------------------------------------
// Customer accounts
// ---------------------------------------------------------------------------

fn account_from_row(row: &sqlx::postgres::PgRow) -> Result<CustomerAccount> {
    Ok(CustomerAccount {
        customer_id: row.try_get("customer_id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn find_customer_account(
    pool: &PgPool,
    email: &str,
) -> Result<Option<CustomerAccount>> {
    let row = sqlx::query(
        "select customer_id, email, full_name, created_at from customer_accounts where email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("find_customer_account failed")?;
    row.as_ref().map(account_from_row).transpose()
}

/// Upsert keyed on the unique email constraint. A concurrent creator's row
/// wins and is returned — "already exists, fetch and continue", never an
/// error. Only the creating row stores the temporary-credential hash.
pub async fn upsert_customer_account(
    pool: &PgPool,
    account: &CustomerAccount,
    credential_sha256: Option<&str>,
) -> Result<CustomerAccount> {
    sqlx::query(
        r#"
        insert into customer_accounts (
          customer_id, email, full_name, created_at, credential_sha256
        ) values ($1, $2, $3, $4, $5)
        on conflict (email) do nothing
        "#,
    )
    .bind(account.customer_id)
    .bind(&account.email)
    .bind(&account.full_name)
    .bind(account.created_at)
    .bind(credential_sha256)
    .execute(pool)
    .await
    .context("upsert_customer_account insert failed")?;

    let row = sqlx::query(
        "select customer_id, email, full_name, created_at from customer_accounts where email = $1",
    )
    .bind(&account.email)
    .fetch_one(pool)
    .await
    .context("upsert_customer_account re-read failed")?;

    account_from_row(&row)
}

// ---------------------------------------------------------------------------
// Activation queue
// ---------------------------------------------------------------------------

pub async fn enqueue_activation(pool: &PgPool, order_id: Uuid) -> Result<()> {
    sqlx::query(
        "insert into activation_queue (order_id) values ($1) on conflict do nothing",
    )
    .bind(order_id)
    .execute(pool)
    .await
    .context("enqueue_activation failed")?;
    Ok(())
}

pub async fn dequeue_activation(pool: &PgPool, order_id: Uuid) -> Result<()> {
    sqlx::query("delete from activation_queue where order_id = $1")
        .bind(order_id)
        .execute(pool)
        .await
        .context("dequeue_activation failed")?;
    Ok(())
}

pub async fn pending_activations(pool: &PgPool) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("select order_id from activation_queue order by enqueued_at")
        .fetch_all(pool)
        .await
        .context("pending_activations failed")?;
    rows.iter()
        .map(|r| r.try_get("order_id").map_err(Into::into))
        .collect()
}

// ---------------------------------------------------------------------------
// Billing cycles & SLA tracking
// ---------------------------------------------------------------------------

/// Exactly-once creation via the primary key: returns `true` when this call
/// created the cycle, `false` when one already existed.
pub async fn insert_billing_cycle(pool: &PgPool, cycle: &BillingCycle) -> Result<bool> {
    let inserted = sqlx::query(
        r#"
        insert into billing_cycles (
          order_id, monthly_amount_cents, prorata_amount_cents, prorata_days,
          billing_cycle_day, next_billing_date, created_at
        ) values ($1, $2, $3, $4, $5, $6, $7)
        on conflict do nothing
        "#,
    )
    .bind(cycle.order_id)
    .bind(cycle.monthly_amount_cents)
    .bind(cycle.prorata_amount_cents)
    .bind(cycle.prorata_days)
    .bind(cycle.billing_cycle_day as i32)
    .bind(cycle.next_billing_date)
    .bind(cycle.created_at)
    .execute(pool)
    .await
    .context("insert_billing_cycle failed")?;
    Ok(inserted.rows_affected() == 1)
}

pub async fn load_billing_cycle(pool: &PgPool, order_id: Uuid) -> Result<Option<BillingCycle>> {
    let row = sqlx::query("select * from billing_cycles where order_id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .context("load_billing_cycle failed")?;
    row.map(|r| {
        let cycle_day: i32 = r.try_get("billing_cycle_day")?;
        Ok(BillingCycle {
            order_id: r.try_get("order_id")?,
            monthly_amount_cents: r.try_get("monthly_amount_cents")?,
            prorata_amount_cents: r.try_get("prorata_amount_cents")?,
            prorata_days: r.try_get("prorata_days")?,
            billing_cycle_day: cycle_day as u32,
            next_billing_date: r.try_get("next_billing_date")?,
            created_at: r.try_get("created_at")?,
        })
    })
    .transpose()
}

pub async fn load_sla_tracking(pool: &PgPool, order_id: Uuid) -> Result<Option<SlaTracking>> {
    let row = sqlx::query("select * from sla_tracking where order_id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .context("load_sla_tracking failed")?;
    row.map(|r| {
        Ok(SlaTracking {
            order_id: r.try_get("order_id")?,
            order_placed_at: r.try_get("order_placed_at")?,
            installation_completed_at: r.try_get("installation_completed_at")?,
            activated_at: r.try_get("activated_at")?,
        })
    })
    .transpose()
}

pub async fn upsert_sla_tracking(pool: &PgPool, sla: &SlaTracking) -> Result<()> {
    sqlx::query(
        r#"
        insert into sla_tracking (
          order_id, order_placed_at, installation_completed_at, activated_at
        ) values ($1, $2, $3, $4)
        on conflict (order_id) do update set
          installation_completed_at = excluded.installation_completed_at,
          activated_at = excluded.activated_at
        "#,
    )
    .bind(sla.order_id)
    .bind(sla.order_placed_at)
    .bind(sla.installation_completed_at)
    .bind(sla.activated_at)
    .execute(pool)
    .await
    .context("upsert_sla_tracking failed")?;
    Ok(())
}
