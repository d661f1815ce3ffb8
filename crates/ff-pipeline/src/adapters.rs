//! Adapter traits for the external systems the pipeline coordinates.
//!
//! Each trait is the single path to one collaborator: the regulator's
//! registration API, the identity provider, the billing platform, and the
//! notification capability. Live HTTP implementations live in `ff-connect`;
//! deterministic fakes in `ff-sandbox`. The vendors' wire formats are
//! opaque request/response contracts behind these types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ff_schemas::{Address, CustomerAccount, Notification};

use crate::error::PipelineResult;

// ---------------------------------------------------------------------------
// Regulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberDetails {
    pub id_number: String,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLine {
    pub device_identifier: String,
    pub product_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMetadata {
    pub method: String,
    pub verified_at: DateTime<Utc>,
    pub session_id: Uuid,
}

/// Subscriber registration filed with the regulator. Built entirely from the
/// KYC extract plus order data — zero manual re-entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub subscriber: SubscriberDetails,
    pub address: Address,
    pub service_lines: Vec<ServiceLine>,
    pub provider_name: String,
    pub provider_license: String,
    pub verification: VerificationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Regulator-assigned tracking id quoted by all later callbacks.
    pub tracking_id: String,
}

pub trait RegulatorClient {
    /// Files the registration. An error here means nothing was persisted on
    /// our side; the caller retries the whole submission.
    fn register_subscriber(
        &self,
        request: &RegistrationRequest,
    ) -> PipelineResult<RegistrationResponse>;
}

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

/// Result of an account-create attempt. A uniqueness violation on email is
/// folded into `AlreadyExists` — never an error, per the upsert contract.
#[derive(Debug, Clone)]
pub enum AccountCreateOutcome {
    Created(CustomerAccount),
    AlreadyExists(CustomerAccount),
}

impl AccountCreateOutcome {
    pub fn account(&self) -> &CustomerAccount {
        match self {
            AccountCreateOutcome::Created(a) | AccountCreateOutcome::AlreadyExists(a) => a,
        }
    }
}

pub trait IdentityProvider {
    /// Lookup at the provider itself, not a local cache — avoids orphaned
    /// duplicate identities when the local row is stale.
    fn find_account(&self, email: &str) -> PipelineResult<Option<CustomerAccount>>;

    /// Create an account with the given temporary credential. Racing
    /// creators must converge: the loser gets `AlreadyExists` with the
    /// winner's account.
    fn create_account(
        &self,
        email: &str,
        full_name: &str,
        temporary_credential: &str,
    ) -> PipelineResult<AccountCreateOutcome>;
}

// ---------------------------------------------------------------------------
// Billing platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub customer_id: Uuid,
    pub plan_code: String,
    pub amount_cents: i64,
    pub currency: String,
    /// Our order number; the platform treats it as an idempotency reference.
    pub reference: String,
    pub start_date: NaiveDate,
}

pub trait BillingPlatform {
    /// Creates the recurring subscription; returns the platform's external
    /// subscription id, persisted back onto the order.
    fn create_subscription(&self, request: &SubscriptionRequest) -> PipelineResult<String>;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub trait Notifier {
    /// Fire-and-forget `send(to, template, data)`. Callers log failures and
    /// continue — notification trouble never blocks the pipeline.
    fn send(&self, notification: &Notification) -> PipelineResult<()>;
}

/// Derive a billing-platform plan code from a package name
/// ("100Mbps Fibre" → "100mbps-fibre").
pub fn plan_code_for_package(package_name: &str) -> String {
    let mut code = String::with_capacity(package_name.len());
    let mut last_dash = true;
    for ch in package_name.chars() {
        if ch.is_ascii_alphanumeric() {
            code.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            code.push('-');
            last_dash = true;
        }
    }
    while code.ends_with('-') {
        code.pop();
    }
    code
}
