//! Deterministic fakes for every external system the pipeline talks to.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - Tracking and subscription ids are stable strings derived from inputs or
//!   an explicit counter; no randomness.
//! - Each fake can be told to fail its next call, to exercise the
//!   leaves-no-partial-row guarantees.
//! - Everything a fake does is recorded and inspectable from tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use ff_pipeline::{
    AccountCreateOutcome, BillingPlatform, IdentityProvider, Notifier, PipelineError,
    PipelineResult, RegistrationRequest, RegistrationResponse, RegulatorClient,
    SubscriptionRequest,
};
use ff_schemas::{CustomerAccount, Notification};

// ---------------------------------------------------------------------------
// Regulator
// ---------------------------------------------------------------------------

/// In-memory regulator. Accepts every filing and assigns sequential tracking
/// ids (`RICA-2025-000001`, ...).
#[derive(Default)]
pub struct SandboxRegulator {
    requests: Mutex<Vec<RegistrationRequest>>,
    fail_next: Mutex<Option<String>>,
}

impl SandboxRegulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `register_subscriber` call fail with `detail`.
    pub fn fail_next(&self, detail: impl Into<String>) {
        *self.fail_next.lock().unwrap_or_else(|e| e.into_inner()) = Some(detail.into());
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_request(&self) -> Option<RegistrationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl RegulatorClient for SandboxRegulator {
    fn register_subscriber(
        &self,
        request: &RegistrationRequest,
    ) -> PipelineResult<RegistrationResponse> {
        if let Some(detail) = self.fail_next.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(PipelineError::external("regulator", detail));
        }
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        requests.push(request.clone());
        Ok(RegistrationResponse {
            tracking_id: format!("RICA-2025-{:06}", requests.len()),
        })
    }
}

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

/// In-memory identity directory keyed by email. `create_account` converges
/// racing creators: the second creation of the same email observes
/// `AlreadyExists` with the first account, exactly like a unique-constraint
/// upsert.
#[derive(Default)]
pub struct SandboxIdentityProvider {
    accounts: Mutex<BTreeMap<String, CustomerAccount>>,
    create_calls: Mutex<usize>,
}

impl SandboxIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// How many times `create_account` was invoked (including converged
    /// duplicates).
    pub fn create_call_count(&self) -> usize {
        *self.create_calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl IdentityProvider for SandboxIdentityProvider {
    fn find_account(&self, email: &str) -> PipelineResult<Option<CustomerAccount>> {
        Ok(self
            .accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(email)
            .cloned())
    }

    fn create_account(
        &self,
        email: &str,
        full_name: &str,
        _temporary_credential: &str,
    ) -> PipelineResult<AccountCreateOutcome> {
        *self.create_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = accounts.get(email) {
            return Ok(AccountCreateOutcome::AlreadyExists(existing.clone()));
        }
        let account = CustomerAccount {
            customer_id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            created_at: Utc::now(),
        };
        accounts.insert(email.to_string(), account.clone());
        Ok(AccountCreateOutcome::Created(account))
    }
}

// ---------------------------------------------------------------------------
// Billing platform
// ---------------------------------------------------------------------------

/// In-memory billing platform. Subscription ids are derived from the
/// idempotency reference, so a retried creation returns the same id without
/// a second subscription.
#[derive(Default)]
pub struct SandboxBilling {
    subscriptions: Mutex<BTreeMap<String, SubscriptionRequest>>,
    fail_next: Mutex<Option<String>>,
}

impl SandboxBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, detail: impl Into<String>) {
        *self.fail_next.lock().unwrap_or_else(|e| e.into_inner()) = Some(detail.into());
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl BillingPlatform for SandboxBilling {
    fn create_subscription(&self, request: &SubscriptionRequest) -> PipelineResult<String> {
        if let Some(detail) = self.fail_next.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(PipelineError::external("billing", detail));
        }
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subs.entry(request.reference.clone())
            .or_insert_with(|| request.clone());
        Ok(format!("sandbox:sub:{}", request.reference))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_all: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail, to prove notification trouble never
    /// blocks the pipeline.
    pub fn fail_all(&self) {
        *self.fail_all.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count_template(&self, template: &str) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|n| n.template == template)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: &Notification) -> PipelineResult<()> {
        if *self.fail_all.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(PipelineError::external("notify", "delivery channel down"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
