//! ff-pipeline
//!
//! The compliance-gated activation pipeline: regulatory submission, webhook
//! processing, and activation/provisioning, all running against injected
//! store and adapter traits. This crate owns the error taxonomy and the
//! idempotency/ordering rules; concrete persistence and transport live in
//! `ff-sandbox`, `ff-db`, and `ff-connect`.

mod activation;
mod adapters;
mod billing;
mod credentials;
mod error;
mod store;
mod submission;
mod webhook;

pub use activation::{ActivationOutcome, ActivationService};
pub use adapters::{
    plan_code_for_package, AccountCreateOutcome, BillingPlatform, IdentityProvider, Notifier,
    RegistrationRequest, RegistrationResponse, RegulatorClient, ServiceLine, SubscriberDetails,
    SubscriptionRequest, VerificationMetadata,
};
pub use billing::{prorata_for_activation, ProRata, BILLING_CYCLE_DAYS};
pub use credentials::{generate_account_number, generate_temp_credential};
pub use error::{PipelineError, PipelineResult};
pub use store::Store;
pub use submission::SubmissionService;
pub use webhook::{WebhookOutcome, WebhookProcessor};
