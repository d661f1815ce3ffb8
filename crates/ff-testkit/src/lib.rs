//! ff-testkit
//!
//! Shared harness for cross-crate scenario tests. Wires a full in-process
//! world (memory store + sandbox externals) and provides seeding helpers so
//! each scenario reads as the flow it exercises, not as setup noise.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use ff_orders::{plan_transition, Order, OrderStatus, TransitionContext};
use ff_pipeline::{
    ActivationService, PipelineResult, Store, SubmissionService, WebhookOutcome, WebhookProcessor,
};
use ff_sandbox::{
    MemoryStore, RecordingNotifier, SandboxBilling, SandboxIdentityProvider, SandboxRegulator,
};
use ff_schemas::{
    Address, Contract, DocumentAuthenticity, ExtractedIdentityData, KycSession,
    KycVerificationResult, ProofOfAddress, RegulatorEvent,
};

pub const PROVIDER_NAME: &str = "FibreFlow Networks (Pty) Ltd";
pub const PROVIDER_LICENSE: &str = "ECNS/001/2024";
pub const TEST_ICCID: &str = "8927123456789012345";

/// A fixed instant so scenarios are reproducible.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 1, 10, 0, 0).unwrap()
}

/// A complete, clean identity extract (scores 100 / low tier).
pub fn clean_extract() -> ExtractedIdentityData {
    ExtractedIdentityData {
        id_number: "8001015009087".to_string(),
        full_name: "John Michael Doe".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1980, 1, 1),
        proof_of_address: Some(ProofOfAddress {
            verified: true,
            document_date: NaiveDate::from_ymd_opt(2025, 9, 15),
            address: Address {
                street: "123 Main Street".to_string(),
                suburb: "Gardens".to_string(),
                city: "Cape Town".to_string(),
                province: "Western Cape".to_string(),
                postal_code: "8001".to_string(),
                country: "South Africa".to_string(),
            },
        }),
        liveness_score: Some(0.95),
        document_authenticity: DocumentAuthenticity::Valid,
        aml_flags: vec![],
        sanctions_match: false,
        pep_match: false,
        verification_timestamp: t0(),
        verification_method: "biometric".to_string(),
        company: None,
    }
}

/// Everything a scenario needs, wired over in-memory parts.
pub struct World {
    pub store: MemoryStore,
    pub regulator: SandboxRegulator,
    pub identity: SandboxIdentityProvider,
    pub billing: SandboxBilling,
    pub notifier: RecordingNotifier,
}

/// Ids of a fully seeded order ready for the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct SeededOrder {
    pub order_id: Uuid,
    pub contract_id: Uuid,
    pub kyc_session_id: Uuid,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            regulator: SandboxRegulator::new(),
            identity: SandboxIdentityProvider::new(),
            billing: SandboxBilling::new(),
            notifier: RecordingNotifier::new(),
        }
    }

    pub fn submission_service(&self) -> SubmissionService<'_> {
        SubmissionService::new(&self.store, &self.regulator, PROVIDER_NAME, PROVIDER_LICENSE)
    }

    pub fn activation_service(&self) -> ActivationService<'_> {
        ActivationService::new(&self.store, &self.identity, &self.billing, &self.notifier, "ZAR")
    }

    /// Run one webhook event through a freshly wired processor.
    pub fn process_webhook(
        &self,
        event: &RegulatorEvent,
        now: DateTime<Utc>,
    ) -> PipelineResult<WebhookOutcome> {
        let activation = self.activation_service();
        let processor = WebhookProcessor::new(&self.store, &activation, &self.notifier);
        processor.process(event, now)
    }

    /// Seed a KYC session (completed, approved) owning `extract`.
    pub fn seed_kyc_session(&self, extract: ExtractedIdentityData) -> Uuid {
        self.seed_kyc_session_with_result(extract, Some(KycVerificationResult::Approved))
    }

    /// Seed a KYC session with an explicit verification result (e.g. a
    /// medium-tier case still waiting on the compliance reviewer).
    pub fn seed_kyc_session_with_result(
        &self,
        extract: ExtractedIdentityData,
        verification_result: Option<KycVerificationResult>,
    ) -> Uuid {
        let tier = ff_risk::score(&extract).risk_tier;
        let session = KycSession {
            id: Uuid::new_v4(),
            verification_result,
            risk_tier: Some(tier.as_str().to_string()),
            extracted_data: extract,
            completed_at: Some(t0()),
        };
        self.store.insert_kyc_session(&session).expect("seed session");
        session.id
    }

    /// Record the compliance reviewer's verdict on an existing session.
    pub fn set_session_result(&self, session_id: Uuid, result: KycVerificationResult) {
        let mut session = self
            .store
            .load_kyc_session(session_id)
            .expect("load session")
            .expect("session exists");
        session.verification_result = Some(result);
        self.store.insert_kyc_session(&session).expect("update session");
    }

    /// Seed a signed contract + order linked to `kyc_session_id`, then walk
    /// the order along `path` with sensible transition contexts.
    pub fn seed_order_at(
        &self,
        kyc_session_id: Uuid,
        path: &[OrderStatus],
    ) -> SeededOrder {
        let contract = Contract {
            id: Uuid::new_v4(),
            contract_number: "CT-2025-0001".to_string(),
            monthly_amount_cents: 69_900,
            signed_at: t0(),
        };
        self.store.insert_contract(&contract).expect("seed contract");

        let mut order = Order::new(
            "ORD-2025-0001",
            "john@example.com",
            "John Michael Doe",
            "100Mbps Fibre",
            contract.monthly_amount_cents,
            t0(),
        );
        order.contract_id = Some(contract.id);
        order.kyc_session_id = Some(kyc_session_id);
        self.store.insert_order(&order).expect("seed order");

        for target in path {
            self.advance(order.id, *target);
        }

        SeededOrder {
            order_id: order.id,
            contract_id: contract.id,
            kyc_session_id,
        }
    }

    /// Shorthand: order driven all the way to `PendingActivation`.
    pub fn seed_ready_order(&self, kyc_session_id: Uuid) -> SeededOrder {
        self.seed_order_at(
            kyc_session_id,
            &[
                OrderStatus::PaymentPending,
                OrderStatus::PaymentRegistered,
                OrderStatus::InstallationScheduled,
                OrderStatus::InstallationInProgress,
                OrderStatus::InstallationCompleted,
                OrderStatus::PendingActivation,
            ],
        )
    }

    /// Apply one legal transition with a context that satisfies the target's
    /// preconditions.
    pub fn advance(&self, order_id: Uuid, to: OrderStatus) {
        let order = self
            .store
            .load_order(order_id)
            .expect("load order")
            .expect("order exists");
        let ctx = TransitionContext {
            reason: Some(format!("test setup -> {}", to.as_str())),
            automated: true,
            scheduled_date: NaiveDate::from_ymd_opt(2025, 11, 10),
            ..Default::default()
        };
        let change =
            plan_transition(order_id, order.status, to, &ctx, t0()).expect("legal setup step");
        self.store.apply_transition(&change).expect("apply setup step");
    }

    /// Count transitions into `to` recorded in the audit history.
    pub fn transitions_into(&self, order_id: Uuid, to: OrderStatus) -> usize {
        self.store
            .status_history(order_id)
            .expect("history")
            .iter()
            .filter(|c| c.new_status == to)
            .count()
    }
}

/// Build the approved event for a submission receipt.
pub fn approved_event(
    submission_id: Uuid,
    order_id: Uuid,
    tracking_id: &str,
) -> RegulatorEvent {
    RegulatorEvent::Approved {
        submission_id,
        order_id,
        regulator_tracking_id: tracking_id.to_string(),
    }
}

/// Build the rejected event for a submission receipt.
pub fn rejected_event(
    submission_id: Uuid,
    order_id: Uuid,
    tracking_id: &str,
    reason: &str,
) -> RegulatorEvent {
    RegulatorEvent::Rejected {
        submission_id,
        order_id,
        regulator_tracking_id: tracking_id.to_string(),
        rejection_reason: reason.to_string(),
    }
}
