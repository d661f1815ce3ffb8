//! Shared domain and wire types for the FibreFlow activation core.
//!
//! Everything here is a plain serde-serializable value type. Behavior lives
//! in the crates that own each flow (`ff-risk`, `ff-orders`, `ff-pipeline`);
//! this crate only fixes the shapes that cross crate boundaries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity verification (KYC) extract
// ---------------------------------------------------------------------------

/// Physical address as extracted from a proof-of-address document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub suburb: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
}

/// Verdict of the document-authenticity check on the identity document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentAuthenticity {
    Valid,
    Suspicious,
    Invalid,
}

/// Proof-of-address sub-check result. `verified == false` means the document
/// was present but the verifier could not confirm it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfAddress {
    pub verified: bool,
    pub document_date: Option<NaiveDate>,
    pub address: Address,
}

/// Company-registration sub-check for business accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistration {
    pub registration_number: String,
    pub company_name: String,
    pub verified: bool,
    /// Directors named on the registration. A registration with no directors
    /// cannot be filed with the regulator.
    pub directors: Vec<String>,
}

/// Data extracted by the identity verifier from one verification session.
///
/// Produced once per session and immutable thereafter; the KYC session read
/// model owns it. All downstream scoring and regulatory filing works from
/// this extract alone — zero manual re-entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedIdentityData {
    /// National identity number (13 digits for RSA IDs).
    pub id_number: String,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub proof_of_address: Option<ProofOfAddress>,
    /// Confidence that the capture is of a live person, in `[0, 1]`.
    /// `None` means the check did not run and is treated as failing.
    pub liveness_score: Option<f64>,
    pub document_authenticity: DocumentAuthenticity,
    /// Anti-money-laundering screening hits (descriptive labels).
    pub aml_flags: Vec<String>,
    pub sanctions_match: bool,
    pub pep_match: bool,
    pub verification_timestamp: DateTime<Utc>,
    pub verification_method: String,
    /// Present only for business accounts.
    pub company: Option<CompanyRegistration>,
}

impl ExtractedIdentityData {
    /// True when this extract belongs to a business (company) account.
    pub fn is_business(&self) -> bool {
        self.company.is_some()
    }
}

// ---------------------------------------------------------------------------
// KYC session read model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycVerificationResult {
    Approved,
    Declined,
    PendingReview,
}

impl KycVerificationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycVerificationResult::Approved => "approved",
            KycVerificationResult::Declined => "declined",
            KycVerificationResult::PendingReview => "pending_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(KycVerificationResult::Approved),
            "declined" => Some(KycVerificationResult::Declined),
            "pending_review" => Some(KycVerificationResult::PendingReview),
            _ => None,
        }
    }
}

/// Read model of a completed identity-verification session, keyed by session
/// id. This is the inbound interface from the verification subsystem; the
/// pipeline never talks to the verifier directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycSession {
    pub id: Uuid,
    pub verification_result: Option<KycVerificationResult>,
    /// Tier as recorded at verification time ("low" / "medium" / "high").
    pub risk_tier: Option<String>,
    pub extracted_data: ExtractedIdentityData,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// The signed sales contract an order bills against. Without one, an order
/// can never activate — there is nothing to bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    pub contract_number: String,
    /// Recurring amount in cents; seeds the billing cycle at activation.
    pub monthly_amount_cents: i64,
    pub signed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Regulatory submission ledger
// ---------------------------------------------------------------------------

/// Lifecycle of a regulatory filing. Strict forward progression:
/// `Submitted → {Approved | Rejected}`, never reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(SubmissionStatus::Submitted),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Approved | SubmissionStatus::Rejected)
    }
}

/// One regulatory subscriber registration, as persisted in the ledger.
///
/// A row exists only if the source extract passed completeness validation
/// and the regulator accepted the filing — there is no "draft" state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatorySubmission {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kyc_session_id: Uuid,
    /// Device identifiers covered by the filing (SIM ICCIDs, 19–20 digits).
    pub device_identifiers: Vec<String>,
    pub regulator_tracking_id: String,
    pub status: SubmissionStatus,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned by the submission service on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub submission_id: Uuid,
    pub regulator_tracking_id: String,
}

// ---------------------------------------------------------------------------
// Regulator webhook events
// ---------------------------------------------------------------------------

/// Callback events delivered by the regulator. Strictly typed at the
/// boundary: an unknown `event` tag fails deserialization and is rejected,
/// never silently processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegulatorEvent {
    Approved {
        submission_id: Uuid,
        order_id: Uuid,
        regulator_tracking_id: String,
    },
    Rejected {
        submission_id: Uuid,
        order_id: Uuid,
        regulator_tracking_id: String,
        rejection_reason: String,
    },
}

impl RegulatorEvent {
    pub fn submission_id(&self) -> Uuid {
        match self {
            RegulatorEvent::Approved { submission_id, .. }
            | RegulatorEvent::Rejected { submission_id, .. } => *submission_id,
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            RegulatorEvent::Approved { order_id, .. }
            | RegulatorEvent::Rejected { order_id, .. } => *order_id,
        }
    }

    /// Stable event kind label used for inbox dedup keys and journaling.
    pub fn kind(&self) -> &'static str {
        match self {
            RegulatorEvent::Approved { .. } => "approved",
            RegulatorEvent::Rejected { .. } => "rejected",
        }
    }
}

// ---------------------------------------------------------------------------
// Provisioning records
// ---------------------------------------------------------------------------

/// Recurring-charge record created exactly once per order at activation.
/// All amounts are integer cents; floats never touch financial fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCycle {
    pub order_id: Uuid,
    pub monthly_amount_cents: i64,
    pub prorata_amount_cents: i64,
    pub prorata_days: i64,
    /// Day of month the recurring charge runs (1, 5, 15 or 25).
    pub billing_cycle_day: u32,
    pub next_billing_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Interval timestamps from order placement through activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTracking {
    pub order_id: Uuid,
    pub order_placed_at: DateTime<Utc>,
    pub installation_completed_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Customer login identity at the identity provider. At most one per
/// customer, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAccount {
    pub customer_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
}

/// Outbound notification trigger: `send(to, template, data)`. Delivery is a
/// fire-and-forget capability; this struct is what gets recorded/sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub template: String,
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Device identifier validation
// ---------------------------------------------------------------------------

/// True when `s` is a plausible SIM ICCID: 19 or 20 decimal digits.
pub fn is_valid_iccid(s: &str) -> bool {
    (19..=20).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iccid_accepts_19_and_20_digits() {
        assert!(is_valid_iccid("8927123456789012345"));
        assert!(is_valid_iccid("89271234567890123456"));
    }

    #[test]
    fn iccid_rejects_short_letters_and_long() {
        assert!(!is_valid_iccid("123456"));
        assert!(!is_valid_iccid("abcd123456789012345"));
        assert!(!is_valid_iccid("89271234567890123456789"));
    }

    #[test]
    fn unknown_webhook_event_kind_fails_to_parse() {
        let raw = r#"{"event":"superseded","submission_id":"7f0c8a24-3c0f-4b4a-9a43-0f8d3f6a1b2c","order_id":"7f0c8a24-3c0f-4b4a-9a43-0f8d3f6a1b2d","regulator_tracking_id":"RICA-2025-000001"}"#;
        let parsed: Result<RegulatorEvent, _> = serde_json::from_str(raw);
        assert!(parsed.is_err(), "unknown event kinds must be rejected at the boundary");
    }

    #[test]
    fn rejected_event_round_trips_with_reason() {
        let raw = r#"{"event":"rejected","submission_id":"7f0c8a24-3c0f-4b4a-9a43-0f8d3f6a1b2c","order_id":"7f0c8a24-3c0f-4b4a-9a43-0f8d3f6a1b2d","regulator_tracking_id":"RICA-2025-000001","rejection_reason":"id number does not match national registry"}"#;
        let parsed: RegulatorEvent = serde_json::from_str(raw).unwrap();
        match &parsed {
            RegulatorEvent::Rejected { rejection_reason, .. } => {
                assert_eq!(rejection_reason, "id number does not match national registry");
            }
            other => panic!("expected rejected event, got {other:?}"),
        }
        assert_eq!(parsed.kind(), "rejected");
    }
}
