//! Request and response types for all ff-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded by
//! Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub mode: String,
}

// ---------------------------------------------------------------------------
// /v1/orders/{id}/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub current_status: String,
    pub allowed_next_statuses: Vec<String>,
}

/// PATCH body. `notes` doubles as the transition reason and is required when
/// cancelling; `scheduled_date` is required when scheduling installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOrderStatusRequest {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub scheduled_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub scheduled_time_slot: Option<String>,
    /// Administrative bypass of the regulatory gate for `active`. Journaled.
    #[serde(default)]
    pub admin_bypass: bool,
    #[serde(default)]
    pub changed_by: Option<String>,
}

/// 409/422 body for refused transitions: always carries the allowed set so
/// the admin surface can render the legal options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRefusedResponse {
    pub error: String,
    pub current_status: String,
    pub allowed_next_statuses: Vec<String>,
}

// ---------------------------------------------------------------------------
// /v1/webhooks/regulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    /// "applied" | "duplicate" | "conflict" — all are success to the sender.
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// /v1/orders/{id}/activate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    /// "activated" | "already_active" | "not_ready"
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
