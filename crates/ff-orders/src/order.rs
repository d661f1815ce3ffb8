use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::OrderStatus;

/// A subscriber order, created when a quote is paid/converted.
///
/// The `status` field is owned by the state machine: it may only move along
/// the adjacency table, through the store's conditional (compare-and-swap)
/// update. Everything else is ordinary mutable order data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    /// None until the customer account exists at the identity provider.
    pub customer_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    pub kyc_session_id: Option<Uuid>,

    pub customer_email: String,
    pub customer_name: String,
    pub package_name: String,
    /// Recurring amount from the signed contract, in cents.
    pub monthly_amount_cents: i64,
    pub installation_fee_cents: i64,

    pub status: OrderStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time_slot: Option<String>,

    /// Billing-platform subscription id, persisted back after activation.
    pub external_subscription_id: Option<String>,
    /// Subscriber account number assigned at activation.
    pub account_number: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh order in `Pending`, not yet linked to a customer account.
    pub fn new(
        order_number: impl Into<String>,
        customer_email: impl Into<String>,
        customer_name: impl Into<String>,
        package_name: impl Into<String>,
        monthly_amount_cents: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_number: order_number.into(),
            customer_id: None,
            contract_id: None,
            kyc_session_id: None,
            customer_email: customer_email.into(),
            customer_name: customer_name.into(),
            package_name: package_name.into(),
            monthly_amount_cents,
            installation_fee_cents: 0,
            status: OrderStatus::Pending,
            scheduled_date: None,
            scheduled_time_slot: None,
            external_subscription_id: None,
            account_number: None,
            created_at: now,
            updated_at: now,
        }
    }
}
