//! Order lifecycle state machine.
//!
//! # Design
//!
//! A fixed adjacency table ([`allowed_next`]) is the single source of truth
//! for legal transitions. Every requested transition is checked against it;
//! an absent edge is rejected with a [`TransitionError`] carrying the exact
//! allowed set for the caller's current status, so admin surfaces can render
//! the legal options without a second lookup.
//!
//! Preconditions are enforced *before* any write: cancellation needs a
//! reason, scheduling needs a date, and `Active` is gated on an approved
//! regulatory submission (or an explicit administrative bypass).
//!
//! # State diagram (simplified)
//!
//! ```text
//! Pending ─► PaymentPending ─► PaymentRegistered ─► InstallationScheduled
//!                                                         │
//!                    InstallationInProgress ◄─────────────┘
//!                            │
//!                    InstallationCompleted ─► PendingActivation ─► Active
//!                                                   ▲    │          │ ▲
//!                                        Failed ────┘    └► Failed  ▼ │
//!                                                              Suspended
//!
//! Cancelled is reachable from every non-cancelled state and is terminal.
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// All states an order can occupy. Orders are never deleted; terminal states
/// are soft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PaymentPending,
    PaymentRegistered,
    InstallationScheduled,
    InstallationInProgress,
    InstallationCompleted,
    /// Installation done, waiting on the regulatory approval callback.
    PendingActivation,
    Active,
    Suspended,
    /// Parked for human review (payment failure, regulatory rejection).
    /// Not terminal: an admin can re-queue to PendingActivation.
    Failed,
    /// Terminal.
    Cancelled,
}

/// Every status, in a stable order. Used to derive the rejected set as the
/// complement of [`allowed_next`].
pub const ALL_STATUSES: [OrderStatus; 11] = [
    OrderStatus::Pending,
    OrderStatus::PaymentPending,
    OrderStatus::PaymentRegistered,
    OrderStatus::InstallationScheduled,
    OrderStatus::InstallationInProgress,
    OrderStatus::InstallationCompleted,
    OrderStatus::PendingActivation,
    OrderStatus::Active,
    OrderStatus::Suspended,
    OrderStatus::Failed,
    OrderStatus::Cancelled,
];

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::PaymentRegistered => "payment_registered",
            OrderStatus::InstallationScheduled => "installation_scheduled",
            OrderStatus::InstallationInProgress => "installation_in_progress",
            OrderStatus::InstallationCompleted => "installation_completed",
            OrderStatus::PendingActivation => "pending_activation",
            OrderStatus::Active => "active",
            OrderStatus::Suspended => "suspended",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ALL_STATUSES.iter().copied().find(|st| st.as_str() == s)
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }
}

/// The adjacency table. This match is the authoritative definition of the
/// lifecycle; nothing else in the system may encode an edge.
pub fn allowed_next(status: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match status {
        Pending => &[PaymentPending, Cancelled],
        PaymentPending => &[PaymentRegistered, Failed, Cancelled],
        PaymentRegistered => &[InstallationScheduled, Failed, Cancelled],
        InstallationScheduled => &[InstallationInProgress, Failed, Cancelled],
        InstallationInProgress => &[InstallationCompleted, Failed, Cancelled],
        InstallationCompleted => &[PendingActivation, Failed, Cancelled],
        PendingActivation => &[Active, Failed, Cancelled],
        Active => &[Suspended, Cancelled],
        Suspended => &[Active, Cancelled],
        Failed => &[PendingActivation, Cancelled],
        Cancelled => &[],
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Why a requested transition was refused. Refusals happen before any write,
/// so the order row is untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The edge is not in the adjacency table. Carries the allowed set so
    /// callers can surface the legal options.
    Illegal {
        from: OrderStatus,
        to: OrderStatus,
        allowed: Vec<OrderStatus>,
    },
    /// Cancellation requires a non-empty reason.
    MissingCancellationReason,
    /// Entering InstallationScheduled requires a scheduled date.
    MissingScheduledDate,
    /// Entering Active requires an approved regulatory submission or an
    /// explicit administrative bypass.
    NotRegulatoryApproved,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::Illegal { from, to, allowed } => {
                let allowed: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
                write!(
                    f,
                    "illegal order transition: {} -> {}; allowed next statuses: [{}]",
                    from.as_str(),
                    to.as_str(),
                    allowed.join(", ")
                )
            }
            TransitionError::MissingCancellationReason => {
                write!(f, "cancellation requires a non-empty reason")
            }
            TransitionError::MissingScheduledDate => {
                write!(f, "installation_scheduled requires a scheduled date")
            }
            TransitionError::NotRegulatoryApproved => {
                write!(
                    f,
                    "order may not activate without an approved regulatory submission"
                )
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Adjacency check only. Precondition checks live in [`plan_transition`].
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    if allowed_next(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal {
            from,
            to,
            allowed: allowed_next(from).to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Transition planning
// ---------------------------------------------------------------------------

/// Everything a transition needs beyond the target status. Built by the
/// caller (admin handler, webhook processor, activation service).
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub reason: Option<String>,
    pub changed_by: Option<String>,
    pub automated: bool,
    pub customer_notified: bool,
    pub scheduled_date: Option<NaiveDate>,
    /// True when the order's regulatory submission is approved.
    pub regulatory_approved: bool,
    /// Administrative override of the regulatory gate. Always journaled.
    pub admin_bypass: bool,
}

/// Immutable audit row appended for every applied transition. Append-only;
/// rows are never edited after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: Uuid,
    pub order_id: Uuid,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub reason: Option<String>,
    pub changed_by: Option<String>,
    pub automated: bool,
    pub customer_notified: bool,
    pub changed_at: DateTime<Utc>,
}

/// Validate a transition (adjacency + preconditions) and produce the audit
/// row that must be appended alongside the status write.
///
/// This is pure planning: the caller owns the conditional (compare-and-swap)
/// write keyed on `from`, which is the concurrency guard for racing callers.
pub fn plan_transition(
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    ctx: &TransitionContext,
    now: DateTime<Utc>,
) -> Result<StatusChange, TransitionError> {
    check_transition(from, to)?;

    match to {
        OrderStatus::Cancelled => {
            if ctx.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
                return Err(TransitionError::MissingCancellationReason);
            }
        }
        OrderStatus::InstallationScheduled => {
            if ctx.scheduled_date.is_none() {
                return Err(TransitionError::MissingScheduledDate);
            }
        }
        OrderStatus::Active => {
            if !ctx.regulatory_approved && !ctx.admin_bypass {
                return Err(TransitionError::NotRegulatoryApproved);
            }
        }
        _ => {}
    }

    Ok(StatusChange {
        id: Uuid::new_v4(),
        order_id,
        old_status: from,
        new_status: to,
        reason: ctx.reason.clone(),
        changed_by: ctx.changed_by.clone(),
        automated: ctx.automated,
        customer_notified: ctx.customer_notified,
        changed_at: now,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
