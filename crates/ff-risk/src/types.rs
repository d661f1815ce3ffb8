use serde::{Deserialize, Serialize};

/// Maximum points each factor can contribute.
pub const LIVENESS_MAX_POINTS: u32 = 40;
pub const DOCUMENT_MAX_POINTS: u32 = 30;
pub const AML_MAX_POINTS: u32 = 30;

/// Tier thresholds on the 0..=100 total.
pub const LOW_TIER_MIN: u32 = 80;
pub const MEDIUM_TIER_MIN: u32 = 50;

/// Risk classification gating auto-approval vs. manual review vs. decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }

    /// Tier for a given total score.
    pub fn from_total(total: u32) -> Self {
        if total >= LOW_TIER_MIN {
            RiskTier::Low
        } else if total >= MEDIUM_TIER_MIN {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }
}

/// Full scoring result. A derived value: deterministically recomputable from
/// the identity extract, never an independent source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScoreBreakdown {
    pub liveness_points: u32,
    pub document_points: u32,
    pub aml_points: u32,
    pub total_score: u32,
    pub risk_tier: RiskTier,
    pub auto_approved: bool,
    /// Human-readable audit trail of how each factor scored. Never fed back
    /// into scoring.
    pub reasoning: Vec<String>,
}
