//! ff-risk
//!
//! Risk scoring engine for identity-verification output. Pure functions
//! only — callers decide what to do with the tier (auto-approve, hold for a
//! compliance reviewer, decline).

mod engine;
mod types;

pub use engine::{aml_points, document_points, liveness_points, score};
pub use types::{
    RiskScoreBreakdown, RiskTier, AML_MAX_POINTS, DOCUMENT_MAX_POINTS, LIVENESS_MAX_POINTS,
    LOW_TIER_MIN, MEDIUM_TIER_MIN,
};
