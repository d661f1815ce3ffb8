//! Pipeline error taxonomy.
//!
//! Four kinds, with fixed handling policy per kind:
//!
//! | kind         | retry    | surfaced as                                  |
//! |--------------|----------|----------------------------------------------|
//! | `Validation` | never    | synchronous error to the caller/admin UI     |
//! | `External`   | backoff  | retry signal; leaves no partial ledger row   |
//! | `Conflict`   | n/a      | idempotent no-op, logged, success to sender  |
//! | `FatalData`  | never    | escalated to a human queue                   |
//!
//! Customers never see these messages; customer-facing copy lives in
//! notification templates.

/// Typed pipeline error. Implements `std::error::Error` so it can propagate
/// through `Box<dyn Error>` chains without extra wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Bad or incomplete input (incomplete KYC data, illegal status
    /// transition request, missing field for a transition). Never retried.
    Validation(String),
    /// An external system call failed or timed out. Retryable with backoff;
    /// the operation has written nothing.
    External {
        service: &'static str,
        detail: String,
    },
    /// Concurrent transition or duplicate/out-of-order delivery. Resolved as
    /// an idempotent no-op by the caller.
    Conflict(String),
    /// Required data is missing entirely (no contract, no customer). Retry
    /// cannot fix this; a human has to.
    FatalData(String),
}

impl PipelineError {
    pub fn external(service: &'static str, detail: impl Into<String>) -> Self {
        PipelineError::External {
            service,
            detail: detail.into(),
        }
    }

    /// True only for errors a retry job is allowed to pick up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::External { .. })
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Validation(msg) => write!(f, "validation error: {msg}"),
            PipelineError::External { service, detail } => {
                write!(f, "external service '{service}' failed: {detail}")
            }
            PipelineError::Conflict(msg) => write!(f, "conflict: {msg}"),
            PipelineError::FatalData(msg) => write!(f, "fatal data error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

pub type PipelineResult<T> = Result<T, PipelineError>;
