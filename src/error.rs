//! Top-level error taxonomy.
//!
//! Each subsystem owns its own `thiserror`-derived error; `CoreError`
//! composes them via `#[from]` into one enum consumed at the RPC boundary.

use thiserror::Error;

use crate::crystal::CrystalError;
use crate::edge::EdgeGraphError;
use crate::mark::MarkError;
use crate::sovereign::SovereignError;
use crate::trust::TrustError;

/// Errors surfaced across the core's public boundary.
///
/// `Corruption` is the only variant that is always surfaced without local
/// recovery; sandbox and LLM failures never reach this enum — they are
/// converted to result fields at their own boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Mark(#[from] MarkError),

    #[error(transparent)]
    Sovereign(#[from] SovereignError),

    #[error(transparent)]
    EdgeGraph(#[from] EdgeGraphError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Crystal(#[from] CrystalError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corruption detected for {0}")]
    Corruption(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("busy: mark append queue exceeded its watermark")]
    Busy,
}

/// Result alias for core-boundary operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The machine-readable error kind carried in RPC/CLI responses.
///
/// Distinct from `CoreError` itself: this is the wire-level discriminant a
/// caller switches on, independent of the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvariantViolation,
    Unstable,
    Denied,
    ConfirmRequired,
    Timeout,
    Busy,
    Corruption,
    ProviderUnavailable,
    NotFound,
}

impl CoreError {
    /// The taxonomy tag for this error, used by the rendering layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            CoreError::Mark(MarkError::InvariantViolation(_)) => ErrorKind::InvariantViolation,
            CoreError::Mark(MarkError::NotFound(_)) => ErrorKind::NotFound,
            CoreError::Sovereign(SovereignError::Corruption(..)) => ErrorKind::Corruption,
            CoreError::Sovereign(SovereignError::NotFound(_)) => ErrorKind::NotFound,
            CoreError::Sovereign(_) => ErrorKind::InvariantViolation,
            CoreError::EdgeGraph(_) => ErrorKind::InvariantViolation,
            CoreError::Trust(TrustError::Denied(_)) => ErrorKind::Denied,
            CoreError::Trust(TrustError::Busy) => ErrorKind::Busy,
            CoreError::Trust(TrustError::ConfirmRequired(_)) => ErrorKind::ConfirmRequired,
            CoreError::Trust(_) => ErrorKind::InvariantViolation,
            CoreError::Crystal(CrystalError::NotFound(_)) => ErrorKind::NotFound,
            CoreError::Crystal(_) => ErrorKind::InvariantViolation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Corruption(_) => ErrorKind::Corruption,
            CoreError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            CoreError::Busy => ErrorKind::Busy,
        }
    }
}
