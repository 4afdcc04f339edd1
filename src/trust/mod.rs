//! Trust gate: permits, denies, or routes proposed actions to a human,
//! tracking the metrics that justify raising autonomy over time.

mod gate;
mod types;

pub use gate::{TrustError, TrustGate};
pub use types::{EscalationReport, GateDecision, PendingSuggestion, RateLimitConfig, TrustLevel, TrustMetrics, TrustState};
