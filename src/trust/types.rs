//! Trust gate data model: strictly ordered levels, accumulated metrics,
//! gate decisions, and pending human confirmations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Autonomy level, strictly ordered: derived `Ord` gives
/// `TrustLevel::L0 < TrustLevel::L3` for free, which the gate and the
/// monotonicity property test both rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustLevel {
    L0ReadOnly,
    L1Bounded,
    L2Suggestion,
    L3Autonomous,
}

impl TrustLevel {
    pub fn next(self) -> Option<TrustLevel> {
        match self {
            TrustLevel::L0ReadOnly => Some(TrustLevel::L1Bounded),
            TrustLevel::L1Bounded => Some(TrustLevel::L2Suggestion),
            TrustLevel::L2Suggestion => Some(TrustLevel::L3Autonomous),
            TrustLevel::L3Autonomous => None,
        }
    }
}

/// Counters accumulated since the last level transition. Escalation
/// criteria are evaluated against this snapshot, then reset on
/// confirmed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustMetrics {
    pub observations: u32,
    pub operations: u32,
    pub suggestions: u32,
    pub acceptances: u32,
    pub failures: u32,
    pub false_positives: u32,
    #[serde(default)]
    pub distinct_operation_kinds: HashSet<String>,
    #[serde(default)]
    pub distinct_suggestion_kinds: HashSet<String>,
    /// Start of the window these counters accumulate over; reset on
    /// confirmed transition.
    pub since: DateTime<Utc>,
}

impl Default for TrustMetrics {
    fn default() -> Self {
        Self {
            observations: 0,
            operations: 0,
            suggestions: 0,
            acceptances: 0,
            failures: 0,
            false_positives: 0,
            distinct_operation_kinds: HashSet::new(),
            distinct_suggestion_kinds: HashSet::new(),
            since: Utc::now(),
        }
    }
}

impl TrustMetrics {
    fn success_rate(successes: u32, total: u32) -> f32 {
        if total == 0 {
            1.0
        } else {
            successes as f32 / total as f32
        }
    }

    pub fn observation_false_positive_rate(&self) -> f32 {
        if self.observations == 0 {
            0.0
        } else {
            self.false_positives as f32 / self.observations as f32
        }
    }

    pub fn operation_failure_rate(&self) -> f32 {
        1.0 - Self::success_rate(self.operations.saturating_sub(self.failures), self.operations)
    }

    pub fn acceptance_rate(&self) -> f32 {
        Self::success_rate(self.acceptances, self.suggestions)
    }
}

/// `(level, metrics_since_last_transition)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustState {
    pub level: TrustLevel,
    pub metrics: TrustMetrics,
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::L0ReadOnly
    }
}

/// The outcome of one gate decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "UPPERCASE")]
pub enum GateDecision {
    Allow,
    Deny { reason: String },
    Confirm { suggestion_id: String },
    Log { detail: String },
}

impl GateDecision {
    pub fn label(&self) -> &'static str {
        match self {
            GateDecision::Allow => "ALLOW",
            GateDecision::Deny { .. } => "DENY",
            GateDecision::Confirm { .. } => "CONFIRM",
            GateDecision::Log { .. } => "LOG",
        }
    }
}

/// An L2 proposal awaiting human confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSuggestion {
    pub id: String,
    pub action: String,
    pub proposed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingSuggestion {
    pub fn new(action: impl Into<String>, ttl: chrono::Duration) -> Self {
        let proposed_at = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            proposed_at,
            expires_at: proposed_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A proposed escalation, never auto-applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationReport {
    pub eligible: bool,
    pub next_level: Option<TrustLevel>,
    pub reason: String,
}

/// Bounded actions per hour per level; exceeding it denies with reason
/// "rate limit" for the remainder of the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub actions_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { actions_per_hour: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_strictly_ordered() {
        assert!(TrustLevel::L0ReadOnly < TrustLevel::L1Bounded);
        assert!(TrustLevel::L1Bounded < TrustLevel::L2Suggestion);
        assert!(TrustLevel::L2Suggestion < TrustLevel::L3Autonomous);
    }

    #[test]
    fn pending_suggestion_expires_after_its_ttl() {
        let suggestion = PendingSuggestion::new("deploy service", chrono::Duration::hours(1));
        assert!(!suggestion.is_expired(suggestion.proposed_at));
        assert!(suggestion.is_expired(suggestion.expires_at + chrono::Duration::seconds(1)));
    }
}
