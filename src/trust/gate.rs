//! Trust gate: decides whether a proposed action is permitted, denied,
//! put to a human for confirmation, or merely logged.
//!
//! State transitions are serialized behind a `RwLock`; reads (decision
//! previews, metric snapshots) take the read side and don't contend with
//! each other, only with the rare write during a confirmed escalation or
//! a decision's metric update.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::mark::{Mark, MarkLedger, Phase, Response, Stimulus, Umwelt};

use super::types::{EscalationReport, GateDecision, PendingSuggestion, RateLimitConfig, TrustLevel, TrustState};

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("denied: {0}")]
    Denied(String),
    #[error("rate limit exceeded for the current window")]
    Busy,
    #[error("confirmation required: {0}")]
    ConfirmRequired(String),
    #[error("no pending suggestion with id {0}")]
    UnknownSuggestion(String),
}

struct ForbiddenRule {
    name: &'static str,
    patterns: &'static [&'static str],
}

/// Hardcoded, never permitted regardless of level. Each rule matches if
/// any of its patterns appears (case-insensitively) in the action string.
const FORBIDDEN_RULES: &[ForbiddenRule] = &[
    ForbiddenRule { name: "destructive version-control rewrite of a protected branch", patterns: &["push --force", "push -f", "push origin main --force"] },
    ForbiddenRule { name: "unrestricted filesystem destruction at a root-like path", patterns: &["rm -rf /", "rm -rf ~", "rm -rf *"] },
    ForbiddenRule { name: "database-wide deletion", patterns: &["drop database", "truncate table"] },
    ForbiddenRule { name: "production cluster deletion", patterns: &["delete deployment prod", "delete namespace prod", "delete cluster prod"] },
    ForbiddenRule { name: "secret or credential exfiltration", patterns: &["cat ~/.ssh", "cat .env", "secretsmanager get-secret", "exfiltrate"] },
    ForbiddenRule { name: "financial transaction", patterns: &["send payment", "wire transfer", "charge card"] },
    ForbiddenRule { name: "external artifact publication", patterns: &["npm publish", "cargo publish", "docker push"] },
];

/// L3 actions matching any of these are still permitted but LOGged with
/// heightened detail rather than silently ALLOWed.
const SENSITIVE_PATTERNS: &[&str] = &["deploy", "kubectl apply", "terraform apply"];

const READ_VERBS: &[&str] = &["read", "get", "list", "view", "query", "search", "show", "cat ", "ls "];

fn matches_forbidden(action: &str) -> Option<&'static str> {
    let lower = action.to_lowercase();
    FORBIDDEN_RULES.iter().find(|rule| rule.patterns.iter().any(|p| lower.contains(p))).map(|rule| rule.name)
}

fn is_read_action(action: &str) -> bool {
    let lower = action.to_lowercase();
    READ_VERBS.iter().any(|v| lower.starts_with(v))
}

fn is_sensitive(action: &str) -> bool {
    let lower = action.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

struct RateWindow {
    started_at: DateTime<Utc>,
    count: u32,
}

pub struct TrustGate {
    ledger: std::sync::Arc<MarkLedger>,
    state: RwLock<TrustState>,
    rate_limit: RateLimitConfig,
    window: RwLock<RateWindow>,
    pending: DashMap<String, PendingSuggestion>,
    /// Path prefix under which L1 writes are permitted.
    bounded_prefix: String,
}

impl TrustGate {
    pub fn new(ledger: std::sync::Arc<MarkLedger>, rate_limit: RateLimitConfig, bounded_prefix: impl Into<String>) -> Self {
        Self {
            ledger,
            state: RwLock::new(TrustState::default()),
            rate_limit,
            window: RwLock::new(RateWindow { started_at: Utc::now(), count: 0 }),
            pending: DashMap::new(),
            bounded_prefix: bounded_prefix.into(),
        }
    }

    pub fn state(&self) -> TrustState {
        self.state.read().unwrap().clone()
    }

    fn rate_limited(&self) -> bool {
        let mut window = self.window.write().unwrap();
        let now = Utc::now();
        if now - window.started_at > Duration::hours(1) {
            window.started_at = now;
            window.count = 0;
        }
        if window.count >= self.rate_limit.actions_per_hour {
            return true;
        }
        window.count += 1;
        false
    }

    /// Decide what happens to `action` at the gate's current level. Every
    /// decision — ALLOW, DENY, CONFIRM, LOG — appends an audit mark
    /// before returning, even though the action itself may never execute.
    pub fn decide(&self, action: &str, umwelt: Umwelt) -> Result<GateDecision, TrustError> {
        let decision = self.decide_inner(action);
        self.record(action, &decision, umwelt);
        match &decision {
            GateDecision::Deny { reason } if reason == "rate limit" => Err(TrustError::Busy),
            GateDecision::Deny { reason } => Err(TrustError::Denied(reason.clone())),
            GateDecision::Confirm { suggestion_id } => Err(TrustError::ConfirmRequired(suggestion_id.clone())),
            GateDecision::Allow | GateDecision::Log { .. } => Ok(decision),
        }
    }

    fn decide_inner(&self, action: &str) -> GateDecision {
        if let Some(rule) = matches_forbidden(action) {
            return GateDecision::Deny { reason: rule.to_string() };
        }

        if self.rate_limited() {
            return GateDecision::Deny { reason: "rate limit".to_string() };
        }

        let level = self.state.read().unwrap().level;
        match level {
            TrustLevel::L0ReadOnly => {
                if is_read_action(action) {
                    GateDecision::Allow
                } else {
                    GateDecision::Deny { reason: "level L0 permits read-only actions".to_string() }
                }
            }
            TrustLevel::L1Bounded => {
                if is_read_action(action) || action.contains(&self.bounded_prefix) {
                    GateDecision::Allow
                } else {
                    GateDecision::Deny { reason: format!("level L1 permits writes only under '{}'", self.bounded_prefix) }
                }
            }
            TrustLevel::L2Suggestion => {
                let suggestion = PendingSuggestion::new(action, Duration::hours(1));
                let id = suggestion.id.clone();
                self.pending.insert(id.clone(), suggestion);
                GateDecision::Confirm { suggestion_id: id }
            }
            TrustLevel::L3Autonomous => {
                if is_sensitive(action) {
                    GateDecision::Log { detail: format!("sensitive action at L3: {action}") }
                } else {
                    GateDecision::Allow
                }
            }
        }
    }

    fn record(&self, action: &str, decision: &GateDecision, umwelt: Umwelt) {
        {
            let mut state = self.state.write().unwrap();
            match decision {
                GateDecision::Allow | GateDecision::Log { .. } => {
                    state.metrics.operations += 1;
                    state.metrics.distinct_operation_kinds.insert(action.to_string());
                }
                GateDecision::Deny { reason } if reason != "rate limit" => {
                    state.metrics.operations += 1;
                    state.metrics.failures += 1;
                }
                _ => {}
            }
        }

        let mark = Mark::new(
            Phase::Act,
            Stimulus::new("GATE_DECISION", json!({ "action": action })),
            Response::new(format!("GATE_{}", decision.label()), json!({ "decision": decision })),
            umwelt,
        )
        .with_tags(["trust:gate".to_string()]);

        match self.ledger.append(mark) {
            Ok(id) => info!(mark_id = %id, decision = decision.label(), action, "trust gate decision recorded"),
            Err(e) => tracing::warn!(error = %e, "failed to record trust gate decision"),
        }
    }

    /// A human accepting a pending L2 suggestion.
    pub fn confirm(&self, suggestion_id: &str) -> Result<(), TrustError> {
        let (_, suggestion) = self
            .pending
            .remove(suggestion_id)
            .ok_or_else(|| TrustError::UnknownSuggestion(suggestion_id.to_string()))?;
        let mut state = self.state.write().unwrap();
        if suggestion.is_expired(Utc::now()) {
            // Expired suggestions count as neutral, not accepted.
            return Ok(());
        }
        state.metrics.suggestions += 1;
        state.metrics.acceptances += 1;
        state.metrics.distinct_suggestion_kinds.insert(suggestion.action.clone());
        Ok(())
    }

    /// A human rejecting a pending L2 suggestion.
    pub fn reject(&self, suggestion_id: &str) -> Result<(), TrustError> {
        let (_, _suggestion) = self
            .pending
            .remove(suggestion_id)
            .ok_or_else(|| TrustError::UnknownSuggestion(suggestion_id.to_string()))?;
        let mut state = self.state.write().unwrap();
        state.metrics.suggestions += 1;
        Ok(())
    }

    pub fn record_observation(&self, false_positive: bool) {
        let mut state = self.state.write().unwrap();
        state.metrics.observations += 1;
        if false_positive {
            state.metrics.false_positives += 1;
        }
    }

    /// Whether the gate's current level is eligible to escalate, per the
    /// fixed thresholds. Never applies automatically — a proposal only.
    pub fn check_escalation(&self) -> EscalationReport {
        let state = self.state.read().unwrap();
        let elapsed = Utc::now() - state.metrics.since;
        match state.level {
            TrustLevel::L0ReadOnly => {
                let eligible = state.metrics.observations >= 100 && elapsed >= Duration::hours(24) && state.metrics.observation_false_positive_rate() < 0.01;
                EscalationReport {
                    eligible,
                    next_level: eligible.then_some(TrustLevel::L1Bounded),
                    reason: if eligible {
                        "100+ observations over 24h+ with false-positive rate under 1%".to_string()
                    } else {
                        "insufficient observation history or false-positive rate".to_string()
                    },
                }
            }
            TrustLevel::L1Bounded => {
                let eligible = state.metrics.operations >= 100
                    && state.metrics.operation_failure_rate() < 0.05
                    && state.metrics.distinct_operation_kinds.len() >= 3;
                EscalationReport {
                    eligible,
                    next_level: eligible.then_some(TrustLevel::L2Suggestion),
                    reason: if eligible {
                        "100+ bounded operations, failure rate under 5%, 3+ distinct kinds".to_string()
                    } else {
                        "insufficient bounded-operation history".to_string()
                    },
                }
            }
            TrustLevel::L2Suggestion => {
                let eligible = state.metrics.suggestions >= 50
                    && state.metrics.acceptance_rate() > 0.90
                    && elapsed >= Duration::days(7)
                    && state.metrics.distinct_suggestion_kinds.len() >= 5;
                EscalationReport {
                    eligible,
                    next_level: eligible.then_some(TrustLevel::L3Autonomous),
                    reason: if eligible {
                        "50+ confirmed suggestions, acceptance rate over 90%, 7+ days at L2, 5+ distinct kinds".to_string()
                    } else {
                        "insufficient suggestion history at this level".to_string()
                    },
                }
            }
            TrustLevel::L3Autonomous => EscalationReport { eligible: false, next_level: None, reason: "already at the highest level".to_string() },
        }
    }

    /// Apply a confirmed escalation, resetting the metrics window.
    pub fn apply_escalation(&self, to: TrustLevel) {
        let mut state = self.state.write().unwrap();
        state.level = to;
        state.metrics = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn gate() -> TrustGate {
        TrustGate::new(Arc::new(MarkLedger::new()), RateLimitConfig { actions_per_hour: 100 }, "sandbox/".to_string())
    }

    fn umwelt() -> Umwelt {
        Umwelt::new("test")
    }

    #[test]
    fn forbidden_action_is_denied_at_every_level() {
        for level in [TrustLevel::L0ReadOnly, TrustLevel::L1Bounded, TrustLevel::L2Suggestion, TrustLevel::L3Autonomous] {
            let g = gate();
            g.apply_escalation(level);
            let result = g.decide("kubectl delete deployment prod", umwelt());
            assert!(matches!(result, Err(TrustError::Denied(_))), "level {level:?} should deny");
        }
    }

    #[test]
    fn l0_denies_writes() {
        let g = gate();
        let result = g.decide("write sandbox/scratch.txt", umwelt());
        assert!(matches!(result, Err(TrustError::Denied(_))));
    }

    #[test]
    fn l0_allows_reads() {
        let g = gate();
        let result = g.decide("read sandbox/scratch.txt", umwelt());
        assert!(matches!(result, Ok(GateDecision::Allow)));
    }

    #[test]
    fn l1_allows_writes_under_bounded_prefix() {
        let g = gate();
        g.apply_escalation(TrustLevel::L1Bounded);
        let result = g.decide("write sandbox/scratch.txt", umwelt());
        assert!(matches!(result, Ok(GateDecision::Allow)));
        let denied = g.decide("write /etc/passwd", umwelt());
        assert!(matches!(denied, Err(TrustError::Denied(_))));
    }

    #[test]
    fn l2_converts_every_proposal_to_confirm() {
        let g = gate();
        g.apply_escalation(TrustLevel::L2Suggestion);
        let result = g.decide("write anywhere.txt", umwelt());
        assert!(matches!(result, Err(TrustError::ConfirmRequired(_))));
    }

    #[test]
    fn l3_logs_sensitive_actions_instead_of_silently_allowing() {
        let g = gate();
        g.apply_escalation(TrustLevel::L3Autonomous);
        let result = g.decide("deploy service x", umwelt());
        assert!(matches!(result, Ok(GateDecision::Log { .. })));
    }

    #[test]
    fn confirming_a_suggestion_counts_toward_acceptance_metrics() {
        let g = gate();
        g.apply_escalation(TrustLevel::L2Suggestion);
        let decision = g.decide("write anywhere.txt", umwelt()).unwrap_err();
        let TrustError::ConfirmRequired(id) = decision else { panic!() };
        g.confirm(&id).unwrap();
        assert_eq!(g.state().metrics.acceptances, 1);
    }

    #[test]
    fn rate_limit_denies_after_the_configured_count() {
        let g = TrustGate::new(Arc::new(MarkLedger::new()), RateLimitConfig { actions_per_hour: 2 }, "sandbox/".to_string());
        assert!(g.decide("read a", umwelt()).is_ok());
        assert!(g.decide("read b", umwelt()).is_ok());
        let result = g.decide("read c", umwelt());
        assert!(matches!(result, Err(TrustError::Busy)));
    }

    #[test]
    fn escalation_is_ineligible_with_no_history() {
        let g = gate();
        let report = g.check_escalation();
        assert!(!report.eligible);
    }
}
