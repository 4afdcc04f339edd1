//! Mark data model: the atomic, causally-linked unit of record.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a mark.
///
/// Serializes as a plain string, the same convention used by this
/// codebase's other id newtypes (transparent wrapper over a UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkId(String);

impl MarkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MarkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MarkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier for a walk (named work-stream).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalkId(String);

impl WalkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WalkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WalkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WalkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// N-Phase position in the SENSE/ACT/REFLECT cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Sense,
    Act,
    Reflect,
}

impl Phase {
    /// The next phase in the default SENSE→ACT→REFLECT→SENSE grammar
    /// Phase transitions must obey this grammar; `can_transition_to` is
    /// the enforcement point.
    pub fn next(self) -> Phase {
        match self {
            Phase::Sense => Phase::Act,
            Phase::Act => Phase::Reflect,
            Phase::Reflect => Phase::Sense,
        }
    }

    /// Whether `self -> to` is a legal transition under the default grammar.
    pub fn can_transition_to(self, to: Phase) -> bool {
        self.next() == to || self == to
    }
}

/// What provoked a mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    /// Short tag describing the kind of event, e.g. "INGEST", "RPC_CALL".
    pub kind: String,
    /// Structured payload describing the stimulus.
    #[serde(default)]
    pub payload: Value,
}

impl Stimulus {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// What happened in response to a stimulus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Short tag describing the action taken, e.g. "VERSION_STORED".
    pub action: String,
    /// Structured result payload.
    #[serde(default)]
    pub result: Value,
}

impl Response {
    pub fn new(action: impl Into<String>, result: Value) -> Self {
        Self {
            action: action.into(),
            result,
        }
    }
}

/// Reproducibility classification (supplemental, grounded on
/// `original_source` `n`-gent `Determinism`), recorded alongside `proof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Determinism {
    Deterministic,
    #[default]
    Probabilistic,
    Chaotic,
}

/// Evidence tiers, stratified from speculative to load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceLevel {
    PromptAncestor = -2,
    Trace = -1,
    Mark = 0,
    Test = 1,
    Proof = 2,
    Bet = 3,
}

/// Evidence reference grounding a mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub level: EvidenceLevel,
    /// Opaque reference to the underlying artifact (trace id, test name, ...).
    pub reference: String,
    #[serde(default)]
    pub determinism: Determinism,
    /// Token/ms bookkeeping (supplemental, grounded on `n`-gent `gas_consumed`/`duration_ms`).
    #[serde(default)]
    pub cost: Option<Cost>,
}

/// Resource bookkeeping for a mark's production (supplemental).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Cost {
    pub token_estimate: u64,
    pub duration_ms: u64,
}

/// Snapshot of observer identity/context at mark time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Umwelt {
    pub observer: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub extra: Value,
}

impl Umwelt {
    pub fn new(observer: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            location: None,
            extra: Value::Null,
        }
    }
}

/// The relation a `MarkLink` expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarkLinkRelation {
    Causes,
    Continues,
    Refutes,
    Supersedes,
    Evidences,
}

/// The source endpoint of a link: either a concrete mark, or an external
/// plan path the consumer must resolve out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkSource {
    Mark(MarkId),
    PlanPath(String),
}

/// A directed causal edge between marks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkLink {
    pub source: LinkSource,
    pub target: MarkId,
    pub relation: MarkLinkRelation,
}

impl MarkLink {
    pub fn new(source: MarkId, target: MarkId, relation: MarkLinkRelation) -> Self {
        Self {
            source: LinkSource::Mark(source),
            target,
            relation,
        }
    }

    pub fn from_plan(plan_path: impl Into<String>, target: MarkId, relation: MarkLinkRelation) -> Self {
        Self {
            source: LinkSource::PlanPath(plan_path.into()),
            target,
            relation,
        }
    }
}

/// An atomic, immutable record of one semantic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mark {
    pub id: MarkId,
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub stimulus: Stimulus,
    pub response: Response,
    #[serde(default)]
    pub proof: Option<Proof>,
    pub umwelt: Umwelt,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub links: Vec<MarkLink>,
    #[serde(default)]
    pub walk_id: Option<WalkId>,
}

impl Mark {
    /// Build a mark with a fresh id and the current time. Tags are
    /// normalized (lowercased, trimmed) per the ledger's append contract.
    pub fn new(
        phase: Phase,
        stimulus: Stimulus,
        response: Response,
        umwelt: Umwelt,
    ) -> Self {
        Self {
            id: MarkId::new(),
            timestamp: Utc::now(),
            phase,
            stimulus,
            response,
            proof: None,
            umwelt,
            tags: HashSet::new(),
            links: Vec::new(),
            walk_id: None,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = MarkLink>) -> Self {
        self.links = links.into_iter().collect();
        self
    }

    pub fn with_walk(mut self, walk_id: WalkId) -> Self {
        self.walk_id = Some(walk_id);
        self
    }

    pub fn with_proof(mut self, proof: Proof) -> Self {
        self.proof = Some(proof);
        self
    }

    /// Whether any tag matches `prefix` (conventional prefixes: `spec:`,
    /// `file:`, `evidence:`).
    pub fn has_tag_prefix(&self, prefix: &str) -> bool {
        self.tags.iter().any(|t| t.starts_with(prefix))
    }
}

fn normalize_tags(tags: impl IntoIterator<Item = impl Into<String>>) -> HashSet<String> {
    tags.into_iter()
        .map(|t| t.into().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
