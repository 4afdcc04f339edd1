//! Unified edge type across heterogeneous sources.

use serde::{Deserialize, Serialize};

/// Closed set of edge relationships, unified across every source this
/// graph composes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeKind {
    Imports,
    References,
    Implements,
    Extends,
    Evidence,
    Harmony,
    Contradiction,
    Dependency,
    Gotcha,
    Eureka,
    Taste,
    Friction,
    Decision,
}

impl EdgeKind {
    /// Map a freeform lowercase `kind` string (as recorded on a
    /// `DiscoveredEdge`) to its closed variant, defaulting to `References`
    /// for anything unrecognized.
    pub fn from_discovered(kind: &str) -> Self {
        match kind {
            "imports" => EdgeKind::Imports,
            "implements" => EdgeKind::Implements,
            "extends" => EdgeKind::Extends,
            _ => EdgeKind::References,
        }
    }

    /// Map a session tag name (as used on a witnessed mark) to its kind.
    pub fn from_session_tag(tag: &str) -> Option<Self> {
        match tag {
            "gotcha" => Some(EdgeKind::Gotcha),
            "eureka" => Some(EdgeKind::Eureka),
            "taste" => Some(EdgeKind::Taste),
            "friction" => Some(EdgeKind::Friction),
            "decision" => Some(EdgeKind::Decision),
            _ => None,
        }
    }
}

/// Which adapter produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Sovereign,
    Witness,
    SpecLedger,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Sovereign => "sovereign",
            Origin::Witness => "witness",
            Origin::SpecLedger => "spec_ledger",
        }
    }
}

/// A uniform edge, regardless of which adapter produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperEdge {
    pub kind: EdgeKind,
    pub source_path: String,
    pub target_path: String,
    pub origin: Origin,
    pub confidence: f32,
    pub context: Option<String>,
    pub line_number: Option<u32>,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub mark_id: Option<String>,
}

/// Two edges are equal iff their non-optional fields match — `kind`,
/// `source_path`, `target_path`, `origin`, `confidence`. The provenance
/// fields (`context`, `line_number`, `timestamp`, `mark_id`) don't
/// participate: the same logical edge witnessed twice with different
/// provenance is still one edge for dedup purposes.
impl PartialEq for HyperEdge {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.source_path == other.source_path
            && self.target_path == other.target_path
            && self.origin == other.origin
            && self.confidence == other.confidence
    }
}

impl HyperEdge {
    pub fn new(
        kind: EdgeKind,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
        origin: Origin,
        confidence: f32,
    ) -> Self {
        Self {
            kind,
            source_path: source_path.into(),
            target_path: target_path.into(),
            origin,
            confidence,
            context: None,
            line_number: None,
            timestamp: None,
            mark_id: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_line_number(mut self, line_number: u32) -> Self {
        self.line_number = Some(line_number);
        self
    }

    pub fn with_mark_id(mut self, mark_id: impl Into<String>) -> Self {
        self.mark_id = Some(mark_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_discovered_kind_defaults_to_references() {
        assert_eq!(EdgeKind::from_discovered("something_new"), EdgeKind::References);
        assert_eq!(EdgeKind::from_discovered("imports"), EdgeKind::Imports);
    }

    #[test]
    fn non_session_tag_yields_no_kind() {
        assert_eq!(EdgeKind::from_session_tag("not-a-session-tag"), None);
        assert_eq!(EdgeKind::from_session_tag("eureka"), Some(EdgeKind::Eureka));
    }
}
