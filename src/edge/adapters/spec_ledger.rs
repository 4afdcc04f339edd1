//! Spec-ledger adapter: turns an externally produced report of
//! cross-document harmonies, contradictions, and references into
//! `HyperEdge`s, origin `spec_ledger`.
//!
//! Unlike the other two adapters this one has no store to query live —
//! the report is handed to it whole, so `all_edges` is simply the
//! precomputed set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::super::source::EdgeSource;
use super::super::types::{EdgeKind, HyperEdge, Origin};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Harmony {
    pub spec_a: String,
    pub spec_b: String,
    pub relationship: String,
    pub strength: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub spec_a: String,
    pub spec_b: String,
    pub severity: f32,
    pub conflict_type: String,
}

/// One relation from a reference list; `relation` selects the resulting
/// `EdgeKind` (references, implements, dependency), defaulting to
/// `References` for anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecReference {
    pub from_spec: String,
    pub to_spec: String,
    pub relation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecLedgerReport {
    #[serde(default)]
    pub harmonies: Vec<Harmony>,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub references: Vec<SpecReference>,
}

fn reference_kind(relation: &str) -> EdgeKind {
    match relation {
        "implements" => EdgeKind::Implements,
        "dependency" => EdgeKind::Dependency,
        _ => EdgeKind::References,
    }
}

pub struct SpecLedgerAdapter {
    edges: Vec<HyperEdge>,
}

impl SpecLedgerAdapter {
    pub fn new(report: SpecLedgerReport) -> Self {
        let mut edges = Vec::new();

        for h in &report.harmonies {
            edges.push(
                HyperEdge::new(EdgeKind::Harmony, h.spec_a.clone(), h.spec_b.clone(), Origin::SpecLedger, h.strength)
                    .with_context(h.relationship.clone()),
            );
        }

        for c in &report.contradictions {
            edges.push(
                HyperEdge::new(EdgeKind::Contradiction, c.spec_a.clone(), c.spec_b.clone(), Origin::SpecLedger, c.severity)
                    .with_context(c.conflict_type.clone()),
            );
        }

        for r in &report.references {
            edges.push(HyperEdge::new(
                reference_kind(&r.relation),
                r.from_spec.clone(),
                r.to_spec.clone(),
                Origin::SpecLedger,
                1.0,
            ));
        }

        Self { edges }
    }
}

#[async_trait]
impl EdgeSource for SpecLedgerAdapter {
    async fn edges_from(&self, path: &str) -> Vec<HyperEdge> {
        self.edges.iter().filter(|e| e.source_path == path).cloned().collect()
    }

    async fn edges_to(&self, path: &str) -> Vec<HyperEdge> {
        self.edges.iter().filter(|e| e.target_path == path).cloned().collect()
    }

    async fn all_edges(&self) -> Vec<HyperEdge> {
        self.edges.clone()
    }

    async fn search(&self, query: &str) -> Vec<HyperEdge> {
        self.edges
            .iter()
            .filter(|e| {
                e.source_path.contains(query)
                    || e.target_path.contains(query)
                    || e.context.as_deref().is_some_and(|c| c.contains(query))
            })
            .cloned()
            .collect()
    }

    fn origin(&self) -> &'static str {
        "spec_ledger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SpecLedgerReport {
        SpecLedgerReport {
            harmonies: vec![Harmony {
                spec_a: "a.md".into(),
                spec_b: "b.md".into(),
                relationship: "complementary".into(),
                strength: 0.8,
            }],
            contradictions: vec![Contradiction {
                spec_a: "a.md".into(),
                spec_b: "c.md".into(),
                severity: 0.6,
                conflict_type: "scope overlap".into(),
            }],
            references: vec![SpecReference {
                from_spec: "a.md".into(),
                to_spec: "d.md".into(),
                relation: "implements".into(),
            }],
        }
    }

    #[tokio::test]
    async fn harmonies_and_contradictions_and_references_all_materialize() {
        let adapter = SpecLedgerAdapter::new(report());
        let edges = adapter.all_edges().await;
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Harmony));
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Contradiction));
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Implements));
    }

    #[tokio::test]
    async fn edges_from_filters_by_source_path() {
        let adapter = SpecLedgerAdapter::new(report());
        let edges = adapter.edges_from("a.md").await;
        assert_eq!(edges.len(), 3);
        assert!(adapter.edges_from("z.md").await.is_empty());
    }
}
