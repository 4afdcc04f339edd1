//! Witness adapter: turns marks' conventional tags into `HyperEdge`s,
//! origin `witness`.
//!
//! `file:{p}` and `spec:{p}` tags contribute target paths; a session tag
//! (gotcha, eureka, taste, friction, decision) determines `kind`,
//! otherwise `kind = EVIDENCE`. A mark with no path tag contributes
//! nothing. The mark itself, not a path, is the edge's source — there is
//! no other node to point from.

use std::sync::Arc;

use async_trait::async_trait;

use crate::mark::{MarkFilter, MarkLedger};

use super::super::source::EdgeSource;
use super::super::types::{EdgeKind, HyperEdge, Origin};

pub struct WitnessAdapter {
    ledger: Arc<MarkLedger>,
}

impl WitnessAdapter {
    pub fn new(ledger: Arc<MarkLedger>) -> Self {
        Self { ledger }
    }

    fn path_tags(mark: &crate::mark::Mark) -> Vec<String> {
        mark.tags
            .iter()
            .filter_map(|t| {
                t.strip_prefix("file:")
                    .or_else(|| t.strip_prefix("spec:"))
                    .map(|p| p.to_string())
            })
            .collect()
    }

    fn kind_for(mark: &crate::mark::Mark) -> EdgeKind {
        mark.tags
            .iter()
            .find_map(|t| EdgeKind::from_session_tag(t))
            .unwrap_or(EdgeKind::Evidence)
    }
}

#[async_trait]
impl EdgeSource for WitnessAdapter {
    async fn edges_from(&self, path: &str) -> Vec<HyperEdge> {
        self.all_edges()
            .await
            .into_iter()
            .filter(|e| e.source_path == path)
            .collect()
    }

    async fn edges_to(&self, path: &str) -> Vec<HyperEdge> {
        self.all_edges()
            .await
            .into_iter()
            .filter(|e| e.target_path == path)
            .collect()
    }

    async fn all_edges(&self) -> Vec<HyperEdge> {
        let marks = self.ledger.query(&MarkFilter::new());
        let mut edges = Vec::new();
        for mark in &marks {
            let paths = Self::path_tags(mark);
            if paths.is_empty() {
                continue;
            }
            let kind = Self::kind_for(mark);
            for path in paths {
                edges.push(
                    HyperEdge::new(kind, format!("mark:{}", mark.id), path, Origin::Witness, 1.0)
                        .with_mark_id(mark.id.to_string())
                        .with_context(mark.stimulus.kind.clone()),
                );
            }
        }
        edges
    }

    async fn search(&self, query: &str) -> Vec<HyperEdge> {
        self.all_edges()
            .await
            .into_iter()
            .filter(|e| {
                e.source_path.contains(query)
                    || e.target_path.contains(query)
                    || e.context.as_deref().is_some_and(|c| c.contains(query))
            })
            .collect()
    }

    fn origin(&self) -> &'static str {
        "witness"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark::{Mark, Phase, Response, Stimulus, Umwelt};

    fn ledger_with(tags: &[&str]) -> Arc<MarkLedger> {
        let ledger = Arc::new(MarkLedger::new());
        let mark = Mark::new(
            Phase::Reflect,
            Stimulus::new("SESSION_NOTE", serde_json::json!({})),
            Response::new("NOTED", serde_json::json!({})),
            Umwelt::new("tester"),
        )
        .with_tags(tags.iter().map(|s| s.to_string()));
        ledger.append(mark).unwrap();
        ledger
    }

    #[tokio::test]
    async fn gotcha_tag_with_file_path_becomes_a_gotcha_edge() {
        let ledger = ledger_with(&["file:src/x.rs", "gotcha"]);
        let adapter = WitnessAdapter::new(ledger);
        let edges = adapter.all_edges().await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Gotcha);
        assert_eq!(edges[0].target_path, "src/x.rs");
        assert_eq!(edges[0].origin, Origin::Witness);
    }

    #[tokio::test]
    async fn no_path_tag_yields_no_edges() {
        let ledger = ledger_with(&["gotcha"]);
        let adapter = WitnessAdapter::new(ledger);
        assert!(adapter.all_edges().await.is_empty());
    }

    #[tokio::test]
    async fn no_session_tag_defaults_to_evidence() {
        let ledger = ledger_with(&["spec:docs/a.md"]);
        let adapter = WitnessAdapter::new(ledger);
        let edges = adapter.all_edges().await;
        assert_eq!(edges[0].kind, EdgeKind::Evidence);
    }
}
