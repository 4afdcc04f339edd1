//! Sovereign adapter: turns overlay edges and extracted structural edges
//! into `HyperEdge`s, origin `sovereign`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::sovereign::SovereignStore;

use super::super::source::EdgeSource;
use super::super::types::{EdgeKind, HyperEdge, Origin};

pub struct SovereignAdapter {
    store: Arc<SovereignStore>,
}

impl SovereignAdapter {
    pub fn new(store: Arc<SovereignStore>) -> Self {
        Self { store }
    }

    fn edges_for_entity(&self, path: &str) -> Vec<HyperEdge> {
        let Ok(Some(entity)) = self.store.query(path) else {
            return Vec::new();
        };
        entity
            .overlay
            .edges
            .iter()
            .map(|d| {
                let mut edge = HyperEdge::new(
                    EdgeKind::from_discovered(&d.kind),
                    path.to_string(),
                    d.target.clone(),
                    Origin::Sovereign,
                    1.0,
                );
                if let Some(ctx) = &d.context {
                    edge = edge.with_context(ctx.clone());
                }
                if let Some(line) = d.line_number {
                    edge = edge.with_line_number(line);
                }
                edge
            })
            .collect()
    }
}

#[async_trait]
impl EdgeSource for SovereignAdapter {
    async fn edges_from(&self, path: &str) -> Vec<HyperEdge> {
        self.edges_for_entity(path)
    }

    async fn edges_to(&self, path: &str) -> Vec<HyperEdge> {
        self.all_edges()
            .await
            .into_iter()
            .filter(|e| e.target_path == path)
            .collect()
    }

    async fn all_edges(&self) -> Vec<HyperEdge> {
        let Ok(paths) = self.store.known_paths() else {
            return Vec::new();
        };
        paths.iter().flat_map(|p| self.edges_for_entity(p)).collect()
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
        "sovereign"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark::MarkLedger;
    use crate::sovereign::IngestEvent;

    #[tokio::test]
    async fn maps_an_extracted_reference_to_a_references_edge() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SovereignStore::open(dir.path()).unwrap());
        let ledger = MarkLedger::new();

        store
            .ingest(
                IngestEvent {
                    path: "a.md".into(),
                    content_bytes: b"see [b](b.md)\n".to_vec(),
                    source: "test".into(),
                },
                |m| ledger.append(m),
            )
            .unwrap();

        let adapter = SovereignAdapter::new(store);
        let edges = adapter.edges_from("a.md").await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::References);
        assert_eq!(edges[0].origin, Origin::Sovereign);
        assert_eq!(edges[0].target_path, "b.md");
    }

    #[tokio::test]
    async fn unknown_path_yields_no_edges() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SovereignStore::open(dir.path()).unwrap());
        let adapter = SovereignAdapter::new(store);
        assert!(adapter.edges_from("missing.md").await.is_empty());
    }
}
