//! Unifies edges from every composed source into path-level queries.
//!
//! Grounded on `query::traverse::TraverseQuery`'s bounded-BFS shape, with
//! the `EdgeIndex` precomputation replaced by an index built fresh per
//! call from whatever the composed sources currently report — these
//! sources are live stores, not a static graph snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use super::source::EdgeSource;
use super::types::{EdgeKind, HyperEdge};

#[derive(Debug, Error)]
pub enum EdgeGraphError {
    #[error("no edge sources configured")]
    NoSources,
}

pub type EdgeGraphResult<T> = Result<T, EdgeGraphError>;

#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    pub incoming: Vec<HyperEdge>,
    pub outgoing: Vec<HyperEdge>,
}

const DEFAULT_EVIDENCE_KINDS: &[EdgeKind] = &[EdgeKind::Evidence, EdgeKind::Implements, EdgeKind::Harmony];
const MAX_PATHS: usize = 100;

/// Queries a fixed set of edge sources. A source that panics mid-query is
/// isolated to that call: its contribution for that query is dropped, a
/// warning is logged, and the remaining sources still answer.
pub struct GraphService {
    sources: Vec<Arc<dyn EdgeSource>>,
}

impl GraphService {
    pub fn new(sources: Vec<Arc<dyn EdgeSource>>) -> EdgeGraphResult<Self> {
        if sources.is_empty() {
            return Err(EdgeGraphError::NoSources);
        }
        Ok(Self { sources })
    }

    async fn gather<F, Fut>(&self, label: &str, call: F) -> Vec<HyperEdge>
    where
        F: Fn(Arc<dyn EdgeSource>) -> Fut,
        Fut: std::future::Future<Output = Vec<HyperEdge>> + Send + 'static,
    {
        let mut out = Vec::new();
        for source in &self.sources {
            let origin = source.origin();
            let handle = tokio::spawn(call(source.clone()));
            match handle.await {
                Ok(edges) => out.extend(edges),
                Err(join_err) => {
                    warn!(source = origin, query = label, error = %join_err, "edge source failed; isolating and continuing");
                }
            }
        }
        out
    }

    fn dedupe(mut edges: Vec<HyperEdge>) -> Vec<HyperEdge> {
        let mut unique: Vec<HyperEdge> = Vec::with_capacity(edges.len());
        for edge in edges.drain(..) {
            if !unique.contains(&edge) {
                unique.push(edge);
            }
        }
        unique
    }

    pub async fn neighbors(&self, path: &str) -> Neighbors {
        let path_in = path.to_string();
        let path_out = path.to_string();
        let incoming = self
            .gather("edges_to", move |s| {
                let p = path_in.clone();
                async move { s.edges_to(&p).await }
            })
            .await;
        let outgoing = self
            .gather("edges_from", move |s| {
                let p = path_out.clone();
                async move { s.edges_from(&p).await }
            })
            .await;
        Neighbors {
            incoming: Self::dedupe(incoming),
            outgoing: Self::dedupe(outgoing),
        }
    }

    pub async fn evidence_for(&self, path: &str, kinds: Option<&[EdgeKind]>) -> Vec<HyperEdge> {
        let kinds: Vec<EdgeKind> = kinds.map(|k| k.to_vec()).unwrap_or_else(|| DEFAULT_EVIDENCE_KINDS.to_vec());
        let path_owned = path.to_string();
        let targeting = self
            .gather("evidence_for", move |s| {
                let p = path_owned.clone();
                async move { s.edges_to(&p).await }
            })
            .await;
        Self::dedupe(targeting)
            .into_iter()
            .filter(|e| kinds.contains(&e.kind))
            .collect()
    }

    /// All simple paths from `from` to `to` of length at most `max_depth`
    /// hops, capped at `MAX_PATHS`.
    pub async fn trace_path(&self, from: &str, to: &str, max_depth: usize) -> Vec<Vec<HyperEdge>> {
        let all = self.gather("all_edges", |s| async move { s.all_edges().await }).await;
        let all = Self::dedupe(all);

        let mut outgoing: HashMap<&str, Vec<&HyperEdge>> = HashMap::new();
        for edge in &all {
            outgoing.entry(edge.source_path.as_str()).or_default().push(edge);
        }

        let mut results = Vec::new();
        let mut queue: VecDeque<(Vec<&HyperEdge>, &str)> = VecDeque::new();
        queue.push_back((Vec::new(), from));

        while let Some((path, current)) = queue.pop_front() {
            if path.len() as u32 >= max_depth as u32 {
                continue;
            }
            let Some(edges) = outgoing.get(current) else {
                continue;
            };
            for edge in edges {
                if path.iter().any(|e| std::ptr::eq(*e, *edge)) {
                    continue; // simple paths only: no repeated edge
                }
                let mut next_path = path.clone();
                next_path.push(*edge);
                if edge.target_path == to {
                    results.push(next_path.iter().map(|e| (*e).clone()).collect());
                    if results.len() >= MAX_PATHS {
                        return results;
                    }
                } else {
                    queue.push_back((next_path, edge.target_path.as_str()));
                }
            }
        }

        results
    }

    pub async fn search(&self, query: &str) -> Vec<HyperEdge> {
        let query_owned = query.to_string();
        let found = self
            .gather("search", move |s| {
                let q = query_owned.clone();
                async move { s.search(&q).await }
            })
            .await;
        Self::dedupe(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::types::Origin;
    use async_trait::async_trait;

    struct Fixed(Vec<HyperEdge>, &'static str);

    #[async_trait]
    impl EdgeSource for Fixed {
        async fn edges_from(&self, path: &str) -> Vec<HyperEdge> {
            self.0.iter().filter(|e| e.source_path == path).cloned().collect()
        }
        async fn edges_to(&self, path: &str) -> Vec<HyperEdge> {
            self.0.iter().filter(|e| e.target_path == path).cloned().collect()
        }
        async fn all_edges(&self) -> Vec<HyperEdge> {
            self.0.clone()
        }
        async fn search(&self, query: &str) -> Vec<HyperEdge> {
            self.0.iter().filter(|e| e.target_path.contains(query)).cloned().collect()
        }
        fn origin(&self) -> &'static str {
            self.1
        }
    }

    struct Panics;

    #[async_trait]
    impl EdgeSource for Panics {
        async fn edges_from(&self, _path: &str) -> Vec<HyperEdge> {
            panic!("boom")
        }
        async fn edges_to(&self, _path: &str) -> Vec<HyperEdge> {
            panic!("boom")
        }
        async fn all_edges(&self) -> Vec<HyperEdge> {
            panic!("boom")
        }
        async fn search(&self, _query: &str) -> Vec<HyperEdge> {
            panic!("boom")
        }
        fn origin(&self) -> &'static str {
            "panics"
        }
    }

    fn edge(kind: EdgeKind, from: &str, to: &str) -> HyperEdge {
        HyperEdge::new(kind, from, to, Origin::Sovereign, 1.0)
    }

    #[tokio::test]
    async fn missing_path_returns_empty_not_error() {
        let service = GraphService::new(vec![Arc::new(Fixed(vec![], "a"))]).unwrap();
        let neighbors = service.neighbors("nowhere").await;
        assert!(neighbors.incoming.is_empty());
        assert!(neighbors.outgoing.is_empty());
    }

    #[tokio::test]
    async fn a_panicking_source_is_isolated() {
        let good = Arc::new(Fixed(vec![edge(EdgeKind::References, "a", "b")], "good"));
        let service = GraphService::new(vec![good, Arc::new(Panics)]).unwrap();
        let neighbors = service.neighbors("b").await;
        assert_eq!(neighbors.incoming.len(), 1);
    }

    #[tokio::test]
    async fn evidence_for_defaults_to_evidence_implements_harmony() {
        let edges = vec![
            edge(EdgeKind::Evidence, "a", "b"),
            edge(EdgeKind::Gotcha, "c", "b"),
        ];
        let service = GraphService::new(vec![Arc::new(Fixed(edges, "x"))]).unwrap();
        let found = service.evidence_for("b", None).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, EdgeKind::Evidence);
    }

    #[tokio::test]
    async fn trace_path_finds_a_two_hop_route() {
        let edges = vec![
            edge(EdgeKind::References, "a", "b"),
            edge(EdgeKind::References, "b", "c"),
        ];
        let service = GraphService::new(vec![Arc::new(Fixed(edges, "x"))]).unwrap();
        let paths = service.trace_path("a", "c", 3).await;
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 2);
    }

    #[tokio::test]
    async fn trace_path_respects_max_depth() {
        let edges = vec![
            edge(EdgeKind::References, "a", "b"),
            edge(EdgeKind::References, "b", "c"),
        ];
        let service = GraphService::new(vec![Arc::new(Fixed(edges, "x"))]).unwrap();
        let paths = service.trace_path("a", "c", 1).await;
        assert!(paths.is_empty());
    }

    #[test]
    fn constructing_with_no_sources_is_an_error() {
        assert!(GraphService::new(vec![]).is_err());
    }
}
