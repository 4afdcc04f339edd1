//! The edge source contract and its composition algebra.
//!
//! Grounded on `adapter::traits::Adapter`: a narrow `#[async_trait]`
//! interface with a small finite method surface, registered into a
//! pipeline rather than matched by concrete type.

use async_trait::async_trait;

use super::types::HyperEdge;

/// Anything that can answer edge queries for one path, or for everything.
#[async_trait]
pub trait EdgeSource: Send + Sync {
    async fn edges_from(&self, path: &str) -> Vec<HyperEdge>;
    async fn edges_to(&self, path: &str) -> Vec<HyperEdge>;
    async fn all_edges(&self) -> Vec<HyperEdge>;
    async fn search(&self, query: &str) -> Vec<HyperEdge>;
    fn origin(&self) -> &'static str;
}

pub type BoxedSource = Box<dyn EdgeSource>;

/// The identity element of composition: emits nothing from any method.
pub struct IdentitySource;

#[async_trait]
impl EdgeSource for IdentitySource {
    async fn edges_from(&self, _path: &str) -> Vec<HyperEdge> {
        Vec::new()
    }

    async fn edges_to(&self, _path: &str) -> Vec<HyperEdge> {
        Vec::new()
    }

    async fn all_edges(&self) -> Vec<HyperEdge> {
        Vec::new()
    }

    async fn search(&self, _query: &str) -> Vec<HyperEdge> {
        Vec::new()
    }

    fn origin(&self) -> &'static str {
        "identity"
    }
}

/// `a >> b`: for every method, `a`'s output followed by `b`'s output.
pub struct Compose {
    a: BoxedSource,
    b: BoxedSource,
}

#[async_trait]
impl EdgeSource for Compose {
    async fn edges_from(&self, path: &str) -> Vec<HyperEdge> {
        let mut out = self.a.edges_from(path).await;
        out.extend(self.b.edges_from(path).await);
        out
    }

    async fn edges_to(&self, path: &str) -> Vec<HyperEdge> {
        let mut out = self.a.edges_to(path).await;
        out.extend(self.b.edges_to(path).await);
        out
    }

    async fn all_edges(&self) -> Vec<HyperEdge> {
        let mut out = self.a.all_edges().await;
        out.extend(self.b.all_edges().await);
        out
    }

    async fn search(&self, query: &str) -> Vec<HyperEdge> {
        let mut out = self.a.search(query).await;
        out.extend(self.b.search(query).await);
        out
    }

    fn origin(&self) -> &'static str {
        "composed"
    }
}

impl std::ops::Shr<BoxedSource> for BoxedSource {
    type Output = BoxedSource;

    fn shr(self, rhs: BoxedSource) -> BoxedSource {
        Box::new(Compose { a: self, b: rhs })
    }
}

/// Order-insensitive equality check for property tests: same edges, any
/// order, same multiplicities.
#[cfg(test)]
pub(crate) fn same_multiset(a: &[HyperEdge], b: &[HyperEdge]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut b_remaining: Vec<&HyperEdge> = b.iter().collect();
    for edge in a {
        let Some(pos) = b_remaining.iter().position(|e| *e == edge) else {
            return false;
        };
        b_remaining.remove(pos);
    }
    true
}
