//! Composable edge graph: a single graph unified from sovereign,
//! witness, and spec-ledger sources, composed under a category-law
//! algebra and queried through one service.

mod adapters;
mod graph_service;
mod source;
mod types;

pub use adapters::{Contradiction, Harmony, SovereignAdapter, SpecLedgerAdapter, SpecLedgerReport, SpecReference, WitnessAdapter};
pub use graph_service::{EdgeGraphError, EdgeGraphResult, GraphService, Neighbors};
pub use source::{BoxedSource, Compose, EdgeSource, IdentitySource};
pub use types::{EdgeKind, HyperEdge, Origin};
