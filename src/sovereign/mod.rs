//! Sovereign store: documents possessed under the inbound-sovereignty
//! protocol, versioned, hashed, and with edges discovered and overlaid
//! rather than rewritten into the source text.

mod extract;
mod store;
mod types;

pub use extract::extract_edges;
pub use store::{ProvenanceChain, SovereignError, SovereignResult, SovereignStore};
pub use types::{
    DiscoveredEdge, IngestEvent, IngestedEntity, Overlay, SovereignEntity, Version,
};
