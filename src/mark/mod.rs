//! Mark & Trace ledger: the causal event log everything else is derived from.

mod store;
mod trace;
mod types;
mod walk;

pub use store::{MarkError, MarkFilter, MarkLedger, MarkResult, MarkTree};
pub use trace::Trace;
pub use types::{
    Cost, Determinism, EvidenceLevel, LinkSource, Mark, MarkId, MarkLink, MarkLinkRelation, Phase,
    Proof, Response, Stimulus, Umwelt, WalkId,
};
pub use walk::{Walk, WalkStatus};
