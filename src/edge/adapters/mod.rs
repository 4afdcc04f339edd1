//! The three concrete edge sources.

mod sovereign;
mod spec_ledger;
mod witness;

pub use sovereign::SovereignAdapter;
pub use spec_ledger::{Contradiction, Harmony, SpecLedgerAdapter, SpecLedgerReport, SpecReference};
pub use witness::WitnessAdapter;
