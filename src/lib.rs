//! Umwelt: an observability and autonomy substrate for long-running agents.
//!
//! # Core Concepts
//!
//! - **Marks**: the causal event log every other subsystem derives from.
//! - **Crystals**: compressed, multi-level synthesis over marks, with
//!   honesty tracking for what was dropped along the way.
//! - **Sovereign store**: documents held under inbound sovereignty — edges
//!   are discovered and overlaid, never rewritten into the source text.
//! - **Composable edge graph**: one graph unified from sovereign, witness,
//!   and spec-ledger sources under a small source algebra.
//! - **JIT sandbox**: stability analysis followed by timeout-bounded
//!   execution of generated agent source through an injected runtime.
//! - **Trust gate**: permits, denies, or routes proposed actions to a
//!   human, tracking the metrics that justify raising autonomy over time.
//!
//! [`Core`] is the single entry point that wires these together for any
//! transport (CLI today; others tomorrow).

pub mod config;
pub mod crystal;
pub mod edge;
pub mod error;
pub mod mark;
pub mod rpc;
pub mod sandbox;
pub mod sovereign;
pub mod trust;

use std::sync::Arc;

pub use config::{ConfigError, CoreConfig};
pub use crystal::{
    crystallize, Crystal, CrystalError, CrystalId, CrystalResult, CrystalSource, CrystalStore,
    CrystallizationOutcome, CrystallizationStatus, CrystallizerConfig, FixedProvider, Honesty,
    Level, LlmError, LlmProvider, Mood, RetrievalWeights, RetrievedCrystal, SourceRef,
    UnavailableProvider,
};
pub use edge::{
    BoxedSource, Compose, Contradiction, EdgeGraphError, EdgeGraphResult, EdgeKind, EdgeSource,
    GraphService, Harmony, HyperEdge, IdentitySource, Neighbors, Origin, SovereignAdapter,
    SpecLedgerAdapter, SpecLedgerReport, SpecReference, WitnessAdapter,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use mark::{
    Cost, Determinism, EvidenceLevel, LinkSource, Mark, MarkError, MarkFilter, MarkId, MarkLink,
    MarkLinkRelation, MarkLedger, MarkResult, MarkTree, Phase, Proof, Response, Stimulus, Trace,
    Umwelt, Walk, WalkId, WalkStatus,
};
pub use rpc::Core;
pub use sandbox::{
    analyze_stability, execute_in_sandbox, forbidden_pattern_regex, RuntimeError, SandboxConfig,
    SandboxResult, SandboxRuntime, StabilityConfig, StabilityMetrics, StabilityResult,
    UnavailableRuntime, DEFAULT_IMPORT_RISK,
};
pub use sovereign::{
    extract_edges, DiscoveredEdge, IngestEvent, IngestedEntity, Overlay, ProvenanceChain,
    SovereignEntity, SovereignError, SovereignResult, SovereignStore, Version,
};
pub use trust::{
    EscalationReport, GateDecision, PendingSuggestion, RateLimitConfig, TrustError, TrustGate,
    TrustLevel, TrustMetrics, TrustState,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire a [`Core`] from configuration: opens the sovereign store at
/// `config.resolved_home()`, builds the edge graph over the sovereign and
/// witness adapters, and starts the trust gate at `L0ReadOnly`.
///
/// There is no LLM provider wiring here — callers that want crystallization
/// backed by a real model construct their own `Arc<dyn LlmProvider>` and
/// build `Core` directly via [`Core::new`].
pub fn bootstrap(config: &CoreConfig) -> CoreResult<Core> {
    let ledger = Arc::new(MarkLedger::new());
    let sovereign = Arc::new(SovereignStore::open(config.resolved_home())?);
    let sources: Vec<Arc<dyn EdgeSource>> = vec![
        Arc::new(SovereignAdapter::new(sovereign.clone())),
        Arc::new(WitnessAdapter::new(ledger.clone())),
    ];
    let graph = Arc::new(GraphService::new(sources)?);
    let crystals = Arc::new(CrystalStore::new());
    let llm: Arc<dyn LlmProvider> = Arc::new(UnavailableProvider);
    let trust = Arc::new(TrustGate::new(
        ledger.clone(),
        config.rate_limit.clone(),
        "sandbox/".to_string(),
    ));
    Ok(Core::new(ledger, sovereign, graph, crystals, llm, trust))
}
