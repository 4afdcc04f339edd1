//! Transport-independent RPC surface.
//!
//! `Core` is the single entry point every transport (CLI today; MCP, gRPC,
//! or a direct embedding tomorrow) calls into: transports never reach into
//! the mark ledger, sovereign store, or trust gate directly. Every verb
//! here produces exactly one mark at the boundary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::crystal::{crystallize, retrieve, Crystal, CrystalSource, CrystalStore, CrystallizerConfig, Level, LlmProvider, RetrievalWeights, RetrievedCrystal};
use crate::edge::{EdgeKind, GraphService, HyperEdge, Neighbors};
use crate::error::{CoreError, CoreResult};
use crate::mark::{Mark, MarkFilter, MarkId, MarkLedger, Phase, Response, Stimulus, Umwelt};
use crate::sovereign::{IngestEvent, IngestedEntity, SovereignEntity, SovereignStore};
use crate::trust::{GateDecision, TrustGate};

/// Every subsystem wired together behind one façade. Cheap to clone: each
/// field is a handle (`Arc`), not owned state.
#[derive(Clone)]
pub struct Core {
    ledger: Arc<MarkLedger>,
    sovereign: Arc<SovereignStore>,
    graph: Arc<GraphService>,
    crystals: Arc<CrystalStore>,
    llm: Arc<dyn LlmProvider>,
    trust: Arc<TrustGate>,
}

impl Core {
    pub fn new(
        ledger: Arc<MarkLedger>,
        sovereign: Arc<SovereignStore>,
        graph: Arc<GraphService>,
        crystals: Arc<CrystalStore>,
        llm: Arc<dyn LlmProvider>,
        trust: Arc<TrustGate>,
    ) -> Self {
        Self { ledger, sovereign, graph, crystals, llm, trust }
    }

    fn append(&self, mark: Mark) -> CoreResult<MarkId> {
        Ok(self.ledger.append(mark)?)
    }

    // --- witness ---

    pub fn witness_manifest(&self) -> &'static [&'static str] {
        &["manifest", "capture", "action", "rollback_window", "escalate"]
    }

    pub fn witness_capture(&self, thought: &str, umwelt: Umwelt) -> CoreResult<MarkId> {
        let mark = Mark::new(Phase::Sense, Stimulus::new("CAPTURE", json!({ "thought": thought })), Response::new("CAPTURED", Value::Null), umwelt);
        self.append(mark)
    }

    pub fn witness_action(&self, action: &str, result: Value, umwelt: Umwelt) -> CoreResult<MarkId> {
        let mark = Mark::new(Phase::Act, Stimulus::new("ACTION", json!({ "action": action })), Response::new("ACTION_TAKEN", result), umwelt);
        self.append(mark)
    }

    /// Marks appended since `since`, timestamp-ordered.
    pub fn witness_rollback_window(&self, since: DateTime<Utc>) -> Vec<Mark> {
        let mut marks = self.ledger.query(&MarkFilter::new().with_range(since, Utc::now()));
        marks.sort_by_key(|m| m.timestamp);
        marks
    }

    /// Propose escalating the trust gate to a higher level. Never applies
    /// automatically — the report is a recommendation pending external
    /// confirmation.
    pub fn witness_escalate(&self, umwelt: Umwelt) -> CoreResult<crate::trust::EscalationReport> {
        let report = self.trust.check_escalation();
        let mark = Mark::new(
            Phase::Reflect,
            Stimulus::new("ESCALATION_CHECK", Value::Null),
            Response::new("ESCALATION_REPORT", json!({ "eligible": report.eligible, "next_level": report.next_level })),
            umwelt,
        );
        self.append(mark)?;
        Ok(report)
    }

    // --- sovereign ---

    pub fn sovereign_manifest(&self) -> &'static [&'static str] {
        &["manifest", "ingest", "query", "diff", "export"]
    }

    pub fn sovereign_ingest(&self, path: &str, bytes: Vec<u8>, source: &str) -> CoreResult<IngestedEntity> {
        let ledger = self.ledger.clone();
        let event = IngestEvent { path: path.to_string(), content_bytes: bytes, source: source.to_string() };
        let ingested = self.sovereign.ingest(event, move |mark| ledger.append(mark))?;
        Ok(ingested)
    }

    pub fn sovereign_query(&self, path: &str) -> CoreResult<Option<SovereignEntity>> {
        Ok(self.sovereign.query(path)?)
    }

    /// Byte-level diff against the entity's current version: `None` if the
    /// path is unknown, `Some(true)` if `external_bytes` matches current.
    pub fn sovereign_diff(&self, path: &str, external_bytes: &[u8]) -> CoreResult<Option<bool>> {
        let Some(entity) = self.sovereign.query(path)? else {
            return Ok(None);
        };
        Ok(Some(entity.current().content_bytes == external_bytes))
    }

    pub fn sovereign_export(&self, path: &str) -> CoreResult<(Vec<u8>, MarkId)> {
        let ledger = self.ledger.clone();
        Ok(self.sovereign.export(path, move |mark| ledger.append(mark))?)
    }

    // --- graph ---

    pub fn graph_manifest(&self) -> &'static [&'static str] {
        &["manifest", "neighbors", "evidence", "trace", "search"]
    }

    pub async fn graph_neighbors(&self, path: &str) -> Neighbors {
        self.graph.neighbors(path).await
    }

    pub async fn graph_evidence(&self, path: &str, kinds: Option<&[EdgeKind]>) -> Vec<HyperEdge> {
        self.graph.evidence_for(path, kinds).await
    }

    pub async fn graph_trace(&self, from: &str, to: &str, max_depth: usize) -> Vec<Vec<HyperEdge>> {
        self.graph.trace_path(from, to, max_depth).await
    }

    pub async fn graph_search(&self, query: &str) -> Vec<HyperEdge> {
        self.graph.search(query).await
    }

    // --- crystal ---

    pub fn crystal_manifest(&self) -> &'static [&'static str] {
        &["manifest", "crystallize", "query", "timeline"]
    }

    pub async fn crystal_crystallize(&self, level: Level, sources: Vec<CrystalSource>, config: &CrystallizerConfig, umwelt: Umwelt) -> CoreResult<Crystal> {
        let outcome = crystallize(self.llm.as_ref(), level, sources, config).await;
        let crystal = outcome.crystal.clone();
        let crystal_id = self.crystals.append(crystal.clone())?;
        let mark = Mark::new(
            Phase::Reflect,
            Stimulus::new("CRYSTALLIZE", json!({ "level": format!("{level:?}") })),
            Response::new("CRYSTAL_WRITTEN", json!({ "crystal_id": crystal_id.to_string(), "status": format!("{:?}", outcome.status) })),
            umwelt,
        );
        self.append(mark)?;
        Ok(crystal)
    }

    pub fn crystal_query(&self, query: Option<&str>, budget: u64, weights: RetrievalWeights) -> Vec<RetrievedCrystal> {
        retrieve(&self.crystals, budget, query, weights)
    }

    /// Crystals whose `time_range` falls within `[since, until]`.
    pub fn crystal_timeline(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Vec<Crystal> {
        self.crystals.all().into_iter().filter(|c| c.time_range.0 >= since && c.time_range.1 <= until).collect()
    }

    // --- trust ---

    pub fn trust_decide(&self, action: &str, umwelt: Umwelt) -> Result<GateDecision, CoreError> {
        Ok(self.trust.decide(action, umwelt)?)
    }

    pub fn trust_state(&self) -> crate::trust::TrustState {
        self.trust.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crystal::UnavailableProvider;

    fn core() -> Core {
        let ledger = Arc::new(MarkLedger::new());
        let dir = tempfile::tempdir().unwrap();
        let sovereign = Arc::new(SovereignStore::open(dir.path()).unwrap());
        let graph = Arc::new(GraphService::new(vec![Arc::new(crate::edge::IdentitySource)]).unwrap());
        let crystals = Arc::new(CrystalStore::new());
        let llm: Arc<dyn LlmProvider> = Arc::new(UnavailableProvider);
        let trust = Arc::new(TrustGate::new(ledger.clone(), Default::default(), "sandbox/".to_string()));
        Core::new(ledger, sovereign, graph, crystals, llm, trust)
    }

    #[test]
    fn witness_capture_appends_exactly_one_mark() {
        let core = core();
        let before = core.ledger.len();
        core.witness_capture("noticed something", Umwelt::new("tester")).unwrap();
        assert_eq!(core.ledger.len(), before + 1);
    }

    #[test]
    fn sovereign_ingest_and_query_roundtrip() {
        let core = core();
        core.sovereign_ingest("notes/a.md", b"# A\n".to_vec(), "test").unwrap();
        let entity = core.sovereign_query("notes/a.md").unwrap().unwrap();
        assert_eq!(entity.current().content_bytes, b"# A\n");
    }

    #[test]
    fn sovereign_diff_reports_unknown_path_as_none() {
        let core = core();
        assert!(core.sovereign_diff("nowhere.md", b"x").unwrap().is_none());
    }

    #[tokio::test]
    async fn graph_neighbors_of_unknown_path_is_empty() {
        let core = core();
        let neighbors = core.graph_neighbors("nowhere").await;
        assert!(neighbors.incoming.is_empty() && neighbors.outgoing.is_empty());
    }

    #[test]
    fn trust_decide_denies_forbidden_action_regardless_of_level() {
        let core = core();
        let result = core.trust_decide("rm -rf /", Umwelt::new("tester"));
        assert!(result.is_err());
    }
}
