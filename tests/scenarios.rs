//! End-to-end scenario tests exercising the public `Core` facade and the
//! standalone sandbox/trust entry points together, one test per scenario.

use std::sync::Arc;

use async_trait::async_trait;
use umwelt::{
    analyze_stability, execute_in_sandbox, Core, CrystalSource, CrystalStore, CrystallizerConfig,
    EdgeGraphError, EdgeKind, EdgeSource, GraphService, IdentitySource, Level,
    MarkLedger, RateLimitConfig, RuntimeError, SandboxConfig, SandboxRuntime, SourceRef,
    SovereignAdapter, SovereignStore, StabilityConfig, TrustGate, Umwelt, UnavailableProvider,
    WitnessAdapter,
};

fn core_with_sovereign(dir: &std::path::Path) -> (Core, Arc<SovereignStore>, Arc<MarkLedger>) {
    let ledger = Arc::new(MarkLedger::new());
    let sovereign = Arc::new(SovereignStore::open(dir).unwrap());
    let sources: Vec<Arc<dyn EdgeSource>> = vec![
        Arc::new(SovereignAdapter::new(sovereign.clone())),
        Arc::new(WitnessAdapter::new(ledger.clone())),
    ];
    let graph: Result<GraphService, EdgeGraphError> = GraphService::new(sources);
    let graph = Arc::new(graph.unwrap());
    let crystals = Arc::new(CrystalStore::new());
    let llm = Arc::new(UnavailableProvider);
    let trust = Arc::new(TrustGate::new(
        ledger.clone(),
        RateLimitConfig::default(),
        "sandbox/".to_string(),
    ));
    let core = Core::new(ledger.clone(), sovereign.clone(), graph, crystals, llm, trust);
    (core, sovereign, ledger)
}

/// S1 — Ingest a two-line spec.
#[tokio::test]
async fn s1_ingest_a_two_line_spec() {
    let dir = tempfile::tempdir().unwrap();
    let (core, _sovereign, _ledger) = core_with_sovereign(dir.path());

    let entity = core
        .sovereign_ingest("spec/x.md", b"# X\nsee [Y](spec/y.md)\n".to_vec(), "test")
        .unwrap();

    assert_eq!(entity.entity.versions.len(), 1);
    assert_eq!(entity.entity.current_version, 1);
    assert_eq!(entity.edge_mark_ids.len(), 1);

    let neighbors = core.graph_neighbors("spec/x.md").await;
    assert_eq!(neighbors.outgoing.len(), 1);
    assert_eq!(neighbors.outgoing[0].kind, EdgeKind::References);
    assert_eq!(neighbors.outgoing[0].target_path, "spec/y.md");
}

/// S2 — Re-ingest with change.
#[tokio::test]
async fn s2_reingest_with_change_drops_the_stale_reference() {
    let dir = tempfile::tempdir().unwrap();
    let (core, _sovereign, _ledger) = core_with_sovereign(dir.path());

    core.sovereign_ingest("spec/x.md", b"# X\nsee [Y](spec/y.md)\n".to_vec(), "test")
        .unwrap();
    let second = core
        .sovereign_ingest("spec/x.md", b"# X v2\n".to_vec(), "test")
        .unwrap();

    assert_eq!(second.entity.current_version, 2);
    assert_eq!(second.entity.versions.len(), 2);
    assert!(second.is_new_version);

    let neighbors = core.graph_neighbors("spec/x.md").await;
    assert!(neighbors.outgoing.is_empty());
}

/// S3 — Reject forbidden code.
#[test]
fn s3_forbidden_import_is_rejected_before_invocation() {
    let source = "import subprocess\n\nclass Agent:\n    def run(self):\n        return subprocess.run(['ls'])\n";
    let result = analyze_stability(source, 1.0, &StabilityConfig::default());
    assert!(!result.is_stable);
    assert!(result.violations.iter().any(|v| v.contains("subprocess")));
}

struct Uppercase;

#[async_trait]
impl SandboxRuntime for Uppercase {
    async fn invoke(&self, _source: &str, _class_name: &str, _method_name: &str, args: &[String]) -> Result<String, RuntimeError> {
        Ok(args.first().cloned().unwrap_or_default().to_uppercase())
    }
}

/// S4 — Accept a small pure transformer.
#[tokio::test]
async fn s4_pure_transformer_runs_to_completion() {
    let source = "class Transformer:\n    def transform(self, text):\n        return text.upper()\n";
    let stability = analyze_stability(source, 1.0, &StabilityConfig::default());
    assert!(stability.is_stable);

    let result = execute_in_sandbox(
        source,
        "Transformer",
        "transform",
        &["hello".to_string()],
        &SandboxConfig::default(),
        &Uppercase,
    )
    .await;

    assert!(result.success);
    assert_eq!(result.output, Some("HELLO".to_string()));
}

struct Hangs;

#[async_trait]
impl SandboxRuntime for Hangs {
    async fn invoke(&self, _source: &str, _class_name: &str, _method_name: &str, _args: &[String]) -> Result<String, RuntimeError> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok("unreachable".to_string())
    }
}

/// S5 — Timeout an infinite loop. The stability analyzer would reject a
/// literal `while True: pass` before it ever reached a runtime, so this
/// exercises the gate a forced-accept test would: a runtime whose
/// invocation never returns, bounded by the configured timeout.
#[tokio::test]
async fn s5_a_hanging_invocation_times_out_within_the_budget() {
    let source = "class Agent:\n    def run(self):\n        return 1\n";
    let config = SandboxConfig {
        timeout: std::time::Duration::from_millis(50),
        ..SandboxConfig::default()
    };

    let started = std::time::Instant::now();
    let result = execute_in_sandbox(source, "Agent", "run", &[], &config, &Hangs).await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("timeout"));
    assert!(elapsed < config.timeout * 2);
}

/// S6 — Trust gate denies production deletion at L3.
#[test]
fn s6_trust_gate_denies_production_deletion_at_l3() {
    let ledger = Arc::new(MarkLedger::new());
    let trust = TrustGate::new(ledger.clone(), RateLimitConfig::default(), "sandbox/".to_string());
    trust.apply_escalation(umwelt::TrustLevel::L3Autonomous);

    let before = ledger.len();
    let result = trust.decide("kubectl delete deployment prod", Umwelt::new("operator"));

    assert!(result.is_err());
    assert_eq!(ledger.len(), before + 1);
}

/// S7 — Crystallize at level 0.
#[tokio::test]
async fn s7_crystallize_twelve_marks_at_level_zero() {
    let sources: Vec<CrystalSource> = (0..12)
        .map(|i| CrystalSource {
            reference: SourceRef::Mark(format!("m{i}")),
            text: format!("distinct observation number {i} about the widget subsystem"),
        })
        .collect();

    let outcome = umwelt::crystallize(
        &UnavailableProvider,
        Level::Session,
        sources,
        &CrystallizerConfig::default(),
    )
    .await;

    let crystal = outcome.crystal;
    assert_eq!(crystal.level, Level::Session);
    assert!(crystal.source_ids.len() <= 12);
    assert!(!crystal.insight.is_empty());
    assert_eq!(crystal.honesty.dropped_count, 12 - crystal.source_ids.len());
}

/// Invariant #11 at the integration level: every forbidden pattern denies
/// regardless of level, re-checked here against the public `Core` facade
/// rather than the gate's own unit tests.
#[test]
fn invariant_forbidden_actions_deny_at_every_trust_level() {
    use umwelt::TrustLevel;

    let forbidden_actions = [
        "git push --force origin main",
        "rm -rf /",
        "DROP DATABASE prod",
        "kubectl delete deployment prod",
    ];

    for level in [
        TrustLevel::L0ReadOnly,
        TrustLevel::L1Bounded,
        TrustLevel::L2Suggestion,
        TrustLevel::L3Autonomous,
    ] {
        let ledger = Arc::new(MarkLedger::new());
        let trust = TrustGate::new(ledger, RateLimitConfig::default(), "sandbox/".to_string());
        trust.apply_escalation(level);
        for action in forbidden_actions {
            let result = trust.decide(action, Umwelt::new("tester"));
            assert!(result.is_err(), "expected {action} to be denied at {level:?}");
        }
    }
}

/// Round-trip law: export then re-ingest under the same path reproduces
/// the exported bytes as the new current version.
#[test]
fn roundtrip_export_then_reingest_reproduces_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (core, _sovereign, _ledger) = core_with_sovereign(dir.path());

    core.sovereign_ingest("notes/a.md", b"hello world".to_vec(), "test")
        .unwrap();
    let (exported_bytes, _mark_id) = core.sovereign_export("notes/a.md").unwrap();

    let reingested = core
        .sovereign_ingest("notes/a.md", exported_bytes.clone(), "test")
        .unwrap();

    assert_eq!(reingested.entity.current().content_bytes, exported_bytes);
}

#[test]
fn s1_edge_check_uses_identity_source_too() {
    // sanity: IdentitySource is constructible from the public surface and
    // contributes nothing, matching the identity law tested at unit level.
    let _identity: Arc<dyn EdgeSource> = Arc::new(IdentitySource);
}
