//! Stability analysis and sandbox execution configuration and results.
//!
//! The risk table, thresholds, and config shape are carried over in
//! meaning from `chaosmonger/types.py`.

use std::collections::HashSet;

/// The risk table. `None` means the module isn't listed — callers decide
/// the default (`DEFAULT_IMPORT_RISK` for unknown non-whitelisted
/// modules, 0.0 for unknown whitelisted ones).
fn table_risk(module: &str) -> Option<f32> {
    match module {
        "typing" | "dataclasses" | "abc" | "enum" | "types" => Some(0.0),
        "re" | "json" | "functools" | "collections" | "itertools" | "operator" | "math" => Some(0.1),
        "datetime" => Some(0.1),
        "asyncio" | "logging" => Some(0.2),
        "hashlib" => Some(0.2),
        "pathlib" => Some(0.3),
        "requests" | "urllib" | "http" => Some(0.6),
        "threading" => Some(0.6),
        "multiprocessing" => Some(0.7),
        "os" => Some(0.7),
        "sys" | "shutil" => Some(0.8),
        "subprocess" | "socket" => Some(0.9),
        _ => None,
    }
}

pub const DEFAULT_IMPORT_RISK: f32 = 0.5;

/// Risk for a module outside the whitelist: unknown modules default to
/// `DEFAULT_IMPORT_RISK`.
pub fn import_risk(module: &str) -> f32 {
    table_risk(module).unwrap_or(DEFAULT_IMPORT_RISK)
}

/// Risk for a module already on the whitelist: unknown modules default to
/// 0.0, since whitelisting is itself the safety signal.
pub fn whitelisted_import_risk(module: &str) -> f32 {
    table_risk(module).unwrap_or(0.0)
}

/// Thresholds for the stability analyzer, scaled by a caller-supplied
/// entropy budget except where noted as absolute.
#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub max_cyclomatic_complexity: u32,
    pub max_branching_factor: u32,
    pub max_import_risk: f32,
    /// Absolute, not scaled by budget.
    pub max_nesting_depth: u32,
    /// Absolute, not scaled by budget.
    pub max_depth: u32,
    pub allowed_imports: HashSet<String>,
    /// Wins over `allowed_imports`.
    pub forbidden_imports: HashSet<String>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        let allowed = [
            "typing", "dataclasses", "abc", "enum", "re", "json", "asyncio", "functools",
            "collections", "itertools", "operator", "math", "datetime",
        ];
        let forbidden = [
            "os", "subprocess", "sys", "shutil", "socket", "requests", "urllib", "http",
            "multiprocessing",
        ];
        Self {
            max_cyclomatic_complexity: 20,
            max_branching_factor: 5,
            max_import_risk: 0.5,
            max_nesting_depth: 3,
            max_depth: 3,
            allowed_imports: allowed.iter().map(|s| s.to_string()).collect(),
            forbidden_imports: forbidden.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Quantitative stability measurements, reported regardless of outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityMetrics {
    pub cyclomatic_complexity: u32,
    pub branching_factor: u32,
    pub import_risk: f32,
    pub has_unbounded_recursion: bool,
    pub estimated_runtime: String,
    pub import_count: u32,
    pub function_count: u32,
    pub max_nesting_depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StabilityResult {
    pub is_stable: bool,
    pub metrics: StabilityMetrics,
    pub violations: Vec<String>,
}

/// Configuration for a single sandboxed invocation.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub timeout: std::time::Duration,
    pub allowed_imports: HashSet<String>,
    pub max_output_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: std::time::Duration::from_secs(30),
            allowed_imports: ["re", "json", "dataclasses", "typing", "datetime", "math"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_output_size: 1_000_000,
        }
    }
}

/// Outcome of a sandboxed invocation. `cancelled` is distinct from
/// `success=false`: a caller-initiated cancellation, not a failure.
#[derive(Debug, Clone, Default)]
pub struct SandboxResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub cancelled: bool,
}

impl SandboxResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn timeout() -> Self {
        Self::failure("timeout")
    }

    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            error: Some("cancelled".to_string()),
            ..Default::default()
        }
    }
}
