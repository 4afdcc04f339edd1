//! Safe execution pipeline for generated agent source.
//!
//! This crate has no embedded interpreter for the language the generated
//! source is written in, so the "instantiate and invoke" step is a
//! dependency-injected capability (`SandboxRuntime`), the same pattern
//! `crystal::llm::LlmProvider` uses for the LLM backend. What this module
//! owns directly is everything that doesn't require actually running the
//! code: the forbidden-pattern scan, the defense-in-depth stability
//! re-check, the timeout, and output truncation.

use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;

use super::analyzer::analyze_stability;
use super::types::{SandboxConfig, SandboxResult, StabilityConfig};

/// The single operation the sandbox depends on to actually run generated
/// source: compile it, instantiate `class_name`, and invoke `method_name`
/// with `args`, returning whatever the method produced as a string.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn invoke(&self, source: &str, class_name: &str, method_name: &str, args: &[String]) -> Result<String, RuntimeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("compilation failed: {0}")]
    CompilationFailed(String),
    #[error("class {0} not found in compiled source")]
    ClassNotFound(String),
    #[error("method {0} not found")]
    MethodNotFound(String),
    #[error("invocation failed: {0}")]
    InvocationFailed(String),
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// A runtime that always fails. There is no bundled interpreter, so this
/// is what a `GraphService`/`Core` wired up without an external runtime
/// gets by default.
pub struct UnavailableRuntime;

#[async_trait]
impl SandboxRuntime for UnavailableRuntime {
    async fn invoke(&self, _source: &str, _class_name: &str, _method_name: &str, _args: &[String]) -> Result<String, RuntimeError> {
        Err(RuntimeError::Unavailable("no sandbox runtime configured".into()))
    }
}

/// Patterns that are never permitted in sandboxed source, regardless of
/// import whitelist: dynamic evaluation, dynamic import, file I/O, and
/// namespace introspection that could be used to reach outside the
/// restricted environment.
const FORBIDDEN_PATTERNS: &[&str] = &[
    "eval(", "exec(", "compile(", "__import__", "open(", "input(", "globals(", "locals(", "vars(", "subprocess", "socket.", "os.system",
];

fn scan_forbidden_patterns(source: &str) -> Option<String> {
    FORBIDDEN_PATTERNS.iter().find(|p| source.contains(**p)).map(|p| format!("forbidden pattern: {p}"))
}

fn truncate(s: String, max: usize) -> String {
    if s.len() <= max {
        s
    } else {
        let mut truncated: String = s.chars().take(max).collect();
        truncated.push_str("...[truncated]");
        truncated
    }
}

/// Splits a dotted reference like `socket.connect` for callers that want
/// to forbid a module wholesale rather than one specific pattern.
pub fn forbidden_pattern_regex() -> Regex {
    Regex::new(r"\b(eval|exec|compile|__import__|open|input|globals|locals|vars)\s*\(").expect("static pattern is valid")
}

/// Run the full safe-execution pipeline: re-validate stability as
/// defense-in-depth, scan for forbidden patterns both before compilation
/// and as the last gate before invocation, then hand off to `runtime`
/// under a hard wall-clock timeout.
pub async fn execute_in_sandbox(
    source: &str,
    class_name: &str,
    method_name: &str,
    args: &[String],
    config: &SandboxConfig,
    runtime: &dyn SandboxRuntime,
) -> SandboxResult {
    let start = Instant::now();

    if let Some(reason) = scan_forbidden_patterns(source) {
        return SandboxResult::failure(reason);
    }

    let stability_config = StabilityConfig {
        allowed_imports: config.allowed_imports.clone(),
        ..StabilityConfig::default()
    };
    let stability = analyze_stability(source, 1.0, &stability_config);
    if !stability.is_stable {
        return SandboxResult::failure(format!("stability check failed: {}", stability.violations.join(", ")));
    }

    // Last gate before handing source to the runtime: the stability
    // analyzer's line scan can miss patterns it doesn't recognize as
    // block headers, so the forbidden-pattern scan runs again here.
    if let Some(reason) = scan_forbidden_patterns(source) {
        return SandboxResult::failure(reason);
    }

    let invocation = runtime.invoke(source, class_name, method_name, args);
    let outcome = tokio::time::timeout(config.timeout, invocation).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(output)) => SandboxResult {
            success: true,
            output: Some(truncate(output, config.max_output_size)),
            execution_time_ms: elapsed_ms,
            ..Default::default()
        },
        Ok(Err(err)) => SandboxResult {
            execution_time_ms: elapsed_ms,
            ..SandboxResult::failure(err.to_string())
        },
        Err(_) => SandboxResult {
            execution_time_ms: elapsed_ms,
            ..SandboxResult::timeout()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl SandboxRuntime for Echo {
        async fn invoke(&self, _source: &str, _class_name: &str, _method_name: &str, args: &[String]) -> Result<String, RuntimeError> {
            Ok(args.join(","))
        }
    }

    struct Hangs;

    #[async_trait]
    impl SandboxRuntime for Hangs {
        async fn invoke(&self, _source: &str, _class_name: &str, _method_name: &str, _args: &[String]) -> Result<String, RuntimeError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    fn config(timeout: std::time::Duration) -> SandboxConfig {
        SandboxConfig {
            timeout,
            ..SandboxConfig::default()
        }
    }

    #[tokio::test]
    async fn unavailable_runtime_reports_failure_not_panic() {
        let result = execute_in_sandbox(
            "class Agent:\n    def run(self):\n        return 1\n",
            "Agent",
            "run",
            &[],
            &config(std::time::Duration::from_secs(5)),
            &UnavailableRuntime,
        )
        .await;
        assert!(!result.success);
        assert!(!result.cancelled);
        assert!(result.error.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn forbidden_pattern_is_rejected_before_invocation() {
        let result = execute_in_sandbox(
            "class Agent:\n    def run(self):\n        return eval('1')\n",
            "Agent",
            "run",
            &[],
            &config(std::time::Duration::from_secs(5)),
            &Echo,
        )
        .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("forbidden"));
    }

    #[tokio::test]
    async fn unstable_source_is_rejected_before_invocation() {
        let source = "import os\n\nclass Agent:\n    def run(self):\n        return os.getcwd()\n";
        let result = execute_in_sandbox(source, "Agent", "run", &[], &config(std::time::Duration::from_secs(5)), &Echo).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("stability"));
    }

    #[tokio::test]
    async fn stable_source_runs_through_to_the_runtime() {
        let source = "class Agent:\n    def run(self):\n        return 1\n";
        let result = execute_in_sandbox(source, "Agent", "run", &["a".into(), "b".into()], &config(std::time::Duration::from_secs(5)), &Echo).await;
        assert!(result.success);
        assert_eq!(result.output, Some("a,b".to_string()));
    }

    #[tokio::test]
    async fn a_hanging_runtime_times_out() {
        let source = "class Agent:\n    def run(self):\n        return 1\n";
        let result = execute_in_sandbox(source, "Agent", "run", &[], &config(std::time::Duration::from_millis(20)), &Hangs).await;
        assert!(!result.success);
        assert!(!result.cancelled);
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }
}
