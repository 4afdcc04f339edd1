//! JIT sandbox: stability analysis followed by safe, timeout-bounded
//! execution of generated agent source through an injected runtime.

mod analyzer;
mod executor;
mod types;

pub use analyzer::analyze_stability;
pub use executor::{execute_in_sandbox, forbidden_pattern_regex, RuntimeError, SandboxRuntime, UnavailableRuntime};
pub use types::{SandboxConfig, SandboxResult, StabilityConfig, StabilityMetrics, StabilityResult, DEFAULT_IMPORT_RISK};
