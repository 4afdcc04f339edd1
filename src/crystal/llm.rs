//! LLM provider capability interface: a narrow `#[async_trait]`
//! interface, dependency-injected at construction, with no assumption
//! about the concrete backend.

use async_trait::async_trait;

/// The single operation the crystallizer depends on.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider timed out")]
    Timeout,
    #[error("provider returned malformed output: {0}")]
    Malformed(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// A provider that always fails, forcing the fallback path — useful for
/// tests that exercise the LLM-free template extractor.
pub struct UnavailableProvider;

#[async_trait]
impl LlmProvider for UnavailableProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Unavailable("no provider configured".into()))
    }
}

/// A provider that echoes back a fixed, well-formed JSON crystal payload —
/// useful for tests that exercise the happy path without a live LLM.
pub struct FixedProvider {
    pub response: String,
}

#[async_trait]
impl LlmProvider for FixedProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(self.response.clone())
    }
}
