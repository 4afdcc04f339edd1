//! Runtime configuration.
//!
//! Root directory resolution follows the CLI's `dirs`-based platform
//! default, overridable by the `UMWELT_HOME` environment variable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sandbox::{SandboxConfig, StabilityConfig};
use crate::trust::RateLimitConfig;

/// Top-level configuration for a core instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Root directory for the sovereign store and any future persistence.
    #[serde(default = "default_home")]
    pub home: PathBuf,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            stability: StabilityConfig::default(),
            sandbox: SandboxConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a YAML file, falling back to defaults for
    /// any field the file omits.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        let config: Self = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// Resolve the sovereign store's root directory, honoring `UMWELT_HOME`.
    pub fn resolved_home(&self) -> PathBuf {
        std::env::var_os("UMWELT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.home.clone())
    }
}

fn default_home() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("umwelt")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
