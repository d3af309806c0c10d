//! Engine configuration, optionally read from a `tie.toml` file.
//!
//! Every field has a default, so an empty or missing file yields the stock
//! engine: breaker threshold 10 within 3000ms, faults logged once ready.

use crate::error::{EngineError, ErrorPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Applies within one window before the breaker trips.
pub const DEFAULT_APPLY_THRESHOLD: u32 = 10;
/// Breaker window in milliseconds.
pub const DEFAULT_APPLY_WINDOW_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub threshold: u32,
    pub window_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_APPLY_THRESHOLD,
            window_ms: DEFAULT_APPLY_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub breaker: BreakerConfig,
    pub error_policy: ErrorPolicy,
    /// Record changes, faults and breaker trips for later inspection.
    pub diagnostics: bool,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(content)?)
    }

    /// Read configuration from `path`. A missing file falls back to defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            log::debug!("no engine config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.breaker.threshold, 10);
        assert_eq!(config.breaker.window_ms, 3000);
        assert_eq!(config.error_policy, ErrorPolicy::WhenReady);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            error_policy = "always"
            diagnostics = true

            [breaker]
            threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.error_policy, ErrorPolicy::Always);
        assert!(config.diagnostics);
        assert_eq!(config.breaker.threshold, 3);
        assert_eq!(config.breaker.window_ms, DEFAULT_APPLY_WINDOW_MS);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let error = EngineConfig::from_toml_str("error_policy = \"sometimes\"").unwrap_err();
        assert!(matches!(error, EngineError::Config(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/tie.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
