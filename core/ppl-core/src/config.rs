//! Engine configuration.
//!
//! Every field has a default; a partial JSON document overrides only the
//! keys it names.
//!
//! ```rust
//! use ppl_core::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .with_page_size(500)
//!     .with_max_groups(10_000);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{PplError, PplResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Toggles for each push-down class. Disabled classes always run locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushdownConfig {
    pub filter: bool,
    pub projection: bool,
    pub aggregation: bool,
    pub sort: bool,
    pub limit: bool,
}

impl Default for PushdownConfig {
    fn default() -> Self {
        Self {
            filter: true,
            projection: true,
            aggregation: true,
            sort: true,
            limit: true,
        }
    }
}

impl PushdownConfig {
    /// Everything executes on the coordinator.
    pub fn disabled() -> Self {
        Self {
            filter: false,
            projection: false,
            aggregation: false,
            sort: false,
            limit: false,
        }
    }
}

/// Query engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Optimizer fixed-point iteration cap
    pub max_optimizer_passes: usize,
    /// Push-down switches
    pub pushdown: PushdownConfig,
    /// Combined ceiling for aggregate states, hash tables and sort buffers
    pub memory_limit_bytes: usize,
    /// Maximum distinct group keys per aggregate
    pub max_groups: usize,
    /// Rows requested per backend page
    pub page_size: usize,
    /// Per-query deadline; `None` disables it
    pub query_timeout_ms: Option<u64>,
    /// Compiled-plan cache capacity; 0 disables caching
    pub plan_cache_size: usize,
    /// Row count for `head` / `top` without an explicit number
    pub default_head_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_optimizer_passes: 10,
            pushdown: PushdownConfig::default(),
            memory_limit_bytes: 256 * 1024 * 1024,
            max_groups: 100_000,
            page_size: 1_000,
            query_timeout_ms: Some(30_000),
            plan_cache_size: 256,
            default_head_size: 10,
        }
    }
}

impl EngineConfig {
    /// Parses a (possibly partial) JSON document.
    pub fn from_json(text: &str) -> PplResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| PplError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_optimizer_passes(mut self, passes: usize) -> Self {
        self.max_optimizer_passes = passes;
        self
    }

    pub fn with_pushdown(mut self, pushdown: PushdownConfig) -> Self {
        self.pushdown = pushdown;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_plan_cache_size(mut self, size: usize) -> Self {
        self.plan_cache_size = size;
        self
    }

    pub fn with_default_head_size(mut self, size: usize) -> Self {
        self.default_head_size = size;
        self
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Rejects settings that would make every query fail.
    pub fn validate(&self) -> PplResult<()> {
        if self.max_optimizer_passes == 0 {
            return Err(PplError::Config("max_optimizer_passes must be > 0".into()));
        }
        if self.page_size == 0 {
            return Err(PplError::Config("page_size must be > 0".into()));
        }
        if self.max_groups == 0 {
            return Err(PplError::Config("max_groups must be > 0".into()));
        }
        if self.memory_limit_bytes == 0 {
            return Err(PplError::Config("memory_limit_bytes must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_optimizer_passes, 10);
        assert_eq!(config.default_head_size, 10);
        assert_eq!(config.query_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json(r#"{"page_size": 50, "pushdown": {"sort": false}}"#).unwrap();
        assert_eq!(config.page_size, 50);
        assert!(!config.pushdown.sort);
        assert!(config.pushdown.filter);
        assert_eq!(config.max_groups, 100_000);
    }

    #[test]
    fn invalid_json_is_config_error() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"page_size": "many"}"#),
            Err(PplError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"page_size": 0}"#),
            Err(PplError::Config(_))
        ));
    }

    #[test]
    fn builder_methods() {
        let config = EngineConfig::default()
            .with_query_timeout(None)
            .with_plan_cache_size(0)
            .with_pushdown(PushdownConfig::disabled());
        assert_eq!(config.query_timeout(), None);
        assert_eq!(config.plan_cache_size, 0);
        assert!(!config.pushdown.aggregation);
    }
}
