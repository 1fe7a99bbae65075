//! Layered configuration for the routing core.
//!
//! Every tunable named by the components (signal weights, category and
//! conflict thresholds, retry tuples, breaker parameters, cooldown
//! intervals, lease TTL, pool size, escalation thresholds) lives in a
//! component-owned struct with reference defaults. [`DispatchConfig`]
//! aggregates them and loads from an optional TOML file with
//! `DISPATCHIO_`-prefixed environment overrides layered on top.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierConfig;
use crate::conflict::ConflictConfig;
use crate::error::{DispatchError, Result};
use crate::escalate::EscalationConfig;
use crate::lifecycle::LifecycleConfig;
use crate::pool::PoolConfig;
use crate::resilience::ResilienceConfig;

/// Environment variable prefix for overrides, e.g.
/// `DISPATCHIO_POOL__SLOTS=5`.
pub const ENV_PREFIX: &str = "DISPATCHIO";

/// The full configuration surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Complexity signal weights and category thresholds.
    pub classifier: ClassifierConfig,
    /// Conflict metric weights and strategy thresholds.
    pub conflict: ConflictConfig,
    /// Retry, breaker, and cooldown parameters.
    pub resilience: ResilienceConfig,
    /// Escalation trigger thresholds.
    pub escalation: EscalationConfig,
    /// Lifecycle timing and lease TTL.
    pub lifecycle: LifecycleConfig,
    /// Execution slot pool sizing.
    pub pool: PoolConfig,
}

impl DispatchConfig {
    /// Load configuration: defaults, then the TOML file if given, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|err| DispatchError::Fatal(format!("configuration error: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.classifier.simple_max, 10);
        assert_eq!(config.classifier.uncertain_max, 25);
        assert_eq!(config.conflict.simple_max, 8);
        assert_eq!(config.conflict.moderate_max, 14);
        assert_eq!(config.resilience.tracker_breaker.failure_threshold, 5);
        assert_eq!(config.escalation.max_files_touched, 5);
        assert_eq!(config.pool.slots, 3);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DispatchConfig::load(None).unwrap();
        assert_eq!(config.pool.slots, PoolConfig::default().slots);
    }

    #[test]
    fn test_toml_file_overrides_thresholds() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[classifier]\nsimple_max = 5\nuncertain_max = 20\n\n[pool]\nslots = 7"
        )
        .unwrap();
        let config = DispatchConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.classifier.simple_max, 5);
        assert_eq!(config.classifier.uncertain_max, 20);
        assert_eq!(config.pool.slots, 7);
        // Untouched sections keep their defaults.
        assert_eq!(config.conflict.simple_max, 8);
    }

    #[test]
    fn test_full_config_round_trips_through_toml() {
        let rendered = toml::to_string(&DispatchConfig::default()).unwrap();
        let parsed: DispatchConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.classifier.simple_max, 10);
        assert_eq!(parsed.resilience.retry.write.max_attempts, 3);
        assert_eq!(
            parsed.lifecycle.lease_ttl,
            DispatchConfig::default().lifecycle.lease_ttl
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = DispatchConfig::load(Some(Path::new("/nonexistent/dispatchio.toml")));
        assert!(matches!(result, Err(DispatchError::Fatal(_))));
    }
}
