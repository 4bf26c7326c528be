//! Engine settings - reconciliation policy, divergence weights and monitor cadence
//!
//! Settings are read from the environment (see [`EngineSettings::from_env`]).
//! Every field has a default, so a missing or malformed variable never stops
//! the engine; it logs a warning and keeps the default instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const ENV_SYNC_POLICY: &str = "PLOTGRAPH_SYNC_POLICY";
pub const ENV_AUTO_SYNC_THRESHOLD: &str = "PLOTGRAPH_AUTO_SYNC_THRESHOLD";
pub const ENV_MONITOR_INTERVAL_SECS: &str = "PLOTGRAPH_MONITOR_INTERVAL_SECS";
pub const ENV_DIVERGENCE_WEIGHTS: &str = "PLOTGRAPH_DIVERGENCE_WEIGHTS";

// ============================================================================
// Sync Policy
// ============================================================================

/// How the mirror reconciler resolves an entity modified on both sides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Record a conflict and apply nothing.
    #[default]
    Manual,
    /// Overwrite the target with the source version.
    PreferSource,
    /// Keep the target version.
    PreferTarget,
    /// Keep whichever side was modified last; ties keep the target.
    NewestWins,
}

impl std::fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPolicy::Manual => write!(f, "manual"),
            SyncPolicy::PreferSource => write!(f, "prefer_source"),
            SyncPolicy::PreferTarget => write!(f, "prefer_target"),
            SyncPolicy::NewestWins => write!(f, "newest_wins"),
        }
    }
}

impl std::str::FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "manual" => Ok(SyncPolicy::Manual),
            "prefer_source" | "source" => Ok(SyncPolicy::PreferSource),
            "prefer_target" | "target" => Ok(SyncPolicy::PreferTarget),
            "newest_wins" | "newest" => Ok(SyncPolicy::NewestWins),
            other => Err(format!("Unknown sync policy: {}", other)),
        }
    }
}

// ============================================================================
// Divergence Weights
// ============================================================================

/// Additive weights per difference class.
///
/// Modified-entity weights scale linearly with the number of differing fields,
/// from `*_min` for one field up to `*_max`, then stay at `*_max`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DivergenceWeights {
    pub scene_added_removed: f64,
    pub scene_modified_min: f64,
    pub scene_modified_max: f64,
    pub arc_added_removed: f64,
    pub arc_modified_min: f64,
    pub arc_modified_max: f64,
    pub character_added_removed: f64,
    pub character_modified_min: f64,
    pub character_modified_max: f64,
    /// Saturation point of the summed score
    pub cap: f64,
}

impl Default for DivergenceWeights {
    fn default() -> Self {
        Self {
            scene_added_removed: 5.0,
            scene_modified_min: 1.0,
            scene_modified_max: 3.0,
            arc_added_removed: 5.0,
            arc_modified_min: 3.0,
            arc_modified_max: 5.0,
            character_added_removed: 4.0,
            character_modified_min: 1.0,
            character_modified_max: 2.0,
            cap: 100.0,
        }
    }
}

impl DivergenceWeights {
    /// Weight of a modification touching `fields` fields.
    pub fn scaled(min: f64, max: f64, fields: usize) -> f64 {
        if fields == 0 {
            return 0.0;
        }
        (min + (fields - 1) as f64).min(max)
    }

    /// All weights must be strictly positive so that a zero score means no
    /// differences at all.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            ("sceneAddedRemoved", self.scene_added_removed),
            ("sceneModifiedMin", self.scene_modified_min),
            ("sceneModifiedMax", self.scene_modified_max),
            ("arcAddedRemoved", self.arc_added_removed),
            ("arcModifiedMin", self.arc_modified_min),
            ("arcModifiedMax", self.arc_modified_max),
            ("characterAddedRemoved", self.character_added_removed),
            ("characterModifiedMin", self.character_modified_min),
            ("characterModifiedMax", self.character_modified_max),
            ("cap", self.cap),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be a positive number, got {}", name, value));
            }
        }
        let ranges = [
            ("scene", self.scene_modified_min, self.scene_modified_max),
            ("arc", self.arc_modified_min, self.arc_modified_max),
            ("character", self.character_modified_min, self.character_modified_max),
        ];
        for (name, min, max) in ranges {
            if min > max {
                return Err(format!(
                    "{} modified weight range is inverted: min {} > max {}",
                    name, min, max
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Engine Settings
// ============================================================================

fn default_auto_sync_threshold() -> f64 {
    25.0
}

fn default_monitor_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    #[serde(default)]
    pub sync_policy: SyncPolicy,

    /// Auto-sync runs only while divergence stays below this score
    #[serde(default = "default_auto_sync_threshold")]
    pub auto_sync_threshold: f64,

    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    #[serde(default)]
    pub divergence: DivergenceWeights,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sync_policy: SyncPolicy::default(),
            auto_sync_threshold: default_auto_sync_threshold(),
            monitor_interval_secs: default_monitor_interval_secs(),
            divergence: DivergenceWeights::default(),
        }
    }
}

impl EngineSettings {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn with_auto_sync_threshold(mut self, threshold: f64) -> Self {
        self.auto_sync_threshold = threshold;
        self
    }

    /// Build settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (environment in production,
    /// a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(raw) = lookup(ENV_SYNC_POLICY) {
            match raw.parse::<SyncPolicy>() {
                Ok(policy) => settings.sync_policy = policy,
                Err(e) => tracing::warn!(
                    key = ENV_SYNC_POLICY,
                    error = %e,
                    "Ignoring invalid setting, using {}",
                    settings.sync_policy
                ),
            }
        }

        if let Some(raw) = lookup(ENV_AUTO_SYNC_THRESHOLD) {
            match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => {
                    settings.auto_sync_threshold = value
                }
                _ => tracing::warn!(
                    key = ENV_AUTO_SYNC_THRESHOLD,
                    value = %raw,
                    "Ignoring invalid setting, using {}",
                    settings.auto_sync_threshold
                ),
            }
        }

        if let Some(raw) = lookup(ENV_MONITOR_INTERVAL_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => settings.monitor_interval_secs = value,
                _ => tracing::warn!(
                    key = ENV_MONITOR_INTERVAL_SECS,
                    value = %raw,
                    "Ignoring invalid setting, using {}",
                    settings.monitor_interval_secs
                ),
            }
        }

        if let Some(raw) = lookup(ENV_DIVERGENCE_WEIGHTS) {
            let parsed = serde_json::from_str::<DivergenceWeights>(&raw)
                .map_err(|e| e.to_string())
                .and_then(|w| w.validate().map(|_| w));
            match parsed {
                Ok(weights) => settings.divergence = weights,
                Err(e) => tracing::warn!(
                    key = ENV_DIVERGENCE_WEIGHTS,
                    error = %e,
                    "Ignoring invalid divergence weights, using defaults"
                ),
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_weighting() {
        let settings = EngineSettings::default();
        assert_eq!(settings.sync_policy, SyncPolicy::Manual);
        assert_eq!(settings.divergence.scene_added_removed, 5.0);
        assert_eq!(settings.divergence.character_added_removed, 4.0);
        assert_eq!(settings.divergence.cap, 100.0);
        assert!(settings.divergence.validate().is_ok());
    }

    #[test]
    fn reads_values_from_lookup() {
        let settings = EngineSettings::from_lookup(lookup_from(&[
            (ENV_SYNC_POLICY, "newest-wins"),
            (ENV_AUTO_SYNC_THRESHOLD, "12.5"),
            (ENV_MONITOR_INTERVAL_SECS, "5"),
            (ENV_DIVERGENCE_WEIGHTS, r#"{"sceneAddedRemoved": 8.0}"#),
        ]));
        assert_eq!(settings.sync_policy, SyncPolicy::NewestWins);
        assert_eq!(settings.auto_sync_threshold, 12.5);
        assert_eq!(settings.monitor_interval(), Duration::from_secs(5));
        assert_eq!(settings.divergence.scene_added_removed, 8.0);
        assert_eq!(settings.divergence.arc_added_removed, 5.0);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let settings = EngineSettings::from_lookup(lookup_from(&[
            (ENV_SYNC_POLICY, "whatever"),
            (ENV_AUTO_SYNC_THRESHOLD, "-3"),
            (ENV_MONITOR_INTERVAL_SECS, "0"),
            (ENV_DIVERGENCE_WEIGHTS, r#"{"cap": 0}"#),
        ]));
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn scaled_weight_saturates() {
        assert_eq!(DivergenceWeights::scaled(1.0, 3.0, 0), 0.0);
        assert_eq!(DivergenceWeights::scaled(1.0, 3.0, 1), 1.0);
        assert_eq!(DivergenceWeights::scaled(1.0, 3.0, 2), 2.0);
        assert_eq!(DivergenceWeights::scaled(1.0, 3.0, 7), 3.0);
        assert_eq!(DivergenceWeights::scaled(3.0, 5.0, 4), 5.0);
    }

    #[test]
    fn sync_policy_round_trips_display() {
        for policy in [
            SyncPolicy::Manual,
            SyncPolicy::PreferSource,
            SyncPolicy::PreferTarget,
            SyncPolicy::NewestWins,
        ] {
            assert_eq!(policy.to_string().parse::<SyncPolicy>(), Ok(policy));
        }
    }
}
