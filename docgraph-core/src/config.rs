use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the optional config file inside a storage directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level docgraph configuration, matching `<store_dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocGraphConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub analytics: AnalyticsSection,
    #[serde(default)]
    pub preferences: PreferencesSection,
    #[serde(default)]
    pub recommendation: RecommendationSection,
}

impl DocGraphConfig {
    /// Load `config.toml` from a storage directory, falling back to defaults
    /// when the file does not exist.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("recommendation.high_success_rate", self.recommendation.high_success_rate),
            ("recommendation.low_success_rate", self.recommendation.low_success_rate),
            ("recommendation.switch_margin", self.recommendation.switch_margin),
            ("recommendation.confidence_boost_cap", self.recommendation.confidence_boost_cap),
            ("recommendation.confidence_floor", self.recommendation.confidence_floor),
            ("recommendation.switch_confidence_cap", self.recommendation.switch_confidence_cap),
            ("preferences.min_rate_margin", self.preferences.min_rate_margin),
            ("preferences.override_confidence_cap", self.preferences.override_confidence_cap),
        ];
        for (name, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.events.dedup_window_secs == 0 {
            return Err(ConfigError::Invalid("events.dedup_window_secs must be positive".into()));
        }
        if self.analytics.health_window_days == 0 || self.analytics.max_trend_windows == 0 {
            return Err(ConfigError::Invalid(
                "analytics windows must be positive".into(),
            ));
        }
        let weights = &self.analytics.health_weights;
        if weights.success_rate + weights.active_trend + weights.frequency + weights.diversity <= 0.0 {
            return Err(ConfigError::Invalid("analytics.health_weights must not all be zero".into()));
        }
        if self.resolver.audit_history_limit == 0 {
            return Err(ConfigError::Invalid("resolver.audit_history_limit must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub file_name: String,
    pub lock_file: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            file_name: "knowledge-graph.json".into(),
            lock_file: ".docgraph.lock".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    /// Retries carrying the same idempotency token within this window collapse to one edge.
    pub dedup_window_secs: u64,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            dedup_window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    /// Maximum audit entries kept per project node (oldest dropped first).
    pub audit_history_limit: usize,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            audit_history_limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSection {
    pub health_window_days: u32,
    /// Deployments per health window that count as full activity.
    pub target_deployments_per_window: u32,
    pub max_trend_windows: u32,
    /// Delta magnitude, in percentage points, beyond which a trend is not stable.
    pub trend_threshold_pct: f64,
    /// Optional deadline applied to every full-graph scan.
    pub scan_deadline_ms: Option<u64>,
    pub health_weights: HealthWeights,
}

impl Default for AnalyticsSection {
    fn default() -> Self {
        Self {
            health_window_days: 30,
            target_deployments_per_window: 30,
            max_trend_windows: 12,
            trend_threshold_pct: 5.0,
            scan_deadline_ms: None,
            health_weights: HealthWeights::default(),
        }
    }
}

/// Relative weights of the health score components, in points out of 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthWeights {
    pub success_rate: f64,
    pub active_trend: f64,
    pub frequency: f64,
    pub diversity: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            success_rate: 40.0,
            active_trend: 25.0,
            frequency: 20.0,
            diversity: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesSection {
    pub min_successful_uses: u32,
    /// Personal rate margin over the candidate required to override it.
    pub min_rate_margin: f64,
    /// Usage older than this is ignored by personal statistics (never deleted).
    pub usage_retention_days: u32,
    pub override_confidence_cap: f64,
}

impl Default for PreferencesSection {
    fn default() -> Self {
        Self {
            min_successful_uses: 3,
            min_rate_margin: 0.20,
            usage_retention_days: 365,
            override_confidence_cap: 0.90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationSection {
    pub high_success_rate: f64,
    pub low_success_rate: f64,
    pub min_boost_samples: u64,
    pub min_penalty_samples: u64,
    pub confidence_boost: f64,
    pub confidence_boost_cap: f64,
    pub confidence_penalty: f64,
    pub confidence_floor: f64,
    pub switch_margin: f64,
    pub min_switch_samples: u64,
    pub switch_confidence_bonus: f64,
    pub switch_confidence_cap: f64,
    /// Confidence lost when historical evidence could not be consulted.
    pub degraded_penalty: f64,
}

impl Default for RecommendationSection {
    fn default() -> Self {
        Self {
            high_success_rate: 0.80,
            low_success_rate: 0.50,
            min_boost_samples: 3,
            min_penalty_samples: 2,
            confidence_boost: 0.10,
            confidence_boost_cap: 0.98,
            confidence_penalty: 0.15,
            confidence_floor: 0.50,
            switch_margin: 0.20,
            min_switch_samples: 3,
            switch_confidence_bonus: 0.10,
            switch_confidence_cap: 0.95,
            degraded_penalty: 0.05,
        }
    }
}
