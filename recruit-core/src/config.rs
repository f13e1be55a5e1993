//! Configuration for the recruitment engine.
//!
//! Maps directly to `recruit.toml`. Every field has a default, so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::{RecruitError, Result};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecruitConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Recruitment rules.
    #[serde(default)]
    pub recruitment: RecruitmentConfig,
    /// Condition-result cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// UI indicator batching.
    #[serde(default)]
    pub batching: BatchingConfig,
    /// Performance monitor.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl RecruitConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `RecruitError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| RecruitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns `RecruitError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let r = &self.recruitment;
        if !(r.npc_priority_multiplier.is_finite() && r.npc_priority_multiplier > 0.0) {
            return Err(RecruitError::Config(format!(
                "recruitment.npc_priority_multiplier must be positive, got {}",
                r.npc_priority_multiplier
            )));
        }
        let c = &self.cache;
        if c.capacity == 0 || c.min_capacity == 0 || c.min_capacity > c.capacity {
            return Err(RecruitError::Config(format!(
                "cache capacities invalid (capacity {}, min_capacity {})",
                c.capacity, c.min_capacity
            )));
        }
        if !(c.shrink_factor > 0.0 && c.shrink_factor < 1.0) {
            return Err(RecruitError::Config(format!(
                "cache.shrink_factor must be in (0, 1), got {}",
                c.shrink_factor
            )));
        }
        let b = &self.batching;
        if b.min_batch_size == 0 || b.min_batch_size > b.ui_batch_size {
            return Err(RecruitError::Config(format!(
                "batching sizes invalid (ui_batch_size {}, min_batch_size {})",
                b.ui_batch_size, b.min_batch_size
            )));
        }
        let m = &self.monitor;
        if m.window_size == 0 || m.evaluation_interval_ticks == 0 {
            return Err(RecruitError::Config(
                "monitor.window_size and monitor.evaluation_interval_ticks must be non-zero"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether recruitment is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
        }
    }
}

/// Recruitment rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecruitmentConfig {
    /// Maximum units held in NPC state at once per stage.
    #[serde(default = "default_3")]
    pub max_npcs_per_stage: usize,
    /// Scales the NPC attack priority handed to AI targeting.
    #[serde(default = "default_1_0")]
    pub npc_priority_multiplier: f64,
    /// Hold events until the next tick instead of delivering immediately.
    #[serde(default)]
    pub defer_notifications: bool,
}

impl Default for RecruitmentConfig {
    fn default() -> Self {
        Self {
            max_npcs_per_stage: 3,
            npc_priority_multiplier: 1.0,
            defer_notifications: false,
        }
    }
}

/// Condition-result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether results are cached at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum cached results.
    #[serde(default = "default_512")]
    pub capacity: usize,
    /// Floor the monitor will never shrink below.
    #[serde(default = "default_32")]
    pub min_capacity: usize,
    /// Multiplier applied on each shrink action.
    #[serde(default = "default_0_5")]
    pub shrink_factor: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 512,
            min_capacity: 32,
            shrink_factor: 0.5,
        }
    }
}

/// Batching of UI indicator refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Recruitable units refreshed per call.
    #[serde(default = "default_16")]
    pub ui_batch_size: usize,
    /// Floor the monitor will never reduce below.
    #[serde(default = "default_2")]
    pub min_batch_size: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            ui_batch_size: 16,
            min_batch_size: 2,
        }
    }
}

/// Performance monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Whether sampling happens at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether corrective actions run automatically.
    #[serde(default = "default_true")]
    pub auto_optimize: bool,
    /// Samples retained per metric.
    #[serde(default = "default_60")]
    pub window_size: usize,
    /// Ticks between evaluations.
    #[serde(default = "default_30")]
    pub evaluation_interval_ticks: u64,
    /// Corrective actions executed per evaluation.
    #[serde(default = "default_2")]
    pub max_actions_per_tick: usize,
    /// Alerts retained in history.
    #[serde(default = "default_64")]
    pub alert_history: usize,
    /// Alert thresholds.
    #[serde(default)]
    pub thresholds: MonitorThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_optimize: true,
            window_size: 60,
            evaluation_interval_ticks: 30,
            max_actions_per_tick: 2,
            alert_history: 64,
            thresholds: MonitorThresholds::default(),
        }
    }
}

/// Warning / critical pair for one metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Threshold {
    /// Average at or above which a warning is raised.
    pub warning: f64,
    /// Average at or above which a critical alert is raised.
    pub critical: f64,
}

/// Per-metric alert thresholds. Times are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// Eligibility check (all conditions of one target).
    #[serde(default = "default_condition_check")]
    pub condition_check_ms: Threshold,
    /// Conversion to NPC.
    #[serde(default = "default_conversion")]
    pub npc_conversion_ms: Threshold,
    /// One UI indicator refresh batch.
    #[serde(default = "default_ui_update")]
    pub ui_update_ms: Threshold,
    /// Recruitment work per frame.
    #[serde(default = "default_frame_impact")]
    pub frame_impact_ms: Threshold,
    /// Estimated engine memory.
    #[serde(default = "default_memory")]
    pub memory_bytes: Threshold,
    /// Cache hit ratio below which an info alert is raised.
    #[serde(default = "default_0_5")]
    pub min_cache_hit_ratio: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            condition_check_ms: default_condition_check(),
            npc_conversion_ms: default_conversion(),
            ui_update_ms: default_ui_update(),
            frame_impact_ms: default_frame_impact(),
            memory_bytes: default_memory(),
            min_cache_hit_ratio: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_0_5() -> f64 { 0.5 }
fn default_1_0() -> f64 { 1.0 }
fn default_2() -> usize { 2 }
fn default_3() -> usize { 3 }
fn default_16() -> usize { 16 }
fn default_30() -> u64 { 30 }
fn default_32() -> usize { 32 }
fn default_60() -> usize { 60 }
fn default_64() -> usize { 64 }
fn default_512() -> usize { 512 }
fn default_condition_check() -> Threshold { Threshold { warning: 1.0, critical: 5.0 } }
fn default_conversion() -> Threshold { Threshold { warning: 2.0, critical: 8.0 } }
fn default_ui_update() -> Threshold { Threshold { warning: 4.0, critical: 12.0 } }
fn default_frame_impact() -> Threshold { Threshold { warning: 2.0, critical: 6.0 } }
fn default_memory() -> Threshold { Threshold { warning: 4.0 * 1024.0 * 1024.0, critical: 16.0 * 1024.0 * 1024.0 } }
