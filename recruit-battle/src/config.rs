//! Battle-side configuration: platform profiles on top of the engine's
//! `RecruitConfig`.
//!
//! Handheld targets get a smaller cache, smaller UI batches and tighter
//! frame budgets; high-end targets get the opposite.

use std::path::PathBuf;

use recruit_core::RecruitConfig;
use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::persistence::{RosterStore, RosterStoreConfig};

// ---------------------------------------------------------------------------
// Platform Profiles
// ---------------------------------------------------------------------------

/// Target platform class, auto-detected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformProfile {
    /// Two to three cores, tight memory. Small cache, small batches.
    Handheld,
    /// Typical desktop or console.
    Standard,
    /// Many cores, generous memory.
    HighEnd,
}

impl PlatformProfile {
    /// Human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Handheld => "Handheld: small condition cache, 16 ms frame budget",
            Self::Standard => "Standard: default cache and batching",
            Self::HighEnd => "High-end: large cache, wide UI batches",
        }
    }

    /// Guess the profile from the number of available cores.
    #[must_use]
    pub fn auto_detect() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);

        if cpu_count >= 12 {
            Self::HighEnd
        } else if cpu_count >= 4 {
            Self::Standard
        } else {
            Self::Handheld
        }
    }

    /// Engine configuration tuned for this profile.
    #[must_use]
    pub fn recruit_config(self) -> RecruitConfig {
        let mut config = RecruitConfig::default();
        match self {
            Self::Handheld => {
                config.cache.capacity = 128;
                config.cache.min_capacity = 16;
                config.batching.ui_batch_size = 4;
                config.recruitment.max_npcs_per_stage = 2;
                config.monitor.evaluation_interval_ticks = 15;
                let t = &mut config.monitor.thresholds;
                t.frame_impact_ms.warning = 1.0;
                t.frame_impact_ms.critical = 3.0;
                t.memory_bytes.warning = 1024.0 * 1024.0;
                t.memory_bytes.critical = 4.0 * 1024.0 * 1024.0;
            }
            Self::Standard => {
                // Defaults are tuned for Standard
            }
            Self::HighEnd => {
                config.cache.capacity = 2048;
                config.batching.ui_batch_size = 64;
                config.recruitment.max_npcs_per_stage = 5;
            }
        }
        config
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::auto_detect()
    }
}

// ---------------------------------------------------------------------------
// Battle Configuration
// ---------------------------------------------------------------------------

/// Everything the battle layer needs to start a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Platform profile the engine settings were derived from.
    #[serde(default)]
    pub profile: PlatformProfile,
    /// Engine settings.
    #[serde(default)]
    pub recruit: RecruitConfig,
    /// Roster database settings.
    #[serde(default)]
    pub roster: RosterStoreConfig,
    /// Roster database file; `None` keeps recruits in memory only.
    #[serde(default)]
    pub roster_path: Option<PathBuf>,
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub log_json: bool,
}

impl BattleConfig {
    /// Config tuned for the given profile.
    #[must_use]
    pub fn for_profile(profile: PlatformProfile) -> Self {
        Self {
            profile,
            recruit: profile.recruit_config(),
            roster: RosterStoreConfig::default(),
            roster_path: None,
            log_json: false,
        }
    }

    /// Parse a battle config from TOML. Engine settings go under `[recruit]`.
    ///
    /// # Errors
    /// Returns [`BattleError::Recruit`] with a `Config` error if the TOML is
    /// malformed or the engine settings fail validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| BattleError::Recruit(recruit_core::RecruitError::Config(e.to_string())))?;
        config.recruit.validate()?;
        Ok(config)
    }

    /// Open the roster database at `roster_path`, or an in-memory one.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn open_roster(&self) -> Result<RosterStore> {
        match &self.roster_path {
            Some(path) => RosterStore::open(path, &self.roster),
            None => RosterStore::open_in_memory(&self.roster),
        }
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self::for_profile(PlatformProfile::Standard)
    }
}
