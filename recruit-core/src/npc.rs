//! NPC lifecycle: the transitional state between conversion and stage clear.
//!
//! ```text
//!   not-NPC ──convert_to_npc──▶ NPC ──remove_npc_state──▶ not-NPC
//!                               │
//!                               └──handle_npc_damage (HP 0)──▶ removed
//! ```
//!
//! The manager owns every [`NpcState`]. Units themselves belong to the battle
//! system; every transition hands back a [`UnitPatch`] for the owner to apply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RecruitmentConfig;
use crate::error::{RecruitError, Result};
use crate::types::{Faction, RecruitmentId, TargetPriority, Unit, UnitId, UnitPatch};

/// Base attack priority of an NPC before the configured multiplier. Ordinary
/// units score [`TargetPriority::NONE`].
pub const NPC_BASE_PRIORITY: f64 = 1_000_000.0;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// How hurt an NPC looks, relative to its HP at conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualState {
    /// Above half of its HP at conversion.
    Stable,
    /// At or below half.
    Wounded,
    /// At or below a quarter.
    Critical,
}

impl VisualState {
    /// Classify `remaining` against `initial` HP.
    #[must_use]
    pub fn from_hp(remaining: u32, initial: u32) -> Self {
        if initial == 0 {
            return Self::Critical;
        }
        // Compare as remaining / initial <= 1/4 and <= 1/2 without floats.
        let r = u64::from(remaining);
        let i = u64::from(initial);
        if r * 4 <= i {
            Self::Critical
        } else if r * 2 <= i {
            Self::Wounded
        } else {
            Self::Stable
        }
    }
}

/// A unit currently held in NPC state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcState {
    /// Which unit.
    pub unit_id: UnitId,
    /// Battle turn of conversion.
    pub converted_at_turn: u32,
    /// HP left; never below zero.
    pub remaining_hp: u32,
    /// HP at conversion.
    pub initial_hp: u32,
    /// Whether the player is expected to defend it.
    pub is_protected: bool,
    /// Faction before conversion.
    pub original_faction: Faction,
    /// The conversion this state belongs to.
    pub recruitment_id: RecruitmentId,
    /// Current look.
    pub visual_state: VisualState,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// The new state (a copy; the manager keeps the original).
    pub state: NpcState,
    /// Friendly faction, turn flags spent.
    pub patch: UnitPatch,
}

/// Result of damage landing on an NPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageOutcome {
    /// State after the hit. When `defeated`, the manager no longer holds it.
    pub state: NpcState,
    /// HP reached zero.
    pub defeated: bool,
    /// HP mirror for the live unit.
    pub patch: UnitPatch,
}

/// Aggregates over live NPCs, recomputed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NpcStatistics {
    /// Live NPCs.
    pub count: usize,
    /// Of which protected.
    pub protected: usize,
    /// Mean remaining HP (0 with no NPCs).
    pub average_remaining_hp: f64,
    /// Mean turns since conversion (0 with no NPCs).
    pub average_turns_since_conversion: f64,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Stage-scoped owner of all NPC state.
#[derive(Debug, Clone)]
pub struct NpcLifecycleManager {
    npcs: HashMap<UnitId, NpcState>,
    max_npcs: usize,
    priority_multiplier: f64,
}

impl NpcLifecycleManager {
    /// Create a manager allowing at most `max_npcs` concurrent NPCs.
    #[must_use]
    pub fn new(max_npcs: usize, priority_multiplier: f64) -> Self {
        Self {
            npcs: HashMap::new(),
            max_npcs,
            priority_multiplier,
        }
    }

    /// Create from configuration.
    #[must_use]
    pub fn from_config(config: &RecruitmentConfig) -> Self {
        Self::new(config.max_npcs_per_stage, config.npc_priority_multiplier)
    }

    /// Put `unit` into NPC state.
    ///
    /// # Errors
    /// - [`RecruitError::MalformedUnit`] for an empty id, zero max HP, or a
    ///   unit already at 0 HP.
    /// - [`RecruitError::AlreadyNpc`] if it is already an NPC.
    /// - [`RecruitError::NpcCapacityExceeded`] when the cap is reached.
    ///
    /// Nothing changes on error.
    pub fn convert_to_npc(
        &mut self,
        unit: &Unit,
        recruitment_id: RecruitmentId,
        turn: u32,
    ) -> Result<ConversionOutcome> {
        unit.validate()?;
        if !unit.is_alive() {
            return Err(RecruitError::MalformedUnit {
                unit: unit.id.clone(),
                reason: "unit is already at 0 HP".to_string(),
            });
        }
        if self.npcs.contains_key(&unit.id) {
            return Err(RecruitError::AlreadyNpc(unit.id.clone()));
        }
        if self.npcs.len() >= self.max_npcs {
            return Err(RecruitError::NpcCapacityExceeded {
                limit: self.max_npcs,
                current: self.npcs.len(),
            });
        }

        let state = NpcState {
            unit_id: unit.id.clone(),
            converted_at_turn: turn,
            remaining_hp: unit.current_hp,
            initial_hp: unit.current_hp,
            is_protected: true,
            original_faction: unit.faction,
            recruitment_id,
            visual_state: VisualState::Stable,
        };
        self.npcs.insert(unit.id.clone(), state.clone());

        info!(
            unit = %unit.id,
            recruitment = %recruitment_id,
            turn,
            hp = unit.current_hp,
            npcs = self.npcs.len(),
            "Unit converted to NPC"
        );

        Ok(ConversionOutcome {
            state,
            patch: UnitPatch::new(unit.id.clone())
                .faction(Faction::FRIENDLY)
                .turn_flags(true),
        })
    }

    /// Whether `id` is in NPC state.
    #[must_use]
    pub fn is_npc(&self, id: &UnitId) -> bool {
        self.npcs.contains_key(id)
    }

    /// Attack priority for AI targeting. NPCs always outrank everyone else.
    #[must_use]
    pub fn get_npc_priority(&self, id: &UnitId) -> TargetPriority {
        if self.npcs.contains_key(id) {
            TargetPriority::new(NPC_BASE_PRIORITY * self.priority_multiplier)
        } else {
            TargetPriority::NONE
        }
    }

    /// Apply `damage` to an NPC. HP saturates at zero; reaching zero removes
    /// the NPC record.
    ///
    /// # Errors
    /// - [`RecruitError::NotNpc`] if `id` is not an NPC.
    /// - [`RecruitError::InvalidDamage`] for negative damage.
    ///
    /// Nothing changes on error.
    pub fn handle_npc_damage(&mut self, id: &UnitId, damage: i64) -> Result<DamageOutcome> {
        if damage < 0 {
            return Err(RecruitError::InvalidDamage {
                unit: id.clone(),
                damage,
            });
        }
        let state = self
            .npcs
            .get_mut(id)
            .ok_or_else(|| RecruitError::NotNpc(id.clone()))?;

        let damage = u32::try_from(damage).unwrap_or(u32::MAX);
        state.remaining_hp = state.remaining_hp.saturating_sub(damage);
        state.visual_state = VisualState::from_hp(state.remaining_hp, state.initial_hp);
        let snapshot = state.clone();
        let patch = UnitPatch::new(id.clone()).hp(snapshot.remaining_hp);

        let defeated = snapshot.remaining_hp == 0;
        if defeated {
            self.npcs.remove(id);
            info!(unit = %id, damage, "NPC defeated");
        } else {
            debug!(
                unit = %id,
                damage,
                remaining = snapshot.remaining_hp,
                visual = ?snapshot.visual_state,
                "NPC damaged"
            );
        }

        Ok(DamageOutcome {
            state: snapshot,
            defeated,
            patch,
        })
    }

    /// Drop the NPC record for `id`, returning it if there was one.
    pub fn remove_npc_state(&mut self, id: &UnitId) -> Option<NpcState> {
        let removed = self.npcs.remove(id);
        if removed.is_some() {
            debug!(unit = %id, "NPC state removed");
        }
        removed
    }

    /// State of one NPC.
    #[must_use]
    pub fn get(&self, id: &UnitId) -> Option<&NpcState> {
        self.npcs.get(id)
    }

    /// Ids of all NPCs, sorted.
    #[must_use]
    pub fn npc_ids(&self) -> Vec<UnitId> {
        let mut ids: Vec<UnitId> = self.npcs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live NPCs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    /// Whether there are no NPCs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }

    /// Configured cap.
    #[must_use]
    pub fn max_npcs(&self) -> usize {
        self.max_npcs
    }

    /// Aggregates over live NPCs as of `current_turn`.
    #[must_use]
    pub fn statistics(&self, current_turn: u32) -> NpcStatistics {
        let count = self.npcs.len();
        if count == 0 {
            return NpcStatistics::default();
        }
        let protected = self.npcs.values().filter(|s| s.is_protected).count();
        let hp: f64 = self.npcs.values().map(|s| f64::from(s.remaining_hp)).sum();
        let turns: f64 = self
            .npcs
            .values()
            .map(|s| f64::from(current_turn.saturating_sub(s.converted_at_turn)))
            .sum();
        NpcStatistics {
            count,
            protected,
            average_remaining_hp: hp / count as f64,
            average_turns_since_conversion: turns / count as f64,
        }
    }

    /// Drop every NPC record (stage unload).
    pub fn clear(&mut self) {
        self.npcs.clear();
    }
}
