//! Battlefield snapshot: the units in play and the turn counter.
//!
//! The battlefield is the single owner of live [`Unit`] values. The engine
//! only ever sees it through [`BattleContextProvider`] and hands back
//! [`UnitPatch`]es, which are applied here.

use recruit_core::stage::StageData;
use recruit_core::{BattleContextProvider, Faction, Unit, UnitId, UnitPatch};
use tracing::{debug, trace};

use crate::error::{BattleError, Result};

/// All units in play, split by side.
#[derive(Debug, Clone, Default)]
pub struct Battlefield {
    allies: Vec<Unit>,
    enemies: Vec<Unit>,
    npcs: Vec<UnitId>,
    turn: u32,
}

impl Battlefield {
    /// An empty battlefield on turn 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            turn: 1,
            ..Self::default()
        }
    }

    /// Deploy every unit listed in `stage`.
    #[must_use]
    pub fn from_stage(stage: &StageData) -> Self {
        let mut field = Self::new();
        for entry in &stage.units {
            field.deploy(entry.unit.clone());
        }
        debug!(
            stage = %stage.stage_id,
            allies = field.allies.len(),
            enemies = field.enemies.len(),
            "Battlefield deployed"
        );
        field
    }

    /// Add a unit to its faction's side.
    pub fn deploy(&mut self, unit: Unit) {
        if unit.faction.is_friendly() {
            self.allies.push(unit);
        } else {
            self.enemies.push(unit);
        }
    }

    /// Apply a patch from the engine, moving the unit between sides if its
    /// faction changed.
    ///
    /// # Errors
    /// Returns [`BattleError::UnitNotFound`] if the unit is not in play.
    pub fn apply_patch(&mut self, patch: &UnitPatch) -> Result<()> {
        let unit = self
            .unit_mut(&patch.unit_id)
            .ok_or_else(|| BattleError::UnitNotFound(patch.unit_id.clone()))?;
        let before = unit.faction;
        patch.apply(unit);
        let after = unit.faction;
        trace!(unit = %patch.unit_id, ?patch, "Patch applied");

        if before.is_friendly() != after.is_friendly() {
            self.rebucket(&patch.unit_id);
        }
        Ok(())
    }

    /// Subtract `damage` from a unit's HP, saturating at zero. Returns the
    /// HP left.
    ///
    /// # Errors
    /// Returns [`BattleError::UnitNotFound`] if the unit is not in play.
    pub fn apply_damage(&mut self, id: &UnitId, damage: u32) -> Result<u32> {
        let unit = self
            .unit_mut(id)
            .ok_or_else(|| BattleError::UnitNotFound(id.clone()))?;
        unit.current_hp = unit.current_hp.saturating_sub(damage);
        Ok(unit.current_hp)
    }

    /// Record whether `id` is held in NPC state.
    pub fn set_npc(&mut self, id: &UnitId, npc: bool) {
        let present = self.npcs.contains(id);
        if npc && !present {
            self.npcs.push(id.clone());
        } else if !npc && present {
            self.npcs.retain(|n| n != id);
        }
    }

    /// Whether `id` is marked as an NPC.
    #[must_use]
    pub fn is_npc(&self, id: &UnitId) -> bool {
        self.npcs.contains(id)
    }

    /// Move to the next turn. Clears every unit's turn flags except NPCs',
    /// which stay spent.
    pub fn advance_turn(&mut self) -> u32 {
        self.turn += 1;
        let npcs = &self.npcs;
        for unit in self.allies.iter_mut().chain(self.enemies.iter_mut()) {
            if !npcs.contains(&unit.id) {
                unit.has_acted = false;
                unit.has_moved = false;
            }
        }
        self.turn
    }

    /// Every unit in play, allies first.
    #[must_use]
    pub fn units_in_play(&self) -> Vec<Unit> {
        self.allies.iter().chain(self.enemies.iter()).cloned().collect()
    }

    /// Whether every hostile unit is down.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.enemies
            .iter()
            .filter(|u| u.faction == Faction::Enemy)
            .all(|u| !u.is_alive())
    }

    fn unit_mut(&mut self, id: &UnitId) -> Option<&mut Unit> {
        self.allies
            .iter_mut()
            .chain(self.enemies.iter_mut())
            .find(|u| &u.id == id)
    }

    fn rebucket(&mut self, id: &UnitId) {
        if let Some(pos) = self.allies.iter().position(|u| &u.id == id) {
            let unit = self.allies.remove(pos);
            self.enemies.push(unit);
        } else if let Some(pos) = self.enemies.iter().position(|u| &u.id == id) {
            let unit = self.enemies.remove(pos);
            self.allies.push(unit);
        }
    }
}

impl BattleContextProvider for Battlefield {
    fn unit(&self, id: &UnitId) -> Option<&Unit> {
        self.allies
            .iter()
            .chain(self.enemies.iter())
            .find(|u| &u.id == id)
    }

    fn allied_units(&self) -> &[Unit] {
        &self.allies
    }

    fn enemy_units(&self) -> &[Unit] {
        &self.enemies
    }

    fn npc_units(&self) -> &[UnitId] {
        &self.npcs
    }

    fn current_turn(&self) -> u32 {
        self.turn
    }
}
