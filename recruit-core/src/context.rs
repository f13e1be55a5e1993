//! Per-evaluation recruitment context and the battle-side provider seam.
//!
//! A [`RecruitmentContext`] is built fresh for every check and borrows
//! everything from the battle system; nothing in it is ever persisted.

use crate::types::{BattleResult, Unit, UnitId};

/// Snapshot of the battle around one attack.
#[derive(Debug, Clone, Copy)]
pub struct RecruitmentContext<'a> {
    /// Unit performing the attack.
    pub attacker: &'a Unit,
    /// Unit being attacked (a potential recruit).
    pub target: &'a Unit,
    /// Damage the attack is about to deal.
    pub damage: u32,
    /// Current battle turn (1-based).
    pub turn: u32,
    /// Units on the player's side.
    pub allied_units: &'a [Unit],
    /// Hostile units still in play.
    pub enemy_units: &'a [Unit],
    /// Units currently held in NPC state.
    pub npc_units: &'a [UnitId],
    /// Resolved attack details, when the battle system has them.
    pub battle_result: Option<BattleResult>,
}

impl<'a> RecruitmentContext<'a> {
    /// Minimal context: no damage, no surrounding units, no battle result.
    #[must_use]
    pub fn new(attacker: &'a Unit, target: &'a Unit, turn: u32) -> Self {
        Self {
            attacker,
            target,
            damage: 0,
            turn,
            allied_units: &[],
            enemy_units: &[],
            npc_units: &[],
            battle_result: None,
        }
    }

    /// Set incoming damage.
    #[must_use]
    pub fn with_damage(mut self, damage: u32) -> Self {
        self.damage = damage;
        self
    }

    /// Set the player's units.
    #[must_use]
    pub fn with_allies(mut self, allies: &'a [Unit]) -> Self {
        self.allied_units = allies;
        self
    }

    /// Set the hostile units.
    #[must_use]
    pub fn with_enemies(mut self, enemies: &'a [Unit]) -> Self {
        self.enemy_units = enemies;
        self
    }

    /// Set the NPC roll-call.
    #[must_use]
    pub fn with_npcs(mut self, npcs: &'a [UnitId]) -> Self {
        self.npc_units = npcs;
        self
    }

    /// Attach the resolved battle result.
    #[must_use]
    pub fn with_battle_result(mut self, result: BattleResult) -> Self {
        self.battle_result = Some(result);
        self
    }

    /// Whether the attack would bring the target to 0 HP.
    #[must_use]
    pub fn is_lethal(&self) -> bool {
        self.target.is_lethal(self.damage)
    }

    /// Find a living ally by id.
    #[must_use]
    pub fn living_ally(&self, id: &UnitId) -> Option<&'a Unit> {
        self.allied_units
            .iter()
            .find(|u| &u.id == id && u.is_alive())
    }

    /// Build a context from a provider, looking up both units by id.
    ///
    /// Returns `None` when either unit is unknown to the provider.
    #[must_use]
    pub fn from_provider<P: BattleContextProvider + ?Sized>(
        provider: &'a P,
        attacker: &UnitId,
        target: &UnitId,
        damage: u32,
        battle_result: Option<BattleResult>,
    ) -> Option<Self> {
        let attacker = provider.unit(attacker)?;
        let target = provider.unit(target)?;
        Some(Self {
            attacker,
            target,
            damage,
            turn: provider.current_turn(),
            allied_units: provider.allied_units(),
            enemy_units: provider.enemy_units(),
            npc_units: provider.npc_units(),
            battle_result,
        })
    }
}

/// The narrow view of the battle the engine needs to build contexts.
///
/// Implemented by the host's battlefield; the engine never reaches into the
/// battle system any other way.
pub trait BattleContextProvider {
    /// Look up any unit in play.
    fn unit(&self, id: &UnitId) -> Option<&Unit>;
    /// Units on the player's side.
    fn allied_units(&self) -> &[Unit];
    /// Hostile units.
    fn enemy_units(&self) -> &[Unit];
    /// Units currently held in NPC state.
    fn npc_units(&self) -> &[UnitId];
    /// Current battle turn.
    fn current_turn(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Faction;

    struct Field {
        allies: Vec<Unit>,
        enemies: Vec<Unit>,
    }

    impl BattleContextProvider for Field {
        fn unit(&self, id: &UnitId) -> Option<&Unit> {
            self.allies.iter().chain(self.enemies.iter()).find(|u| &u.id == id)
        }
        fn allied_units(&self) -> &[Unit] {
            &self.allies
        }
        fn enemy_units(&self) -> &[Unit] {
            &self.enemies
        }
        fn npc_units(&self) -> &[UnitId] {
            &[]
        }
        fn current_turn(&self) -> u32 {
            4
        }
    }

    #[test]
    fn provider_builds_context() {
        let field = Field {
            allies: vec![Unit::new("player-1", Faction::Player, 30)],
            enemies: vec![Unit::new("enemy-1", Faction::Enemy, 20)],
        };
        let ctx = RecruitmentContext::from_provider(
            &field,
            &"player-1".into(),
            &"enemy-1".into(),
            25,
            None,
        )
        .expect("both units exist");
        assert_eq!(ctx.turn, 4);
        assert!(ctx.is_lethal());
        assert!(ctx.living_ally(&"player-1".into()).is_some());

        assert!(
            RecruitmentContext::from_provider(&field, &"ghost".into(), &"enemy-1".into(), 1, None)
                .is_none()
        );
    }
}
