//! Integration hooks for a tactics battle loop.
//!
//! Each hook takes the battle event as the battle system reports it, routes
//! it through the [`RecruitmentOrchestrator`], and applies the resulting
//! patches to the [`Battlefield`]. Recruitment problems never abort the
//! attack: the hit resolves normally and the problem is reported alongside.

use recruit_core::npc::DamageOutcome;
use recruit_core::orchestrator::StageCompletion;
use recruit_core::monitor::TickReport;
use recruit_core::{
    BattleContextProvider, BattleResult, ErrorKind, NpcState, RecruitError,
    RecruitmentContext, RecruitmentOrchestrator, UnitId,
};
use tracing::{debug, info, warn};

use crate::battlefield::Battlefield;
use crate::error::{BattleError, Result};
use crate::persistence::RosterStore;

/// A resolved attack as reported by the battle system.
#[derive(Debug, Clone, Copy)]
pub struct AttackReport<'a> {
    /// Attacking unit.
    pub attacker: &'a UnitId,
    /// Defending unit.
    pub target: &'a UnitId,
    /// Damage about to be dealt.
    pub damage: u32,
    /// Element, weapon and critical flag of the hit.
    pub result: Option<BattleResult>,
}

/// What happened to the defender.
#[derive(Debug, Clone, PartialEq)]
pub enum AttackResolution {
    /// The hit would have been lethal and every condition held: the target
    /// is now an NPC and took no damage.
    Converted(NpcState),
    /// The hit landed on an NPC.
    NpcHit(DamageOutcome),
    /// Ordinary damage.
    Damaged {
        /// HP left.
        remaining_hp: u32,
        /// Why recruitment did not trigger, when the target was recruitable.
        recruitment: Option<ErrorKind>,
    },
}

/// Route a resolved attack.
///
/// # Errors
/// Returns [`BattleError::UnitNotFound`] if either unit is not on the field.
/// Engine errors are folded into [`AttackResolution::Damaged`].
pub fn on_attack_resolved(
    orch: &mut RecruitmentOrchestrator,
    field: &mut Battlefield,
    attack: &AttackReport<'_>,
) -> Result<AttackResolution> {
    if orch.is_npc(attack.target) {
        let outcome = on_npc_hit(orch, field, attack.target, i64::from(attack.damage))?;
        return Ok(AttackResolution::NpcHit(outcome));
    }

    let recruitment = if orch.definition(attack.target).is_some() {
        let provider: &Battlefield = field;
        let ctx = RecruitmentContext::from_provider(
            provider,
            attack.attacker,
            attack.target,
            attack.damage,
            attack.result,
        )
        .ok_or_else(|| missing(provider, attack))?;

        match orch.process_attempt(&ctx) {
            Ok(outcome) => match (outcome.patch, outcome.npc_state) {
                (Some(patch), Some(state)) => {
                    field.apply_patch(&patch)?;
                    field.set_npc(attack.target, true);
                    return Ok(AttackResolution::Converted(state));
                }
                _ => None,
            },
            Err(e) => Some(report(&e)),
        }
    } else {
        None
    };

    let remaining_hp = field.apply_damage(attack.target, attack.damage)?;
    Ok(AttackResolution::Damaged {
        remaining_hp,
        recruitment,
    })
}

/// Route a hit on an NPC and mirror its HP onto the battlefield.
///
/// # Errors
/// Engine errors (`NotNpc`, `InvalidDamage`) and unknown units.
pub fn on_npc_hit(
    orch: &mut RecruitmentOrchestrator,
    field: &mut Battlefield,
    id: &UnitId,
    damage: i64,
) -> Result<DamageOutcome> {
    let outcome = orch.handle_npc_damage(id, damage)?;
    field.apply_patch(&outcome.patch)?;
    if outcome.defeated {
        field.set_npc(id, false);
    }
    Ok(outcome)
}

/// End-of-turn housekeeping: advance the turn counter and tick the engine.
pub fn on_turn_end(orch: &mut RecruitmentOrchestrator, field: &mut Battlefield) -> TickReport {
    let turn = field.advance_turn();
    let report = orch.tick();
    debug!(turn, alerts = report.alerts.len(), "Turn ended");
    report
}

/// Finalize recruitment at stage clear, apply the join patches and persist
/// new recruits when a store is given.
///
/// # Errors
/// Engine invariant failures and persistence errors.
pub fn on_stage_clear(
    orch: &mut RecruitmentOrchestrator,
    field: &mut Battlefield,
    store: Option<&mut RosterStore>,
) -> Result<StageCompletion> {
    let completion = orch.complete_recruitment(&field.units_in_play())?;
    for patch in &completion.patches {
        field.apply_patch(patch)?;
        field.set_npc(&patch.unit_id, false);
    }
    for failure in &completion.failed {
        field.set_npc(&failure.character_id, false);
    }

    if let Some(store) = store {
        let saved = store.save_all(&completion.recruited)?;
        info!(stage = %completion.stage_id, saved, "Recruits persisted");
    }
    Ok(completion)
}

fn report(e: &RecruitError) -> ErrorKind {
    match e.kind() {
        ErrorKind::ConditionsNotMet => debug!(error = %e, "Recruitment not triggered"),
        kind => warn!(error = %e, %kind, "Recruitment attempt rejected"),
    }
    e.kind()
}

fn missing(field: &Battlefield, attack: &AttackReport<'_>) -> BattleError {
    let id = if field.unit(attack.attacker).is_none() {
        attack.attacker
    } else {
        attack.target
    };
    BattleError::UnitNotFound(id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recruit_core::condition::RawCondition;
    use recruit_core::stage::{RecruitmentBlock, StageData};
    use recruit_core::{Faction, RecruitConfig, RecruitmentStatus, Unit};
    use serde_json::json;

    fn setup() -> (RecruitmentOrchestrator, Battlefield) {
        let stage = StageData::new("hooks")
            .with_unit(Unit::new("player-1", Faction::Player, 30))
            .with_unit(Unit::new("player-2", Faction::Player, 30))
            .with_recruitable(
                Unit::new("enemy-1", Faction::Enemy, 40),
                RecruitmentBlock {
                    conditions: vec![RawCondition {
                        id: "hero".into(),
                        kind: "SPECIFIC_ATTACKER".into(),
                        description: String::new(),
                        parameters: json!({"attackerId": "player-1"}),
                    }],
                    ..RecruitmentBlock::default()
                },
            )
            .with_unit(Unit::new("enemy-2", Faction::Enemy, 40));
        let mut orch = RecruitmentOrchestrator::new(RecruitConfig::default()).expect("config");
        orch.initialize(&stage);
        (orch, Battlefield::from_stage(&stage))
    }

    fn attack<'a>(attacker: &'a UnitId, target: &'a UnitId, damage: u32) -> AttackReport<'a> {
        AttackReport {
            attacker,
            target,
            damage,
            result: None,
        }
    }

    #[test]
    fn lethal_eligible_hit_converts_and_spares() {
        let (mut orch, mut field) = setup();
        let (p1, e1) = (UnitId::from("player-1"), UnitId::from("enemy-1"));

        let res = on_attack_resolved(&mut orch, &mut field, &attack(&p1, &e1, 99)).expect("hook");
        assert!(matches!(res, AttackResolution::Converted(_)));
        let unit = field.unit(&e1).expect("still in play");
        assert_eq!(unit.current_hp, 40);
        assert_eq!(unit.faction, Faction::FRIENDLY);
        assert!(field.is_npc(&e1));
    }

    #[test]
    fn wrong_attacker_deals_normal_damage() {
        let (mut orch, mut field) = setup();
        let (p2, e1) = (UnitId::from("player-2"), UnitId::from("enemy-1"));

        let res = on_attack_resolved(&mut orch, &mut field, &attack(&p2, &e1, 99)).expect("hook");
        assert_eq!(
            res,
            AttackResolution::Damaged {
                remaining_hp: 0,
                recruitment: Some(ErrorKind::ConditionsNotMet),
            }
        );
    }

    #[test]
    fn ordinary_enemy_just_takes_damage() {
        let (mut orch, mut field) = setup();
        let (p1, e2) = (UnitId::from("player-1"), UnitId::from("enemy-2"));
        let res = on_attack_resolved(&mut orch, &mut field, &attack(&p1, &e2, 15)).expect("hook");
        assert_eq!(
            res,
            AttackResolution::Damaged {
                remaining_hp: 25,
                recruitment: None,
            }
        );
    }

    #[test]
    fn npc_hits_mirror_hp_and_stage_clear_recruits() {
        let (mut orch, mut field) = setup();
        let (p1, e1) = (UnitId::from("player-1"), UnitId::from("enemy-1"));
        on_attack_resolved(&mut orch, &mut field, &attack(&p1, &e1, 99)).expect("convert");

        let res = on_attack_resolved(&mut orch, &mut field, &attack(&p1, &e1, 15)).expect("hit");
        assert!(matches!(res, AttackResolution::NpcHit(ref o) if o.state.remaining_hp == 25));
        assert_eq!(field.unit(&e1).map(|u| u.current_hp), Some(25));

        on_turn_end(&mut orch, &mut field);
        let done = on_stage_clear(&mut orch, &mut field, None).expect("clear");
        assert_eq!(done.recruited.len(), 1);
        assert_eq!(orch.status(&e1), Some(RecruitmentStatus::Recruited));
        assert!(!field.is_npc(&e1));
        assert!(field.unit(&e1).is_some_and(|u| !u.has_acted));
    }

    #[test]
    fn unknown_attacker_is_reported() {
        let (mut orch, mut field) = setup();
        let (ghost, e1) = (UnitId::from("ghost"), UnitId::from("enemy-1"));
        let err = on_attack_resolved(&mut orch, &mut field, &attack(&ghost, &e1, 5))
            .expect_err("ghost");
        assert!(matches!(err, BattleError::UnitNotFound(ref id) if *id == ghost));
    }
}
