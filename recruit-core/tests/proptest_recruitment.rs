//! Property-Based Tests for Recruit Core
//!
//! Uses `proptest` to check the recruitment state machine under random
//! attack, damage and turn sequences.

use std::cell::Cell;

use proptest::prelude::*;
use serde_json::json;

use recruit_core::cache::ConditionCache;
use recruit_core::condition::{Condition, ConditionKind, RawCondition};
use recruit_core::config::RecruitConfig;
use recruit_core::npc::NpcLifecycleManager;
use recruit_core::stage::{RecruitmentBlock, StageData};
use recruit_core::{
    Faction, RecruitmentContext, RecruitmentId, RecruitmentOrchestrator, RecruitmentStatus,
    TargetPriority, Unit,
};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Step {
    Attack { by_hero: bool, damage: u32, turn: u32 },
    HitNpc(i64),
    Clear { alive: bool },
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (any::<bool>(), 0..150u32, 1..8u32)
            .prop_map(|(by_hero, damage, turn)| Step::Attack { by_hero, damage, turn }),
        3 => (-5..120i64).prop_map(Step::HitNpc),
        1 => any::<bool>().prop_map(|alive| Step::Clear { alive }),
    ]
}

fn rank(status: RecruitmentStatus) -> u8 {
    match status {
        RecruitmentStatus::Available => 0,
        RecruitmentStatus::ConditionsMet => 1,
        RecruitmentStatus::NpcState => 2,
        RecruitmentStatus::Recruited | RecruitmentStatus::Failed => 3,
    }
}

fn stage(max_turn: u32) -> StageData {
    StageData::new("prop")
        .with_unit(Unit::new("player-1", Faction::Player, 40))
        .with_unit(Unit::new("player-2", Faction::Player, 40))
        .with_recruitable(
            Unit::new("enemy-1", Faction::Enemy, 100),
            RecruitmentBlock {
                conditions: vec![
                    RawCondition {
                        id: "hero".into(),
                        kind: "SPECIFIC_ATTACKER".into(),
                        description: String::new(),
                        parameters: json!({"attackerId": "player-1"}),
                    },
                    RawCondition {
                        id: "early".into(),
                        kind: "TURN_LIMIT".into(),
                        description: String::new(),
                        parameters: json!({"maxTurn": max_turn}),
                    },
                ],
                ..RecruitmentBlock::default()
            },
        )
}

// ---------------------------------------------------------------------------
// Property: status never regresses, NPC state exists iff status is NPC_STATE
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn status_is_monotonic(
        max_turn in 1..6u32,
        hp in 1..100u32,
        steps in prop::collection::vec(arb_step(), 1..40),
    ) {
        let mut orch = RecruitmentOrchestrator::new(RecruitConfig::default()).expect("config");
        orch.initialize(&stage(max_turn));
        let hero = Unit::new("player-1", Faction::Player, 40);
        let rookie = Unit::new("player-2", Faction::Player, 40);
        let enemy = Unit::new("enemy-1", Faction::Enemy, 100).with_hp(hp);
        let id = enemy.id.clone();

        let mut last = rank(orch.status(&id).expect("definition"));
        for step in steps {
            match step {
                Step::Attack { by_hero, damage, turn } => {
                    let attacker = if by_hero { &hero } else { &rookie };
                    let ctx = RecruitmentContext::new(attacker, &enemy, turn).with_damage(damage);
                    let _ = orch.process_attempt(&ctx);
                }
                Step::HitNpc(damage) => {
                    let _ = orch.handle_npc_damage(&id, damage);
                }
                Step::Clear { alive } => {
                    let on_field = if alive { enemy.clone() } else { enemy.clone().with_hp(0) };
                    let _ = orch.complete_recruitment(&[on_field]);
                }
            }
            let status = orch.status(&id).expect("definition");
            prop_assert!(rank(status) >= last, "regressed to {status}");
            prop_assert_eq!(orch.npc_state(&id).is_some(), status == RecruitmentStatus::NpcState);
            last = rank(status);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: NPC HP never underflows, defeat happens exactly at zero
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn npc_hp_floor_and_defeat(
        hp in 1..200u32,
        hits in prop::collection::vec(-10..80i64, 1..30),
    ) {
        let mut npcs = NpcLifecycleManager::new(3, 1.0);
        let unit = Unit::new("enemy-1", Faction::Enemy, 200).with_hp(hp);
        npcs.convert_to_npc(&unit, RecruitmentId::new(), 1).expect("convert");

        let mut expected = hp;
        for damage in hits {
            if !npcs.is_npc(&unit.id) {
                prop_assert!(npcs.handle_npc_damage(&unit.id, damage.max(0)).is_err());
                break;
            }
            match npcs.handle_npc_damage(&unit.id, damage) {
                Ok(outcome) => {
                    let dealt = u32::try_from(damage).expect("non-negative");
                    expected = expected.saturating_sub(dealt);
                    prop_assert_eq!(outcome.state.remaining_hp, expected);
                    prop_assert_eq!(outcome.defeated, expected == 0);
                    prop_assert_eq!(npcs.is_npc(&unit.id), expected > 0);
                }
                Err(_) => {
                    prop_assert!(damage < 0);
                    prop_assert_eq!(npcs.get(&unit.id).map(|s| s.remaining_hp), Some(expected));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: live NPCs outrank every non-NPC
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn npc_priority_dominates(multiplier in 0.01..100.0f64, hp in 1..500u32) {
        let mut npcs = NpcLifecycleManager::new(1, multiplier);
        let npc = Unit::new("enemy-1", Faction::Enemy, 500).with_hp(hp);
        let other = Unit::new("enemy-2", Faction::Enemy, 500);
        npcs.convert_to_npc(&npc, RecruitmentId::new(), 1).expect("convert");

        prop_assert!(npcs.get_npc_priority(&npc.id) > npcs.get_npc_priority(&other.id));
        prop_assert_eq!(npcs.get_npc_priority(&other.id), TargetPriority::NONE);
    }
}

// ---------------------------------------------------------------------------
// Property: eligibility checks are idempotent and change nothing
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn eligibility_is_idempotent(
        max_turn in 1..6u32,
        turn in 1..8u32,
        damage in 0..150u32,
        hp in 1..100u32,
        by_hero in any::<bool>(),
    ) {
        let mut orch = RecruitmentOrchestrator::new(RecruitConfig::default()).expect("config");
        orch.initialize(&stage(max_turn));
        let attacker = if by_hero {
            Unit::new("player-1", Faction::Player, 40)
        } else {
            Unit::new("player-2", Faction::Player, 40)
        };
        let enemy = Unit::new("enemy-1", Faction::Enemy, 100).with_hp(hp);
        let ctx = RecruitmentContext::new(&attacker, &enemy, turn).with_damage(damage);

        let first = orch.check_eligibility(&ctx).expect("check");
        for _ in 0..3 {
            prop_assert_eq!(&orch.check_eligibility(&ctx).expect("check"), &first);
        }
        prop_assert_eq!(first.eligible, by_hero && turn <= max_turn);
        prop_assert_eq!(orch.status(&enemy.id), Some(RecruitmentStatus::Available));
        prop_assert!(!orch.is_npc(&enemy.id));
    }
}

// ---------------------------------------------------------------------------
// Property: a warm cache answers without re-running the predicate
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn cache_hit_skips_evaluation(
        turn in 1..20u32,
        damage in 0..100u32,
        threshold in 0.05..1.0f64,
        hp in 0..50u32,
        repeats in 1..10usize,
    ) {
        let mut cache = ConditionCache::new(16);
        let cond = Condition::new("low", ConditionKind::HpThreshold { threshold });
        let attacker = Unit::new("player-1", Faction::Player, 40);
        let target = Unit::new("enemy-1", Faction::Enemy, 50).with_hp(hp);
        let ctx = RecruitmentContext::new(&attacker, &target, turn).with_damage(damage);

        let calls = Cell::new(0u32);
        let first = cache.get_or_evaluate(&target.id, &cond, &ctx, || {
            calls.set(calls.get() + 1);
            cond.evaluate(&ctx)
        });
        for _ in 0..repeats {
            let again = cache.get_or_evaluate(&target.id, &cond, &ctx, || {
                calls.set(calls.get() + 1);
                cond.evaluate(&ctx)
            });
            prop_assert_eq!(again, first);
        }
        prop_assert_eq!(calls.get(), 1);
        prop_assert_eq!(cache.stats().hits, repeats as u64);

        let later = RecruitmentContext::new(&attacker, &target, turn + 1).with_damage(damage);
        cache.get_or_evaluate(&target.id, &cond, &later, || {
            calls.set(calls.get() + 1);
            cond.evaluate(&later)
        });
        prop_assert_eq!(calls.get(), 2, "new turn must re-evaluate");
    }
}
