//! End-to-end stage flow: attacks through the hooks, AI targeting, stage
//! clear, and the roster carried into the next stage via SQLite.

use recruit_battle::hooks::{self, AttackReport, AttackResolution};
use recruit_battle::{BattleConfig, Battlefield, PlatformProfile, select_target};
use recruit_core::condition::RawCondition;
use recruit_core::stage::{RecruitmentBlock, StageData};
use recruit_core::{
    BattleContextProvider, BattleResult, DamageType, Element, Faction, RecruitmentOrchestrator,
    RecruitmentStatus, Unit, UnitId, WeaponType,
};
use serde_json::json;

fn chapter(stage_id: &str) -> StageData {
    StageData::new(stage_id)
        .with_unit(Unit::new("player-1", Faction::Player, 30))
        .with_unit(Unit::new("player-2", Faction::Player, 30))
        .with_recruitable(
            Unit::new("knight", Faction::Enemy, 40),
            RecruitmentBlock {
                conditions: vec![
                    RawCondition {
                        id: "hero".into(),
                        kind: "SPECIFIC_ATTACKER".into(),
                        description: "Defeat with the hero".into(),
                        parameters: json!({"attackerId": "player-1"}),
                    },
                    RawCondition {
                        id: "gentle".into(),
                        kind: "NO_CRITICAL".into(),
                        description: String::new(),
                        parameters: json!({}),
                    },
                ],
                ..RecruitmentBlock::default()
            },
        )
        .with_unit(Unit::new("archer", Faction::Enemy, 25))
}

fn hit(element: Element, critical: bool) -> BattleResult {
    BattleResult {
        element,
        weapon_type: WeaponType::Sword,
        damage_type: DamageType::Physical,
        critical,
    }
}

#[test]
fn recruit_survives_and_persists_across_stages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = BattleConfig::for_profile(PlatformProfile::Standard);
    config.roster_path = Some(dir.path().join("roster.db"));
    let mut store = config.open_roster().expect("roster");

    let stage = chapter("chapter-1");
    let mut orch = RecruitmentOrchestrator::new(config.recruit.clone()).expect("engine");
    orch.load_roster(store.load_all().expect("empty roster"));
    assert!(orch.initialize(&stage).is_clean());
    let mut field = Battlefield::from_stage(&stage);

    let (hero, knight, archer) = (
        UnitId::from("player-1"),
        UnitId::from("knight"),
        UnitId::from("archer"),
    );

    // A critical finishing blow breaks NO_CRITICAL: normal death.
    let crit = AttackReport {
        attacker: &hero,
        target: &knight,
        damage: 10,
        result: Some(hit(Element::Fire, true)),
    };
    let res = hooks::on_attack_resolved(&mut orch, &mut field, &crit).expect("crit");
    assert_eq!(
        res,
        AttackResolution::Damaged {
            remaining_hp: 30,
            recruitment: Some(recruit_core::ErrorKind::ConditionsNotMet),
        }
    );

    // A clean lethal blow converts.
    let finisher = AttackReport {
        attacker: &hero,
        target: &knight,
        damage: 30,
        result: Some(hit(Element::Fire, false)),
    };
    let res = hooks::on_attack_resolved(&mut orch, &mut field, &finisher).expect("convert");
    assert!(matches!(res, AttackResolution::Converted(ref s) if s.remaining_hp == 30));
    assert!(field.npc_units().contains(&knight));

    // Enemy AI now prefers the NPC over the hero.
    let allies = field.allied_units().to_vec();
    assert_eq!(select_target(&orch, &allies).map(|u| u.id.clone()), Some(knight.clone()));

    hooks::on_turn_end(&mut orch, &mut field);
    let kill = AttackReport {
        attacker: &hero,
        target: &archer,
        damage: 25,
        result: None,
    };
    hooks::on_attack_resolved(&mut orch, &mut field, &kill).expect("archer");
    assert!(field.is_cleared());

    let done = hooks::on_stage_clear(&mut orch, &mut field, Some(&mut store)).expect("clear");
    assert_eq!(done.recruited.len(), 1);
    assert_eq!(orch.status(&knight), Some(RecruitmentStatus::Recruited));
    assert_eq!(store.count().expect("count"), 1);
    drop(store);

    // Next stage: the stored recruit is not offered again.
    let store = config.open_roster().expect("reopen");
    let roster = store.load_all().expect("roster");
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].unit.faction, Faction::FRIENDLY);
    assert_eq!(roster[0].stage_id, "chapter-1");

    let mut next = RecruitmentOrchestrator::new(config.recruit.clone()).expect("engine");
    next.load_roster(roster);
    next.initialize(&chapter("chapter-2"));
    assert!(next.definition(&knight).is_none());
}

#[test]
fn npc_killed_before_clear_is_not_saved() {
    let config = BattleConfig::default();
    let mut store = config.open_roster().expect("roster");
    let stage = chapter("chapter-1");
    let mut orch = RecruitmentOrchestrator::new(config.recruit.clone()).expect("engine");
    orch.initialize(&stage);
    let mut field = Battlefield::from_stage(&stage);

    let (hero, knight) = (UnitId::from("player-1"), UnitId::from("knight"));
    let finisher = AttackReport {
        attacker: &hero,
        target: &knight,
        damage: 99,
        result: Some(hit(Element::None, false)),
    };
    hooks::on_attack_resolved(&mut orch, &mut field, &finisher).expect("convert");

    let outcome = hooks::on_npc_hit(&mut orch, &mut field, &knight, 100).expect("hit");
    assert!(outcome.defeated);
    assert!(!field.is_npc(&knight));
    assert_eq!(field.unit(&knight).map(|u| u.current_hp), Some(0));

    let done = hooks::on_stage_clear(&mut orch, &mut field, Some(&mut store)).expect("clear");
    assert!(done.recruited.is_empty());
    assert_eq!(done.failed.len(), 1);
    assert_eq!(orch.status(&knight), Some(RecruitmentStatus::Failed));
    assert_eq!(store.count().expect("count"), 0);
}
