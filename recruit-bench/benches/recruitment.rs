//! Recruitment Benchmark Suite
//!
//! Performance targets:
//!   eligibility_check_cold_4_conditions .. < 20μs
//!   eligibility_check_warm_4_conditions .. < 5μs
//!   npc_conversion ........................ < 20μs
//!   npc_damage ............................ < 2μs
//!   ui_progress_batch_16 .................. < 100μs
//!   monitor_tick .......................... < 1μs
//!   stage_clear_8_npcs .................... < 200μs
//!   attack_hook_full_path ................. < 30μs

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use recruit_battle::Battlefield;
use recruit_battle::hooks::{self, AttackReport};
use recruit_core::condition::RawCondition;
use recruit_core::stage::{RecruitmentBlock, StageData};
use recruit_core::{
    Faction, RecruitConfig, RecruitmentContext, RecruitmentOrchestrator, Unit, UnitId,
};

const HERO: &str = "player-0";

fn raw(id: &str, kind: &str, parameters: serde_json::Value) -> RawCondition {
    RawCondition {
        id: id.into(),
        kind: kind.into(),
        description: String::new(),
        parameters,
    }
}

/// `recruitables` enemies, each gated on four conditions, plus four allies.
/// Enemies start at a quarter HP so the threshold condition holds.
fn make_stage(recruitables: usize) -> StageData {
    let mut stage = StageData::new("bench");
    for i in 0..4 {
        stage = stage.with_unit(Unit::new(format!("player-{i}"), Faction::Player, 40));
    }
    for i in 0..recruitables {
        stage = stage.with_recruitable(
            Unit::new(format!("enemy-{i}"), Faction::Enemy, 40).with_hp(10),
            RecruitmentBlock {
                conditions: vec![
                    raw("hero", "SPECIFIC_ATTACKER", json!({"attackerId": HERO})),
                    raw("early", "TURN_LIMIT", json!({"maxTurn": 20})),
                    raw("weak", "HP_THRESHOLD", json!({"threshold": 0.5})),
                    raw("escort", "ALLY_PRESENT", json!({"requiredAllyId": "player-1"})),
                ],
                priority: i32::try_from(i).unwrap_or(0),
                ..RecruitmentBlock::default()
            },
        );
    }
    stage
}

fn make_engine(stage: &StageData) -> RecruitmentOrchestrator {
    let mut config = RecruitConfig::default();
    config.recruitment.max_npcs_per_stage = 16;
    let mut orch = RecruitmentOrchestrator::new(config).expect("bench config");
    orch.initialize(stage);
    orch
}

/// Benchmark: eligibility with an empty cache (target: < 20μs).
fn bench_eligibility_cold(c: &mut Criterion) {
    let stage = make_stage(1);
    let field = Battlefield::from_stage(&stage);
    let (hero, target) = (UnitId::from(HERO), UnitId::from("enemy-0"));
    let mut rng = StdRng::seed_from_u64(7);

    c.bench_function("eligibility_check_cold_4_conditions", |b| {
        b.iter_batched(
            || (make_engine(&stage), rng.gen_range(1..40u32)),
            |(orch, damage)| {
                let ctx = RecruitmentContext::from_provider(&field, &hero, &target, damage, None)
                    .expect("units on field");
                black_box(orch.check_eligibility(&ctx).expect("eligibility"));
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: eligibility answered from the cache (target: < 5μs).
fn bench_eligibility_warm(c: &mut Criterion) {
    let stage = make_stage(1);
    let field = Battlefield::from_stage(&stage);
    let orch = make_engine(&stage);
    let (hero, target) = (UnitId::from(HERO), UnitId::from("enemy-0"));
    let ctx = RecruitmentContext::from_provider(&field, &hero, &target, 12, None)
        .expect("units on field");
    orch.check_eligibility(&ctx).expect("prime cache");

    c.bench_function("eligibility_check_warm_4_conditions", |b| {
        b.iter(|| black_box(orch.check_eligibility(black_box(&ctx)).expect("eligibility")));
    });
}

/// Benchmark: lethal eligible hit converting a unit (target: < 20μs).
fn bench_conversion(c: &mut Criterion) {
    let stage = make_stage(1);
    let field = Battlefield::from_stage(&stage);
    let (hero, target) = (UnitId::from(HERO), UnitId::from("enemy-0"));

    c.bench_function("npc_conversion", |b| {
        b.iter_batched(
            || make_engine(&stage),
            |mut orch| {
                let ctx = RecruitmentContext::from_provider(&field, &hero, &target, 10, None)
                    .expect("units on field");
                black_box(orch.process_attempt(&ctx).expect("conversion"));
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: one hit on a live NPC (target: < 2μs).
fn bench_npc_damage(c: &mut Criterion) {
    let stage = make_stage(1);
    let field = Battlefield::from_stage(&stage);
    let (hero, target) = (UnitId::from(HERO), UnitId::from("enemy-0"));
    let mut rng = StdRng::seed_from_u64(11);

    c.bench_function("npc_damage", |b| {
        b.iter_batched(
            || {
                let mut orch = make_engine(&stage);
                let ctx = RecruitmentContext::from_provider(&field, &hero, &target, 10, None)
                    .expect("units on field");
                orch.process_attempt(&ctx).expect("conversion");
                (orch, rng.gen_range(0..9i64))
            },
            |(mut orch, damage)| black_box(orch.handle_npc_damage(&target, damage).expect("hit")),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: one UI indicator batch over 16 recruitables (target: < 100μs).
fn bench_progress(c: &mut Criterion) {
    let stage = make_stage(16);
    let field = Battlefield::from_stage(&stage);
    let mut orch = make_engine(&stage);
    let hero = UnitId::from(HERO);

    c.bench_function("ui_progress_batch_16", |b| {
        b.iter(|| black_box(orch.recruitment_progress(&field, &hero)));
    });
}

/// Benchmark: monitor tick between evaluations (target: < 1μs).
fn bench_tick(c: &mut Criterion) {
    let mut orch = make_engine(&make_stage(4));
    c.bench_function("monitor_tick", |b| {
        b.iter(|| black_box(orch.tick()));
    });
}

/// Benchmark: stage clear with eight NPCs waiting (target: < 200μs).
fn bench_stage_clear(c: &mut Criterion) {
    let stage = make_stage(8);
    let field = Battlefield::from_stage(&stage);
    let hero = UnitId::from(HERO);
    let units = field.units_in_play();

    c.bench_function("stage_clear_8_npcs", |b| {
        b.iter_batched(
            || {
                let mut orch = make_engine(&stage);
                for i in 0..8 {
                    let target = UnitId::from(format!("enemy-{i}"));
                    let ctx =
                        RecruitmentContext::from_provider(&field, &hero, &target, 10, None)
                            .expect("units on field");
                    orch.process_attempt(&ctx).expect("conversion");
                }
                orch
            },
            |mut orch| black_box(orch.complete_recruitment(&units).expect("clear")),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: attack hook, context build to battlefield patch (target: < 30μs).
fn bench_attack_hook(c: &mut Criterion) {
    let stage = make_stage(4);
    let (hero, target) = (UnitId::from(HERO), UnitId::from("enemy-2"));

    c.bench_function("attack_hook_full_path", |b| {
        b.iter_batched(
            || (make_engine(&stage), Battlefield::from_stage(&stage)),
            |(mut orch, mut field)| {
                let attack = AttackReport {
                    attacker: &hero,
                    target: &target,
                    damage: 10,
                    result: None,
                };
                black_box(hooks::on_attack_resolved(&mut orch, &mut field, &attack).expect("hook"))
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_eligibility_cold,
    bench_eligibility_warm,
    bench_conversion,
    bench_npc_damage,
    bench_progress,
    bench_tick,
    bench_stage_clear,
    bench_attack_hook,
);
criterion_main!(benches);
