//! AI target selection on top of the engine's NPC priority.
//!
//! NPCs carry a priority far above anything else, so enemy AI always goes
//! for them first. Among equal priorities the weakest unit wins, then the
//! lowest id, which keeps selection deterministic.

use std::cmp::Reverse;

use recruit_core::{RecruitmentOrchestrator, TargetPriority, Unit, UnitId};

/// A candidate with its engine-assigned priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedTarget {
    /// Candidate unit.
    pub unit_id: UnitId,
    /// Engine priority (`NONE` for non-NPCs).
    pub priority: TargetPriority,
    /// HP at ranking time.
    pub current_hp: u32,
}

/// Living candidates, best target first.
#[must_use]
pub fn rank_targets(orch: &RecruitmentOrchestrator, candidates: &[Unit]) -> Vec<RankedTarget> {
    let mut ranked: Vec<RankedTarget> = candidates
        .iter()
        .filter(|u| u.is_alive())
        .map(|u| RankedTarget {
            unit_id: u.id.clone(),
            priority: orch.get_npc_priority(&u.id),
            current_hp: u.current_hp,
        })
        .collect();
    ranked.sort_by_key(|t| (Reverse(t.priority), t.current_hp, t.unit_id.clone()));
    ranked
}

/// Pick the unit an AI attacker should hit, if any candidate is alive.
#[must_use]
pub fn select_target<'a>(orch: &RecruitmentOrchestrator, candidates: &'a [Unit]) -> Option<&'a Unit> {
    let best = rank_targets(orch, candidates).into_iter().next()?;
    candidates.iter().find(|u| u.id == best.unit_id)
}
