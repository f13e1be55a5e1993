//! The recruitment orchestrator: the one entry point the battle loop talks to.
//!
//! It owns every piece of stage-scoped state (recruitable definitions, the
//! NPC manager, the condition cache) and drives them through
//! `initialize → check_eligibility / process_attempt → handle_npc_damage →
//! complete_recruitment`. Unit state is never mutated here; conversion,
//! damage and finalization return [`UnitPatch`]es for the caller to apply.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, info_span, warn};

use crate::cache::{CacheStats, ConditionCache};
use crate::condition::ConditionResult;
use crate::config::{BatchingConfig, CacheConfig, RecruitConfig};
use crate::context::{BattleContextProvider, RecruitmentContext};
use crate::definition::{RecruitableDefinition, RecruitedUnit, RecruitmentFailure, RecruitmentStatus};
use crate::error::{ErrorKind, RecruitError, Result};
use crate::events::{EventBus, RecruitmentEvent, SubscriptionId};
use crate::metrics::{RecruitCounters, spans};
use crate::monitor::{Metric, OptimizationTarget, PerformanceMonitor, TickReport};
use crate::npc::{DamageOutcome, NpcLifecycleManager, NpcState, NpcStatistics};
use crate::stage::{StageData, ValidationIssue, ValidationReport, build_definitions, validate_definitions};
use crate::types::{Faction, RecruitmentId, TargetPriority, Unit, UnitId, UnitPatch};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What the battle loop should do after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    /// All conditions hold and the hit is lethal: the target becomes an NPC.
    ConvertToNpc,
    /// Resolve the hit normally.
    ContinueBattle,
}

/// Outcome of [`RecruitmentOrchestrator::check_eligibility`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    /// Potential recruit.
    pub character_id: UnitId,
    /// Attacking unit.
    pub attacker: UnitId,
    /// One entry per condition, in definition order.
    pub conditions_met: Vec<ConditionResult>,
    /// Every condition held.
    pub eligible: bool,
    /// The incoming damage would bring the target to 0 HP.
    pub lethal: bool,
    /// Suggested follow-up.
    pub next_action: NextAction,
}

impl EligibilityReport {
    /// How many conditions held.
    #[must_use]
    pub fn met_count(&self) -> usize {
        self.conditions_met.iter().filter(|c| c.met).count()
    }
}

/// Outcome of a successful [`RecruitmentOrchestrator::process_attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// The eligibility check the attempt was based on.
    pub eligibility: EligibilityReport,
    /// Status after the attempt.
    pub status: RecruitmentStatus,
    /// `ConvertToNpc` when a conversion happened.
    pub next_action: NextAction,
    /// Set on conversion.
    pub recruitment_id: Option<RecruitmentId>,
    /// Set on conversion.
    pub npc_state: Option<NpcState>,
    /// Set on conversion; apply to the target.
    pub patch: Option<UnitPatch>,
}

/// Outcome of [`RecruitmentOrchestrator::complete_recruitment`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageCompletion {
    /// Stage that was cleared.
    pub stage_id: String,
    /// New permanent recruits.
    pub recruited: Vec<RecruitedUnit>,
    /// Recruitments that did not make it.
    pub failed: Vec<RecruitmentFailure>,
    /// Patches for the recruited units (friendly faction, turn flags reset).
    pub patches: Vec<UnitPatch>,
}

/// Condition progress for one recruitable, for UI indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitmentProgress {
    /// Recruitable unit.
    pub character_id: UnitId,
    /// Current status.
    pub status: RecruitmentStatus,
    /// Per-condition outcomes against the attacker.
    pub conditions: Vec<ConditionResult>,
}

impl RecruitmentProgress {
    /// Conditions currently holding.
    #[must_use]
    pub fn met(&self) -> usize {
        self.conditions.iter().filter(|c| c.met).count()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Stage-scoped recruitment engine.
pub struct RecruitmentOrchestrator {
    config: RecruitConfig,
    stage_id: String,
    stage_units: HashMap<UnitId, Faction>,
    definitions: HashMap<UnitId, RecruitableDefinition>,
    order: Vec<UnitId>,
    build_issues: Vec<ValidationIssue>,
    defeated_pending: Vec<UnitId>,
    npcs: NpcLifecycleManager,
    cache: Mutex<ConditionCache>,
    monitor: PerformanceMonitor,
    events: EventBus,
    counters: RecruitCounters,
    roster: Vec<RecruitedUnit>,
    batch_size: usize,
    defer_non_critical: bool,
    progress_cursor: usize,
    frame_work_us: AtomicU64,
}

impl RecruitmentOrchestrator {
    /// Create an orchestrator with no stage loaded.
    ///
    /// # Errors
    /// Returns [`RecruitError::Config`] if `config` fails validation.
    pub fn new(config: RecruitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stage_id: String::new(),
            stage_units: HashMap::new(),
            definitions: HashMap::new(),
            order: Vec::new(),
            build_issues: Vec::new(),
            defeated_pending: Vec::new(),
            npcs: NpcLifecycleManager::from_config(&config.recruitment),
            cache: Mutex::new(ConditionCache::from_config(&config.cache)),
            monitor: PerformanceMonitor::new(config.monitor.clone()),
            events: EventBus::new(config.recruitment.defer_notifications),
            counters: RecruitCounters::new(),
            roster: Vec::new(),
            batch_size: config.batching.ui_batch_size,
            defer_non_critical: false,
            progress_cursor: 0,
            frame_work_us: AtomicU64::new(0),
            config,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RecruitConfig {
        &self.config
    }

    // -- stage lifecycle ----------------------------------------------------

    /// Load a stage, discarding all state from the previous one.
    ///
    /// Every enemy with a valid recruitment block becomes an `Available`
    /// definition. Units already on the roster are skipped. Problems never
    /// abort the load; they come back in the report and are logged.
    pub fn initialize(&mut self, stage: &StageData) -> ValidationReport {
        let _span = info_span!(spans::INITIALIZE, stage = %stage.stage_id).entered();

        self.stage_id.clone_from(&stage.stage_id);
        self.stage_units = stage.factions();
        self.definitions.clear();
        self.order.clear();
        self.build_issues.clear();
        self.defeated_pending.clear();
        self.npcs.clear();
        {
            let mut cache = self.cache.lock();
            cache.clear();
            cache.reset_stats();
            cache.resize(self.config.cache.capacity);
        }
        self.batch_size = self.config.batching.ui_batch_size;
        self.defer_non_critical = false;
        self.progress_cursor = 0;

        if !self.config.general.enabled {
            info!(stage = %stage.stage_id, "Recruitment disabled; stage loaded without recruitables");
            return ValidationReport {
                stage_id: stage.stage_id.clone(),
                ..ValidationReport::default()
            };
        }

        let skip: HashSet<UnitId> = self.roster.iter().map(|r| r.unit.id.clone()).collect();
        let (definitions, report) = build_definitions(stage, &skip);

        let mut order: Vec<(i32, usize, UnitId)> = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.priority, i, d.character_id.clone()))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        self.order = order.into_iter().map(|(_, _, id)| id).collect();

        // build_definitions appends the post-build checks last; keep only what precedes them.
        let post_build = validate_definitions(&definitions, &self.stage_units).len();
        let build_only = report.issues.len().saturating_sub(post_build);
        self.build_issues = report.issues[..build_only].to_vec();
        self.definitions = definitions
            .into_iter()
            .map(|d| (d.character_id.clone(), d))
            .collect();

        report.log();
        RecruitCounters::bump(&self.counters.stages_initialized);
        self.counters
            .validation_issues
            .fetch_add(report.issues.len() as u64, Ordering::Relaxed);

        info!(
            stage = %stage.stage_id,
            recruitable = self.definitions.len(),
            issues = report.issues.len(),
            skipped_roster = skip.len(),
            "Recruitment initialized"
        );
        self.events.publish(RecruitmentEvent::Initialized {
            stage_id: self.stage_id.clone(),
            recruitable: self.order.clone(),
            issues: report.issues.len(),
        });
        report
    }

    /// Re-run the stage-data checks against the currently loaded definitions.
    ///
    /// Includes the build-time rejections recorded at [`initialize`](Self::initialize).
    #[must_use]
    pub fn validate_recruitment_data(&self) -> ValidationReport {
        let definitions: Vec<RecruitableDefinition> = self
            .order
            .iter()
            .filter_map(|id| self.definitions.get(id).cloned())
            .collect();
        let mut issues = self.build_issues.clone();
        issues.extend(validate_definitions(&definitions, &self.stage_units));
        ValidationReport {
            stage_id: self.stage_id.clone(),
            recruitable: definitions.len(),
            issues,
        }
    }

    /// Accept a previously persisted roster. Call before [`initialize`](Self::initialize)
    /// so roster members are not offered for recruitment again.
    pub fn load_roster(&mut self, roster: Vec<RecruitedUnit>) {
        info!(units = roster.len(), "Roster loaded");
        self.roster = roster;
    }

    /// Persisted plus newly recruited units.
    #[must_use]
    pub fn roster(&self) -> &[RecruitedUnit] {
        &self.roster
    }

    // -- eligibility & attempts ---------------------------------------------

    /// Evaluate every condition of `ctx.target` against `ctx`.
    ///
    /// Changes no recruitment state: calling it repeatedly with the same
    /// context gives the same report.
    ///
    /// # Errors
    /// - [`RecruitError::NotRecruitable`] if the target has no definition.
    /// - [`RecruitError::AlreadyResolved`] if it is recruited or failed.
    /// - [`RecruitError::AlreadyNpc`] if it is already an NPC.
    pub fn check_eligibility(&self, ctx: &RecruitmentContext<'_>) -> Result<EligibilityReport> {
        let _span = debug_span!(spans::ELIGIBILITY, target = %ctx.target.id).entered();
        let started = Instant::now();

        let def = self.open_definition(&ctx.target.id)?;
        let conditions_met: Vec<ConditionResult> = {
            let mut cache = self.cache.lock();
            def.conditions
                .iter()
                .map(|cond| ConditionResult {
                    condition_id: cond.id.clone(),
                    description: cond.display_text(),
                    met: cache.get_or_evaluate(&def.character_id, cond, ctx, || {
                        cond.evaluate(ctx)
                    }),
                })
                .collect()
        };

        let eligible = conditions_met.iter().all(|c| c.met);
        let lethal = ctx.is_lethal();
        let report = EligibilityReport {
            character_id: def.character_id.clone(),
            attacker: ctx.attacker.id.clone(),
            conditions_met,
            eligible,
            lethal,
            next_action: if eligible && lethal {
                NextAction::ConvertToNpc
            } else {
                NextAction::ContinueBattle
            },
        };

        RecruitCounters::bump(&self.counters.eligibility_checks);
        if !eligible {
            RecruitCounters::bump(&self.counters.ineligible_checks);
        }
        debug!(
            target = %report.character_id,
            attacker = %report.attacker,
            met = report.met_count(),
            total = report.conditions_met.len(),
            lethal,
            "Eligibility checked"
        );
        self.events.publish(RecruitmentEvent::EligibilityChecked {
            target: report.character_id.clone(),
            attacker: report.attacker.clone(),
            eligible,
            conditions: report.conditions_met.clone(),
        });
        self.finish_timing(Metric::ConditionCheckTime, started);
        Ok(report)
    }

    /// Handle a resolved attack on a recruitable.
    ///
    /// Conversion only happens when every condition holds **and** the hit is
    /// lethal; an eligible but survivable hit moves the target to
    /// `ConditionsMet` and the battle continues.
    ///
    /// # Errors
    /// - Everything [`check_eligibility`](Self::check_eligibility) returns.
    /// - [`RecruitError::MalformedUnit`] when the target is already at 0 HP;
    ///   its status is left as it was.
    /// - [`RecruitError::ConditionsNotMet`] when some condition fails.
    /// - Conversion errors from [`NpcLifecycleManager::convert_to_npc`]; the
    ///   target is then marked `Failed`.
    pub fn process_attempt(&mut self, ctx: &RecruitmentContext<'_>) -> Result<AttemptOutcome> {
        let _span = info_span!(
            spans::ATTEMPT,
            target = %ctx.target.id,
            attacker = %ctx.attacker.id,
            turn = ctx.turn
        )
        .entered();
        RecruitCounters::bump(&self.counters.attempts);

        let eligibility = self.check_eligibility(ctx)?;
        if !ctx.target.is_alive() {
            return Err(RecruitError::MalformedUnit {
                unit: ctx.target.id.clone(),
                reason: "unit is already at 0 HP".to_string(),
            });
        }
        if !eligibility.eligible {
            debug!(target = %ctx.target.id, "Recruitment conditions not met");
            return Err(RecruitError::ConditionsNotMet {
                unit: eligibility.character_id.clone(),
                met: eligibility.met_count(),
                total: eligibility.conditions_met.len(),
            });
        }

        let id = eligibility.character_id.clone();
        self.definition_mut(&id)?
            .transition(RecruitmentStatus::ConditionsMet)?;

        if !eligibility.lethal {
            debug!(target = %id, damage = ctx.damage, "Conditions met on a survivable hit");
            return Ok(AttemptOutcome {
                eligibility,
                status: RecruitmentStatus::ConditionsMet,
                next_action: NextAction::ContinueBattle,
                recruitment_id: None,
                npc_state: None,
                patch: None,
            });
        }

        let _convert = debug_span!(spans::CONVERT, target = %id).entered();
        let started = Instant::now();
        let recruitment_id = RecruitmentId::new();
        let converted = self.npcs.convert_to_npc(ctx.target, recruitment_id, ctx.turn);
        self.finish_timing(Metric::NpcConversionTime, started);

        let outcome = match converted {
            Ok(outcome) => outcome,
            Err(e) => {
                RecruitCounters::bump(&self.counters.conversion_failures);
                warn!(target = %id, error = %e, kind = %e.kind(), "Conversion to NPC failed");
                self.definition_mut(&id)?.mark_failed(e.kind())?;
                self.events.publish(RecruitmentEvent::RecruitmentFailed {
                    unit: id.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Err(e) = self.definition_mut(&id).and_then(|d| d.mark_npc(recruitment_id)) {
            self.npcs.remove_npc_state(&id);
            return Err(e);
        }
        self.cache.lock().invalidate_target(&id);
        RecruitCounters::bump(&self.counters.conversions);

        self.events.publish(RecruitmentEvent::ConvertedToNpc {
            attacker: ctx.attacker.id.clone(),
            state: outcome.state.clone(),
        });
        Ok(AttemptOutcome {
            eligibility,
            status: RecruitmentStatus::NpcState,
            next_action: NextAction::ConvertToNpc,
            recruitment_id: Some(recruitment_id),
            npc_state: Some(outcome.state),
            patch: Some(outcome.patch),
        })
    }

    // -- NPC phase ----------------------------------------------------------

    /// Route a hit on an NPC. On defeat the recruitment is marked `Failed`
    /// (`NpcAlreadyDefeated`) and reported at stage clear.
    ///
    /// # Errors
    /// - [`RecruitError::NotNpc`] if `id` is not an NPC.
    /// - [`RecruitError::InvalidDamage`] for negative damage.
    pub fn handle_npc_damage(&mut self, id: &UnitId, damage: i64) -> Result<DamageOutcome> {
        let _span = debug_span!(spans::NPC_DAMAGE, unit = %id, damage).entered();
        match self.definitions.get(id).map(RecruitableDefinition::status) {
            Some(RecruitmentStatus::NpcState) => {}
            _ => return Err(RecruitError::NotNpc(id.clone())),
        }

        let outcome = self.npcs.handle_npc_damage(id, damage)?;
        RecruitCounters::bump(&self.counters.npc_hits);

        if outcome.defeated {
            self.definition_mut(id)?
                .mark_failed(ErrorKind::NpcAlreadyDefeated)?;
            self.defeated_pending.push(id.clone());
            RecruitCounters::bump(&self.counters.npcs_defeated);
            warn!(unit = %id, "NPC defeated; recruitment lost");
            self.events.publish(RecruitmentEvent::NpcDefeated {
                unit: id.clone(),
                recruitment_id: outcome.state.recruitment_id,
            });
        } else {
            self.events.publish(RecruitmentEvent::NpcDamaged {
                unit: id.clone(),
                damage: u32::try_from(damage).unwrap_or(u32::MAX),
                remaining_hp: outcome.state.remaining_hp,
                visual_state: outcome.state.visual_state,
            });
        }
        Ok(outcome)
    }

    /// Whether `id` is currently an NPC.
    #[must_use]
    pub fn is_npc(&self, id: &UnitId) -> bool {
        self.npcs.is_npc(id)
    }

    /// Attack priority for AI targeting.
    #[must_use]
    pub fn get_npc_priority(&self, id: &UnitId) -> TargetPriority {
        self.npcs.get_npc_priority(id)
    }

    /// NPC state of `id`; present exactly while its status is `NpcState`.
    #[must_use]
    pub fn npc_state(&self, id: &UnitId) -> Option<&NpcState> {
        self.npcs.get(id)
    }

    /// Read access to the NPC manager.
    #[must_use]
    pub fn npc_manager(&self) -> &NpcLifecycleManager {
        &self.npcs
    }

    /// NPC aggregates as of `current_turn`.
    #[must_use]
    pub fn npc_statistics(&self, current_turn: u32) -> NpcStatistics {
        self.npcs.statistics(current_turn)
    }

    // -- stage clear ----------------------------------------------------------

    /// Finalize the stage. Every NPC found alive in `units_in_play` is
    /// recruited; the rest, and NPCs defeated earlier, are reported failed.
    ///
    /// # Errors
    /// Returns [`RecruitError::Invariant`] if definition and NPC state have
    /// diverged; nothing is finalized in that case.
    pub fn complete_recruitment(&mut self, units_in_play: &[Unit]) -> Result<StageCompletion> {
        let _span = info_span!(spans::COMPLETE, stage = %self.stage_id).entered();

        let npc_ids: Vec<UnitId> = self
            .order
            .iter()
            .filter(|id| {
                self.definitions.get(*id).map(RecruitableDefinition::status)
                    == Some(RecruitmentStatus::NpcState)
            })
            .cloned()
            .collect();
        if let Some(orphan) = npc_ids.iter().find(|id| !self.npcs.is_npc(id)) {
            return Err(RecruitError::Invariant(format!(
                "{orphan} is in NPC_STATE without an NPC record"
            )));
        }

        let mut completion = StageCompletion {
            stage_id: self.stage_id.clone(),
            recruited: Vec::new(),
            failed: Vec::new(),
            patches: Vec::new(),
        };

        for id in std::mem::take(&mut self.defeated_pending) {
            let err = RecruitError::NpcAlreadyDefeated(id.clone());
            completion.failed.push(RecruitmentFailure {
                character_id: id,
                kind: err.kind(),
                message: err.to_string(),
            });
        }

        let stage_id = self.stage_id.clone();
        for id in npc_ids {
            let survivor = units_in_play.iter().find(|u| u.id == id && u.is_alive());
            let state = self.npcs.remove_npc_state(&id);
            let def = self.definition_mut(&id)?;

            match (survivor, state) {
                (Some(unit), Some(state)) => {
                    def.transition(RecruitmentStatus::Recruited)?;
                    let patch = UnitPatch::new(id.clone())
                        .faction(Faction::FRIENDLY)
                        .turn_flags(false);
                    let mut joined = unit.clone();
                    patch.apply(&mut joined);
                    let recruited = RecruitedUnit {
                        unit: joined,
                        recruitment_id: state.recruitment_id,
                        conditions: def.conditions.clone(),
                        stage_id: stage_id.clone(),
                        recruited_at: Utc::now(),
                    };
                    info!(
                        unit = %id,
                        recruitment = %state.recruitment_id,
                        hp = recruited.unit.current_hp,
                        "Unit recruited"
                    );
                    completion.patches.push(patch);
                    completion.recruited.push(recruited);
                }
                _ => {
                    def.mark_failed(ErrorKind::RecruitmentFailed)?;
                    let err = RecruitError::RecruitmentFailed(id.clone());
                    warn!(unit = %id, "NPC did not survive the stage");
                    completion.failed.push(RecruitmentFailure {
                        character_id: id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        self.counters
            .recruited
            .fetch_add(completion.recruited.len() as u64, Ordering::Relaxed);
        self.counters
            .recruitment_failures
            .fetch_add(completion.failed.len() as u64, Ordering::Relaxed);
        self.roster.extend(completion.recruited.iter().cloned());

        for recruited in &completion.recruited {
            self.events.publish(RecruitmentEvent::RecruitmentCompleted {
                recruited: Box::new(recruited.clone()),
            });
        }
        for failure in &completion.failed {
            self.events.publish(RecruitmentEvent::RecruitmentFailed {
                unit: failure.character_id.clone(),
                kind: failure.kind,
                message: failure.message.clone(),
            });
        }
        self.events.publish(RecruitmentEvent::StageRecruitmentCompleted {
            stage_id: self.stage_id.clone(),
            recruited: completion.recruited.iter().map(|r| r.unit.id.clone()).collect(),
            failed: completion.failed.iter().map(|f| f.character_id.clone()).collect(),
        });

        info!(
            stage = %self.stage_id,
            recruited = completion.recruited.len(),
            failed = completion.failed.len(),
            "Stage recruitment completed"
        );
        Ok(completion)
    }

    // -- UI & housekeeping ---------------------------------------------------

    /// Condition progress for the next batch of open recruitables, as seen
    /// by `attacker`. Batches rotate round-robin; nothing is returned while
    /// non-critical work is deferred. Changes no recruitment state.
    pub fn recruitment_progress<P: BattleContextProvider + ?Sized>(
        &mut self,
        provider: &P,
        attacker: &UnitId,
    ) -> Vec<RecruitmentProgress> {
        if self.defer_non_critical || self.order.is_empty() {
            return Vec::new();
        }
        let _span = debug_span!(spans::PROGRESS, attacker = %attacker).entered();
        let started = Instant::now();

        let open: Vec<&UnitId> = self
            .order
            .iter()
            .filter(|id| {
                self.definitions
                    .get(*id)
                    .is_some_and(|d| matches!(d.status(), RecruitmentStatus::Available | RecruitmentStatus::ConditionsMet))
            })
            .collect();
        if open.is_empty() {
            return Vec::new();
        }

        let start = self.progress_cursor % open.len();
        let take = self.batch_size.max(1).min(open.len());
        let mut progress = Vec::with_capacity(take);
        {
            let mut cache = self.cache.lock();
            for id in open.iter().cycle().skip(start).take(take) {
                let Some(def) = self.definitions.get(*id) else {
                    continue;
                };
                let Some(ctx) =
                    RecruitmentContext::from_provider(provider, attacker, id, 0, None)
                else {
                    continue;
                };
                let conditions = def
                    .conditions
                    .iter()
                    .map(|cond| ConditionResult {
                        condition_id: cond.id.clone(),
                        description: cond.display_text(),
                        met: cache.get_or_evaluate(id, cond, &ctx, || cond.evaluate(&ctx)),
                    })
                    .collect();
                progress.push(RecruitmentProgress {
                    character_id: (*id).clone(),
                    status: def.status(),
                    conditions,
                });
            }
        }
        self.progress_cursor = (start + take) % open.len();
        self.finish_timing(Metric::UiUpdateTime, started);
        progress
    }

    /// Per-tick housekeeping: sample cache and memory, drive the monitor,
    /// and deliver deferred events.
    pub fn tick(&mut self) -> TickReport {
        let _span = debug_span!(spans::MONITOR_TICK).entered();

        let work_us = self.frame_work_us.swap(0, Ordering::Relaxed);
        self.monitor.record(Metric::FrameImpact, work_us as f64 / 1000.0);
        {
            let stats = self.cache.lock().stats();
            if stats.hits + stats.misses > 0 {
                self.monitor.record(Metric::CacheHitRatio, stats.hit_ratio());
            }
        }
        self.monitor
            .record(Metric::MemoryUsage, self.estimated_bytes() as f64);

        let report = {
            let mut cache = self.cache.lock();
            let mut handle = TuningHandle {
                cache: &mut *cache,
                cache_config: &self.config.cache,
                batching: &self.config.batching,
                batch_size: &mut self.batch_size,
                deferred: &mut self.defer_non_critical,
            };
            self.monitor.tick(&mut handle)
        };
        self.events.flush();
        report
    }

    /// Approximate heap footprint of all stage-scoped state, in bytes.
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        let conditions: usize = self.definitions.values().map(|d| d.conditions.len()).sum();
        self.cache.lock().estimated_bytes()
            + self.definitions.len() * std::mem::size_of::<RecruitableDefinition>()
            + conditions * std::mem::size_of::<crate::condition::Condition>()
            + self.npcs.len() * std::mem::size_of::<NpcState>()
            + self.roster.len() * std::mem::size_of::<RecruitedUnit>()
    }

    fn finish_timing(&self, metric: Metric, started: Instant) {
        let elapsed = started.elapsed();
        self.monitor.record(metric, elapsed.as_secs_f64() * 1000.0);
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.frame_work_us.fetch_add(us, Ordering::Relaxed);
    }

    // -- accessors ------------------------------------------------------------

    /// Id of the loaded stage.
    #[must_use]
    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    /// Definition of one recruitable.
    #[must_use]
    pub fn definition(&self, id: &UnitId) -> Option<&RecruitableDefinition> {
        self.definitions.get(id)
    }

    /// All definitions, highest priority first.
    pub fn definitions(&self) -> impl Iterator<Item = &RecruitableDefinition> {
        self.order.iter().filter_map(|id| self.definitions.get(id))
    }

    /// Status of one recruitable.
    #[must_use]
    pub fn status(&self, id: &UnitId) -> Option<RecruitmentStatus> {
        self.definitions.get(id).map(RecruitableDefinition::status)
    }

    /// Register an event callback.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&RecruitmentEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// The event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Deliver queued events now. Returns how many went out.
    pub fn flush_events(&self) -> usize {
        self.events.flush()
    }

    /// Activity counters.
    #[must_use]
    pub fn counters(&self) -> &RecruitCounters {
        &self.counters
    }

    /// Condition-cache counters since the last tick.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Current condition-cache capacity.
    #[must_use]
    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().capacity()
    }

    /// The performance monitor.
    #[must_use]
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Current UI batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether non-critical work is paused.
    #[must_use]
    pub fn is_deferring(&self) -> bool {
        self.defer_non_critical
    }

    fn open_definition(&self, id: &UnitId) -> Result<&RecruitableDefinition> {
        let def = self
            .definitions
            .get(id)
            .ok_or_else(|| RecruitError::NotRecruitable(id.clone()))?;
        match def.status() {
            RecruitmentStatus::Available | RecruitmentStatus::ConditionsMet => Ok(def),
            RecruitmentStatus::NpcState => Err(RecruitError::AlreadyNpc(id.clone())),
            status @ (RecruitmentStatus::Recruited | RecruitmentStatus::Failed) => {
                Err(RecruitError::AlreadyResolved {
                    unit: id.clone(),
                    status,
                })
            }
        }
    }

    fn definition_mut(&mut self, id: &UnitId) -> Result<&mut RecruitableDefinition> {
        self.definitions
            .get_mut(id)
            .ok_or_else(|| RecruitError::Invariant(format!("definition for {id} vanished")))
    }
}

impl std::fmt::Debug for RecruitmentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecruitmentOrchestrator")
            .field("stage_id", &self.stage_id)
            .field("definitions", &self.definitions.len())
            .field("npcs", &self.npcs.len())
            .field("roster", &self.roster.len())
            .field("batch_size", &self.batch_size)
            .field("deferring", &self.defer_non_critical)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Monitor seam
// ---------------------------------------------------------------------------

/// Borrowed view of the tunable parts of an orchestrator.
struct TuningHandle<'a> {
    cache: &'a mut ConditionCache,
    cache_config: &'a CacheConfig,
    batching: &'a BatchingConfig,
    batch_size: &'a mut usize,
    deferred: &'a mut bool,
}

impl OptimizationTarget for TuningHandle<'_> {
    fn shrink_cache(&mut self) -> bool {
        let current = self.cache.capacity();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target = ((current as f64 * self.cache_config.shrink_factor) as usize)
            .max(self.cache_config.min_capacity);
        if target >= current {
            return false;
        }
        self.cache.resize(target);
        true
    }

    fn reduce_batch_size(&mut self) -> bool {
        let target = (*self.batch_size / 2).max(self.batching.min_batch_size);
        if target >= *self.batch_size {
            return false;
        }
        *self.batch_size = target;
        true
    }

    fn defer_non_critical(&mut self) -> bool {
        !std::mem::replace(self.deferred, true)
    }

    fn resume_non_critical(&mut self) -> bool {
        std::mem::replace(self.deferred, false)
    }

    fn force_cleanup(&mut self) -> bool {
        let had_entries = !self.cache.is_empty();
        self.cache.clear();
        had_entries
    }
}
