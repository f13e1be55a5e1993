//! Recruitment events and the publish/subscribe bus that carries them.
//!
//! The engine only ever publishes; UI and telemetry layers subscribe. Events
//! are delivered strictly in publication order. In deferred mode they wait in
//! the queue until [`EventBus::flush`] runs on the next tick.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::condition::ConditionResult;
use crate::definition::RecruitedUnit;
use crate::error::ErrorKind;
use crate::npc::{NpcState, VisualState};
use crate::types::{RecruitmentId, UnitId};

/// Something observable happened in the recruitment engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum RecruitmentEvent {
    /// A stage's recruitable definitions were built.
    #[serde(rename = "recruitment-initialized")]
    Initialized {
        /// Stage id.
        stage_id: String,
        /// Units that can be recruited.
        recruitable: Vec<UnitId>,
        /// Validation issues found while loading.
        issues: usize,
    },
    /// An eligibility check ran.
    #[serde(rename = "recruitment-eligibility-checked")]
    EligibilityChecked {
        /// Potential recruit.
        target: UnitId,
        /// Attacking unit.
        attacker: UnitId,
        /// Whether every condition held.
        eligible: bool,
        /// Per-condition outcomes.
        conditions: Vec<ConditionResult>,
    },
    /// A unit entered NPC state.
    #[serde(rename = "character-converted-to-npc")]
    ConvertedToNpc {
        /// Who landed the blow.
        attacker: UnitId,
        /// New NPC state.
        state: NpcState,
    },
    /// An NPC took damage and survived.
    #[serde(rename = "npc-damaged")]
    NpcDamaged {
        /// The NPC.
        unit: UnitId,
        /// Damage dealt.
        damage: u32,
        /// HP left.
        remaining_hp: u32,
        /// New look.
        visual_state: VisualState,
    },
    /// An NPC reached zero HP.
    #[serde(rename = "npc-defeated")]
    NpcDefeated {
        /// The NPC.
        unit: UnitId,
        /// Conversion that is now void.
        recruitment_id: RecruitmentId,
    },
    /// An NPC survived stage clear and joined.
    #[serde(rename = "recruitment-completed")]
    RecruitmentCompleted {
        /// The new recruit.
        recruited: Box<RecruitedUnit>,
    },
    /// A recruitment ended without a recruit.
    #[serde(rename = "recruitment-failed")]
    RecruitmentFailed {
        /// Lost unit.
        unit: UnitId,
        /// Why.
        kind: ErrorKind,
        /// Human-readable reason.
        message: String,
    },
    /// Stage-clear finalization finished.
    #[serde(rename = "stage-recruitment-completed")]
    StageRecruitmentCompleted {
        /// Stage id.
        stage_id: String,
        /// Units recruited this stage.
        recruited: Vec<UnitId>,
        /// Units lost this stage.
        failed: Vec<UnitId>,
    },
}

impl RecruitmentEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "recruitment-initialized",
            Self::EligibilityChecked { .. } => "recruitment-eligibility-checked",
            Self::ConvertedToNpc { .. } => "character-converted-to-npc",
            Self::NpcDamaged { .. } => "npc-damaged",
            Self::NpcDefeated { .. } => "npc-defeated",
            Self::RecruitmentCompleted { .. } => "recruitment-completed",
            Self::RecruitmentFailed { .. } => "recruitment-failed",
            Self::StageRecruitmentCompleted { .. } => "stage-recruitment-completed",
        }
    }

    /// The unit the event is about, for per-unit events.
    #[must_use]
    pub fn unit(&self) -> Option<&UnitId> {
        match self {
            Self::EligibilityChecked { target, .. } => Some(target),
            Self::ConvertedToNpc { state, .. } => Some(&state.unit_id),
            Self::NpcDamaged { unit, .. }
            | Self::NpcDefeated { unit, .. }
            | Self::RecruitmentFailed { unit, .. } => Some(unit),
            Self::RecruitmentCompleted { recruited } => Some(&recruited.unit.id),
            Self::Initialized { .. } | Self::StageRecruitmentCompleted { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Callback invoked for every delivered event.
pub type Subscriber = Arc<dyn Fn(&RecruitmentEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// FIFO publish/subscribe bus.
pub struct EventBus {
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    queue: Mutex<VecDeque<RecruitmentEvent>>,
    deferred: AtomicBool,
    flushing: AtomicBool,
    next_id: AtomicU64,
    delivered: AtomicU64,
}

impl EventBus {
    /// Create a bus. With `deferred`, events wait for [`flush`](Self::flush).
    #[must_use]
    pub fn new(deferred: bool) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            deferred: AtomicBool::new(deferred),
            flushing: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&RecruitmentEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    /// Queue an event, delivering immediately unless deferred.
    pub fn publish(&self, event: RecruitmentEvent) {
        trace!(event = event.name(), "Event published");
        self.queue.lock().push_back(event);
        if !self.is_deferred() {
            self.flush();
        }
    }

    /// Deliver every queued event in order. Returns how many were delivered.
    ///
    /// Events published by a subscriber during delivery join the back of the
    /// queue and go out in the same flush.
    pub fn flush(&self) -> usize {
        if self.flushing.swap(true, Ordering::Acquire) {
            return 0;
        }
        let _guard = FlushGuard(&self.flushing);
        let mut count = 0;
        loop {
            let Some(event) = self.queue.lock().pop_front() else {
                break;
            };
            let subscribers: Vec<Subscriber> =
                self.subscribers.lock().iter().map(|(_, s)| Arc::clone(s)).collect();
            for subscriber in &subscribers {
                subscriber(&event);
            }
            count += 1;
        }
        self.delivered.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Switch between deferred and immediate delivery. Switching to
    /// immediate does not flush by itself.
    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::Relaxed);
    }

    /// Whether delivery waits for [`flush`](Self::flush).
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::Relaxed)
    }

    /// Events waiting in the queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Events delivered since creation.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Drop queued events without delivering them.
    pub fn discard_pending(&self) -> usize {
        let mut queue = self.queue.lock();
        let n = queue.len();
        queue.clear();
        n
    }
}

/// Clears the flushing flag even if a subscriber panics.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.lock().len())
            .field("pending", &self.pending())
            .field("deferred", &self.is_deferred())
            .finish()
    }
}
