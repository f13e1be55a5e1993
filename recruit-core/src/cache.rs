//! Condition-result cache.
//!
//! Results are memoized per `(target, condition)` and tagged with the
//! [`Fingerprint`] of the context that produced them. A lookup whose
//! fingerprint no longer matches is a miss and drops the stale entry, so an
//! "eligible" verdict from one turn can never leak into the next. Capacity is
//! bounded; once full, the least-recently-used entry is evicted.
//!
//! The cache is stage-scoped and never persisted.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::condition::{Condition, ConditionKind, ObservedInput};
use crate::config::CacheConfig;
use crate::context::RecruitmentContext;
use crate::types::UnitId;

/// The mutable parts of a context that a cached result depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Battle turn.
    pub turn: u32,
    /// Incoming damage.
    pub damage: u32,
    /// Attacking unit.
    pub attacker: UnitId,
    /// Condition-specific input (target HP, battle-result field, ...).
    pub input: ObservedInput,
}

impl Fingerprint {
    /// Fingerprint `ctx` for a condition that reads `input`.
    #[must_use]
    pub fn new(ctx: &RecruitmentContext<'_>, input: ObservedInput) -> Self {
        Self {
            turn: ctx.turn,
            damage: ctx.damage,
            attacker: ctx.attacker.id.clone(),
            input,
        }
    }
}

/// Cache key: which condition of which target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Recruitable unit.
    pub target: UnitId,
    /// Condition id.
    pub condition: String,
}

impl CacheKey {
    /// Build a key.
    #[must_use]
    pub fn new(target: &UnitId, condition: &Condition) -> Self {
        Self {
            target: target.clone(),
            condition: condition.id.clone(),
        }
    }
}

/// A memoized condition result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Where it is stored.
    pub key: CacheKey,
    /// Cached verdict.
    pub result: bool,
    /// Context fingerprint it was computed under.
    pub fingerprint: Fingerprint,
    /// Predicate that produced it. A different predicate under the same id
    /// never reuses the verdict.
    pub kind: ConditionKind,
}

/// Running cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to evaluate.
    pub misses: u64,
    /// Entries dropped because their fingerprint no longer matched.
    pub stale: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 1.0 before any lookup.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded LRU map of condition results.
pub struct ConditionCache {
    entries: LruCache<CacheKey, CacheEntry>,
    enabled: bool,
    stats: CacheStats,
}

impl ConditionCache {
    /// Rough per-entry footprint used for memory estimates.
    pub const ENTRY_BYTES: usize = 160;

    /// Create an enabled cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            enabled: true,
            stats: CacheStats::default(),
        }
    }

    /// Create from configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut cache = Self::new(config.capacity);
        cache.enabled = config.enabled;
        cache
    }

    /// Whether lookups consult the cache at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a result. A fingerprint mismatch drops the entry and misses.
    pub fn get(
        &mut self,
        target: &UnitId,
        condition: &Condition,
        ctx: &RecruitmentContext<'_>,
    ) -> Option<bool> {
        if !self.enabled {
            return None;
        }
        let key = CacheKey::new(target, condition);
        let fingerprint = condition.fingerprint(ctx);

        let fresh = match self.entries.get(&key) {
            Some(entry) if entry.fingerprint == fingerprint && entry.kind == condition.kind => {
                Some(entry.result)
            }
            Some(_) => None,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if fresh.is_some() {
            self.stats.hits += 1;
        } else {
            self.entries.pop(&key);
            self.stats.stale += 1;
            self.stats.misses += 1;
        }
        fresh
    }

    /// Store a result computed under `ctx`.
    pub fn set(
        &mut self,
        target: &UnitId,
        condition: &Condition,
        ctx: &RecruitmentContext<'_>,
        result: bool,
    ) {
        if !self.enabled {
            return;
        }
        let key = CacheKey::new(target, condition);
        let entry = CacheEntry {
            key: key.clone(),
            result,
            fingerprint: condition.fingerprint(ctx),
            kind: condition.kind.clone(),
        };
        if let Some((evicted, _)) = self.entries.push(key.clone(), entry)
            && evicted != key
        {
            self.stats.evictions += 1;
        }
    }

    /// Return the cached result, or run `evaluate` and cache what it returns.
    pub fn get_or_evaluate(
        &mut self,
        target: &UnitId,
        condition: &Condition,
        ctx: &RecruitmentContext<'_>,
        evaluate: impl FnOnce() -> bool,
    ) -> bool {
        if let Some(hit) = self.get(target, condition, ctx) {
            return hit;
        }
        let result = evaluate();
        self.set(target, condition, ctx, result);
        result
    }

    /// Drop every entry for `target`. Returns how many were removed.
    pub fn invalidate_target(&mut self, target: &UnitId) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(k, _)| &k.target == target)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            self.entries.pop(key);
        }
        keys.len()
    }

    /// Change capacity (minimum 1), evicting LRU entries if shrinking.
    /// Returns the new capacity.
    pub fn resize(&mut self, capacity: usize) -> usize {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let before = self.entries.len();
        self.entries.resize(cap);
        let dropped = before.saturating_sub(self.entries.len());
        self.stats.evictions += dropped as u64;
        cap.get()
    }

    /// Drop all entries, keeping statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Counters since creation or the last [`reset_stats`](Self::reset_stats).
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Approximate heap footprint in bytes.
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.entries.len() * Self::ENTRY_BYTES
    }
}

impl std::fmt::Debug for ConditionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity())
            .field("enabled", &self.enabled)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionKind;
    use crate::types::{Faction, Unit};
    use std::cell::Cell;

    fn attacker_condition() -> Condition {
        Condition::new("atk", ConditionKind::SpecificAttacker { attacker_id: "p1".into() })
    }

    #[test]
    fn hit_skips_evaluation() {
        let mut cache = ConditionCache::new(8);
        let cond = attacker_condition();
        let p1 = Unit::new("p1", Faction::Player, 10);
        let target = Unit::new("e1", Faction::Enemy, 10);
        let ctx = RecruitmentContext::new(&p1, &target, 1).with_damage(5);
        let calls = Cell::new(0);

        let eval = || {
            calls.set(calls.get() + 1);
            cond.evaluate(&ctx)
        };
        assert!(cache.get_or_evaluate(&target.id, &cond, &ctx, eval));
        assert!(cache.get_or_evaluate(&target.id, &cond, &ctx, || {
            calls.set(calls.get() + 1);
            false
        }));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn new_turn_invalidates_entry() {
        let mut cache = ConditionCache::new(8);
        let cond = attacker_condition();
        let p1 = Unit::new("p1", Faction::Player, 10);
        let target = Unit::new("e1", Faction::Enemy, 10);

        let turn1 = RecruitmentContext::new(&p1, &target, 1);
        cache.set(&target.id, &cond, &turn1, true);
        assert_eq!(cache.get(&target.id, &cond, &turn1), Some(true));

        let turn2 = RecruitmentContext::new(&p1, &target, 2);
        assert_eq!(cache.get(&target.id, &cond, &turn2), None);
        assert_eq!(cache.stats().stale, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_eviction_respects_capacity() {
        let mut cache = ConditionCache::new(2);
        let cond = attacker_condition();
        let p1 = Unit::new("p1", Faction::Player, 10);
        let targets: Vec<Unit> = (0..3)
            .map(|i| Unit::new(format!("e{i}").as_str(), Faction::Enemy, 10))
            .collect();

        for t in &targets {
            cache.set(&t.id, &cond, &RecruitmentContext::new(&p1, t, 1), true);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        // The oldest target was evicted.
        assert_eq!(
            cache.get(&targets[0].id, &cond, &RecruitmentContext::new(&p1, &targets[0], 1)),
            None
        );
    }

    #[test]
    fn resize_and_invalidate() {
        let mut cache = ConditionCache::new(8);
        let p1 = Unit::new("p1", Faction::Player, 10);
        let target = Unit::new("e1", Faction::Enemy, 10);
        let ctx = RecruitmentContext::new(&p1, &target, 1);
        for i in 0..4 {
            let cond = Condition::new(format!("c{i}"), ConditionKind::TurnLimit { max_turn: 9 });
            cache.set(&target.id, &cond, &ctx, true);
        }
        assert_eq!(cache.resize(2), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.invalidate_target(&target.id), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.resize(0), 1);
    }

    #[test]
    fn disabled_cache_always_evaluates() {
        let mut cache = ConditionCache::from_config(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let cond = attacker_condition();
        let p1 = Unit::new("p1", Faction::Player, 10);
        let target = Unit::new("e1", Faction::Enemy, 10);
        let ctx = RecruitmentContext::new(&p1, &target, 1);
        let calls = Cell::new(0);
        for _ in 0..3 {
            cache.get_or_evaluate(&target.id, &cond, &ctx, || {
                calls.set(calls.get() + 1);
                true
            });
        }
        assert_eq!(calls.get(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn same_id_different_predicate_is_a_miss() {
        let mut cache = ConditionCache::new(8);
        let lenient = Condition::new("t", ConditionKind::TurnLimit { max_turn: 10 });
        let strict = Condition::new("t", ConditionKind::TurnLimit { max_turn: 3 });
        let p1 = Unit::new("p1", Faction::Player, 10);
        let target = Unit::new("e1", Faction::Enemy, 10);
        let ctx = RecruitmentContext::new(&p1, &target, 5).with_damage(10);

        assert!(cache.get_or_evaluate(&target.id, &lenient, &ctx, || lenient.evaluate(&ctx)));
        let calls = Cell::new(0);
        let verdict = cache.get_or_evaluate(&target.id, &strict, &ctx, || {
            calls.set(calls.get() + 1);
            strict.evaluate(&ctx)
        });
        assert!(!verdict);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats().hits, 0);
    }
}
