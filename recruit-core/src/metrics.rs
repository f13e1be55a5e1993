//! Runtime counters, timing windows and span names.
//!
//! Counters are lock-free `AtomicU64`s bumped on the hot path and read on
//! export. Sample windows are small ring buffers behind a `parking_lot::Mutex`;
//! they feed the [`PerformanceMonitor`](crate::monitor::PerformanceMonitor).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for recruitment activity.
pub struct RecruitCounters {
    /// Stages initialized.
    pub stages_initialized: AtomicU64,
    /// Validation issues found while loading stages.
    pub validation_issues: AtomicU64,
    /// Eligibility checks run.
    pub eligibility_checks: AtomicU64,
    /// Checks where some condition failed.
    pub ineligible_checks: AtomicU64,
    /// Recruitment attempts processed.
    pub attempts: AtomicU64,
    /// Units converted to NPC.
    pub conversions: AtomicU64,
    /// Conversions that failed (cap, malformed unit).
    pub conversion_failures: AtomicU64,
    /// Hits landed on NPCs.
    pub npc_hits: AtomicU64,
    /// NPCs defeated before stage clear.
    pub npcs_defeated: AtomicU64,
    /// Units permanently recruited.
    pub recruited: AtomicU64,
    /// Recruitments lost at stage clear.
    pub recruitment_failures: AtomicU64,
}

impl RecruitCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stages_initialized: AtomicU64::new(0),
            validation_issues: AtomicU64::new(0),
            eligibility_checks: AtomicU64::new(0),
            ineligible_checks: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            conversions: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
            npc_hits: AtomicU64::new(0),
            npcs_defeated: AtomicU64::new(0),
            recruited: AtomicU64::new(0),
            recruitment_failures: AtomicU64::new(0),
        }
    }

    /// Increment `counter` by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            stages_initialized: self.stages_initialized.load(Ordering::Relaxed),
            validation_issues: self.validation_issues.load(Ordering::Relaxed),
            eligibility_checks: self.eligibility_checks.load(Ordering::Relaxed),
            ineligible_checks: self.ineligible_checks.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            conversions: self.conversions.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            npc_hits: self.npc_hits.load(Ordering::Relaxed),
            npcs_defeated: self.npcs_defeated.load(Ordering::Relaxed),
            recruited: self.recruited.load(Ordering::Relaxed),
            recruitment_failures: self.recruitment_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for RecruitCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecruitCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.snapshot(), f)
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Stages initialized.
    pub stages_initialized: u64,
    /// Validation issues.
    pub validation_issues: u64,
    /// Eligibility checks.
    pub eligibility_checks: u64,
    /// Failed eligibility checks.
    pub ineligible_checks: u64,
    /// Attempts processed.
    pub attempts: u64,
    /// Conversions to NPC.
    pub conversions: u64,
    /// Failed conversions.
    pub conversion_failures: u64,
    /// Hits on NPCs.
    pub npc_hits: u64,
    /// NPCs defeated.
    pub npcs_defeated: u64,
    /// Units recruited.
    pub recruited: u64,
    /// Recruitments lost at stage clear.
    pub recruitment_failures: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 11] = [
            ("stages_initialized", "Stages initialized", self.stages_initialized),
            ("validation_issues", "Recruitment data issues found", self.validation_issues),
            ("eligibility_checks", "Eligibility checks run", self.eligibility_checks),
            ("ineligible_checks", "Eligibility checks that failed", self.ineligible_checks),
            ("attempts", "Recruitment attempts processed", self.attempts),
            ("conversions", "Units converted to NPC", self.conversions),
            ("conversion_failures", "Conversions that failed", self.conversion_failures),
            ("npc_hits", "Hits landed on NPCs", self.npc_hits),
            ("npcs_defeated", "NPCs defeated before stage clear", self.npcs_defeated),
            ("recruited", "Units permanently recruited", self.recruited),
            ("recruitment_failures", "Recruitments lost at stage clear", self.recruitment_failures),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP recruit_{name}_total {help}\n\
                 # TYPE recruit_{name}_total counter\n\
                 recruit_{name}_total {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Sample windows
// ---------------------------------------------------------------------------

/// Fixed-size ring buffer of recent samples.
pub struct SampleWindow {
    inner: Mutex<WindowData>,
}

struct WindowData {
    samples: Vec<f64>,
    write_idx: usize,
    count: u64,
}

impl WindowData {
    fn filled(&self) -> &[f64] {
        let n = usize::try_from(self.count).unwrap_or(usize::MAX).min(self.samples.len());
        &self.samples[..n]
    }
}

impl SampleWindow {
    /// Create a window holding the last `capacity` samples (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(WindowData {
                samples: vec![0.0; capacity.max(1)],
                write_idx: 0,
                count: 0,
            }),
        }
    }

    /// Record one sample.
    pub fn record(&self, value: f64) {
        let mut w = self.inner.lock();
        let idx = w.write_idx;
        let len = w.samples.len();
        w.samples[idx] = value;
        w.write_idx = (idx + 1) % len;
        w.count += 1;
    }

    /// Start timing; the elapsed milliseconds are recorded when the guard drops.
    pub fn time(&self) -> TimingGuard<'_> {
        TimingGuard {
            window: self,
            start: Instant::now(),
        }
    }

    /// Mean of retained samples, `None` before the first sample.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        let w = self.inner.lock();
        let filled = w.filled();
        if filled.is_empty() {
            return None;
        }
        Some(filled.iter().sum::<f64>() / filled.len() as f64)
    }

    /// Most recent sample.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        let w = self.inner.lock();
        if w.count == 0 {
            return None;
        }
        let idx = if w.write_idx == 0 {
            w.samples.len() - 1
        } else {
            w.write_idx - 1
        };
        Some(w.samples[idx])
    }

    /// P50 / P95 / max over retained samples.
    #[must_use]
    pub fn percentiles(&self) -> WindowPercentiles {
        let w = self.inner.lock();
        let mut sorted = w.filled().to_vec();
        drop(w);
        let n = sorted.len();
        if n == 0 {
            return WindowPercentiles::default();
        }
        sorted.sort_by(f64::total_cmp);
        let at = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        WindowPercentiles {
            p50: at(0.5),
            p95: at(0.95),
            max: sorted[n - 1],
            samples: n,
        }
    }

    /// Samples recorded since creation (including overwritten ones).
    #[must_use]
    pub fn total_recorded(&self) -> u64 {
        self.inner.lock().count
    }

    /// Forget every sample.
    pub fn clear(&self) {
        let mut w = self.inner.lock();
        w.write_idx = 0;
        w.count = 0;
    }
}

impl std::fmt::Debug for SampleWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleWindow")
            .field("average", &self.average())
            .field("recorded", &self.total_recorded())
            .finish()
    }
}

/// RAII guard that records elapsed milliseconds into a window on drop.
pub struct TimingGuard<'a> {
    window: &'a SampleWindow,
    start: Instant,
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.window.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Summary of a sample window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// Maximum.
    pub max: f64,
    /// Samples the summary covers.
    pub samples: usize,
}

impl WindowPercentiles {
    /// One-line human-readable summary, with `unit` appended to each value.
    #[must_use]
    pub fn summary(&self, unit: &str) -> String {
        format!(
            "P50={:.2}{unit}  P95={:.2}{unit}  Max={:.2}{unit}  n={}",
            self.p50, self.p95, self.max, self.samples
        )
    }
}

// ---------------------------------------------------------------------------
// Tracing span names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// Stage initialization.
    pub const INITIALIZE: &str = "recruit::initialize";
    /// Eligibility check.
    pub const ELIGIBILITY: &str = "recruit::eligibility";
    /// Recruitment attempt.
    pub const ATTEMPT: &str = "recruit::attempt";
    /// Conversion to NPC.
    pub const CONVERT: &str = "recruit::convert";
    /// Damage on an NPC.
    pub const NPC_DAMAGE: &str = "recruit::npc_damage";
    /// Stage-clear finalization.
    pub const COMPLETE: &str = "recruit::complete";
    /// UI progress batch.
    pub const PROGRESS: &str = "recruit::progress";
    /// Monitor tick.
    pub const MONITOR_TICK: &str = "recruit::monitor";
    /// Roster save.
    pub const ROSTER_SAVE: &str = "recruit::roster::save";
    /// Roster load.
    pub const ROSTER_LOAD: &str = "recruit::roster::load";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_snapshot_and_export() {
        let c = RecruitCounters::new();
        assert_eq!(c.snapshot(), CounterSnapshot::default());
        RecruitCounters::bump(&c.conversions);
        RecruitCounters::bump(&c.conversions);
        RecruitCounters::bump(&c.recruited);
        let snap = c.snapshot();
        assert_eq!(snap.conversions, 2);
        assert_eq!(snap.recruited, 1);

        let prom = snap.to_prometheus();
        assert!(prom.contains("recruit_conversions_total 2"));
        assert!(prom.contains("# TYPE recruit_recruited_total counter"));
        assert!(prom.contains("# HELP"));
    }

    #[test]
    fn window_wraps_and_averages_retained_samples() {
        let w = SampleWindow::new(3);
        assert_eq!(w.average(), None);
        for v in [1.0, 2.0, 3.0, 10.0] {
            w.record(v);
        }
        assert_eq!(w.total_recorded(), 4);
        assert_eq!(w.last(), Some(10.0));
        // 1.0 was overwritten.
        assert!((w.average().expect("samples") - 5.0).abs() < 1e-9);

        w.clear();
        assert_eq!(w.average(), None);
        assert_eq!(w.last(), None);
    }

    #[test]
    fn percentiles_are_ordered() {
        let w = SampleWindow::new(100);
        for i in 0..100 {
            w.record(f64::from(i));
        }
        let p = w.percentiles();
        assert_eq!(p.samples, 100);
        assert!(p.p50 <= p.p95 && p.p95 <= p.max);
        assert!((p.max - 99.0).abs() < f64::EPSILON);
        assert!(p.summary("ms").contains("P95="));
    }

    #[test]
    fn timing_guard_records_once() {
        let w = SampleWindow::new(4);
        {
            let _guard = w.time();
        }
        assert_eq!(w.total_recorded(), 1);
        assert!(w.last().expect("sample") >= 0.0);
    }

    #[test]
    fn span_names_are_namespaced() {
        for name in [spans::ELIGIBILITY, spans::ATTEMPT, spans::CONVERT, spans::COMPLETE] {
            assert!(name.starts_with("recruit::"));
        }
    }
}
