//! Performance monitor: rolling samples, threshold alerts, self-tuning.
//!
//! Operations record timings into per-metric [`SampleWindow`]s. Every
//! `evaluation_interval_ticks` the monitor averages each window, raises
//! alerts against the configured thresholds and, with auto-optimization on,
//! runs the highest-priority corrective actions through an
//! [`OptimizationTarget`]. It never blocks or rejects recruitment work, and
//! a disabled monitor does nothing at all.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{MonitorConfig, Threshold};
use crate::metrics::{SampleWindow, TimingGuard, WindowPercentiles};

// ---------------------------------------------------------------------------
// Metrics & alerts
// ---------------------------------------------------------------------------

/// A sampled quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// One eligibility check, ms.
    ConditionCheckTime,
    /// One conversion to NPC, ms.
    NpcConversionTime,
    /// One UI progress batch, ms.
    UiUpdateTime,
    /// Recruitment work per frame, ms.
    FrameImpact,
    /// Cache hit ratio, 0..=1.
    CacheHitRatio,
    /// Estimated engine memory, bytes.
    MemoryUsage,
}

impl Metric {
    /// Every metric, in window order.
    pub const ALL: [Self; 6] = [
        Self::ConditionCheckTime,
        Self::NpcConversionTime,
        Self::UiUpdateTime,
        Self::FrameImpact,
        Self::CacheHitRatio,
        Self::MemoryUsage,
    ];

    fn index(self) -> usize {
        match self {
            Self::ConditionCheckTime => 0,
            Self::NpcConversionTime => 1,
            Self::UiUpdateTime => 2,
            Self::FrameImpact => 3,
            Self::CacheHitRatio => 4,
            Self::MemoryUsage => 5,
        }
    }

    /// Unit suffix for summaries.
    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Self::CacheHitRatio => "",
            Self::MemoryUsage => "B",
            _ => "ms",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConditionCheckTime => "condition_check_time",
            Self::NpcConversionTime => "npc_conversion_time",
            Self::UiUpdateTime => "ui_update_time",
            Self::FrameImpact => "frame_impact",
            Self::CacheHitRatio => "cache_hit_ratio",
            Self::MemoryUsage => "memory_usage",
        };
        f.write_str(s)
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Worth knowing; no action taken.
    Info,
    /// Over the warning threshold.
    Warning,
    /// Over the critical threshold.
    Critical,
}

impl AlertSeverity {
    fn weight(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }
}

/// One threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Metric that breached.
    pub metric: Metric,
    /// How badly.
    pub severity: AlertSeverity,
    /// Window average at evaluation.
    pub value: f64,
    /// Threshold that was crossed.
    pub threshold: f64,
    /// Monitor tick of evaluation.
    pub tick: u64,
}

impl Alert {
    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> String {
        let unit = self.metric.unit();
        if self.metric == Metric::CacheHitRatio {
            format!(
                "{} at {:.2}, below {:.2}",
                self.metric, self.value, self.threshold
            )
        } else {
            format!(
                "{} averaging {:.2}{unit}, threshold {:.2}{unit}",
                self.metric, self.value, self.threshold
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Optimization actions
// ---------------------------------------------------------------------------

/// A corrective measure the monitor can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationAction {
    /// Reduce condition-cache capacity.
    ShrinkCache,
    /// Refresh fewer UI indicators per call.
    ReduceBatchSize,
    /// Pause non-critical work (UI progress refreshes).
    DeferNonCritical,
    /// Drop every transient buffer that can be rebuilt.
    ForceCleanup,
}

impl OptimizationAction {
    /// Base priority; higher runs first among equal severities.
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::ForceCleanup => 4,
            Self::ShrinkCache => 3,
            Self::ReduceBatchSize => 2,
            Self::DeferNonCritical => 1,
        }
    }

    fn for_alert(alert: &Alert) -> &'static [Self] {
        use AlertSeverity::{Critical, Info, Warning};
        match (alert.metric, alert.severity) {
            (_, Info) | (Metric::CacheHitRatio, _) => &[],
            (Metric::MemoryUsage, Warning) => &[Self::ShrinkCache],
            (Metric::MemoryUsage, Critical) => &[Self::ForceCleanup, Self::ShrinkCache],
            (Metric::ConditionCheckTime | Metric::UiUpdateTime, Warning) => {
                &[Self::ReduceBatchSize]
            }
            (Metric::ConditionCheckTime | Metric::UiUpdateTime, Critical) => {
                &[Self::ReduceBatchSize, Self::DeferNonCritical]
            }
            (Metric::FrameImpact, _) => &[Self::DeferNonCritical],
            (Metric::NpcConversionTime, Warning) => &[Self::ShrinkCache],
            (Metric::NpcConversionTime, Critical) => &[Self::ForceCleanup],
        }
    }
}

/// Whatever owns the tunable buffers. Each method reports whether it
/// changed anything.
pub trait OptimizationTarget {
    /// Shrink the condition cache.
    fn shrink_cache(&mut self) -> bool;
    /// Lower the UI batch size.
    fn reduce_batch_size(&mut self) -> bool;
    /// Start deferring non-critical work.
    fn defer_non_critical(&mut self) -> bool;
    /// Stop deferring non-critical work. Called once metrics are healthy again.
    fn resume_non_critical(&mut self) -> bool;
    /// Drop rebuildable transient state.
    fn force_cleanup(&mut self) -> bool;
}

/// An action the monitor executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Which action.
    pub action: OptimizationAction,
    /// Whether the target changed anything.
    pub applied: bool,
}

/// What one [`PerformanceMonitor::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Monitor tick number.
    pub tick: u64,
    /// Whether this tick ran an evaluation.
    pub evaluated: bool,
    /// Alerts raised.
    pub alerts: Vec<Alert>,
    /// Actions executed, highest priority first.
    pub actions: Vec<ActionRecord>,
    /// Whether deferred work was resumed.
    pub resumed: bool,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Samples, evaluates, and tunes.
#[derive(Debug)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    windows: Vec<SampleWindow>,
    history: VecDeque<Alert>,
    ticks: u64,
}

impl PerformanceMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        let windows = Metric::ALL
            .iter()
            .map(|_| SampleWindow::new(config.window_size))
            .collect();
        Self {
            config,
            windows,
            history: VecDeque::new(),
            ticks: 0,
        }
    }

    /// Whether sampling and evaluation happen at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Record one sample. No-op when disabled or the value is not finite.
    pub fn record(&self, metric: Metric, value: f64) {
        if self.config.enabled && value.is_finite() {
            self.windows[metric.index()].record(value);
        }
    }

    /// Time a scope into `metric`'s window. `None` when disabled.
    #[must_use]
    pub fn time(&self, metric: Metric) -> Option<TimingGuard<'_>> {
        self.config
            .enabled
            .then(|| self.windows[metric.index()].time())
    }

    /// Current window average.
    #[must_use]
    pub fn average(&self, metric: Metric) -> Option<f64> {
        self.windows[metric.index()].average()
    }

    /// Current window percentiles.
    #[must_use]
    pub fn percentiles(&self, metric: Metric) -> WindowPercentiles {
        self.windows[metric.index()].percentiles()
    }

    /// Alert history, oldest first.
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.history.iter()
    }

    /// Ticks seen so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance one tick, evaluating when the interval comes round.
    pub fn tick(&mut self, target: &mut impl OptimizationTarget) -> TickReport {
        if !self.config.enabled {
            return TickReport::default();
        }
        self.ticks += 1;
        if self.ticks % self.config.evaluation_interval_ticks.max(1) != 0 {
            return TickReport {
                tick: self.ticks,
                ..TickReport::default()
            };
        }
        self.evaluate(target)
    }

    /// Evaluate immediately, regardless of the interval.
    pub fn evaluate(&mut self, target: &mut impl OptimizationTarget) -> TickReport {
        let mut report = TickReport {
            tick: self.ticks,
            evaluated: true,
            ..TickReport::default()
        };
        if !self.config.enabled {
            report.evaluated = false;
            return report;
        }

        for metric in Metric::ALL {
            if let Some(alert) = self.check(metric) {
                log_alert(&alert);
                report.alerts.push(alert);
            }
        }
        for alert in &report.alerts {
            if self.history.len() >= self.config.alert_history.max(1) {
                self.history.pop_front();
            }
            self.history.push_back(alert.clone());
        }

        if !self.config.auto_optimize {
            return report;
        }

        let mut candidates: Vec<(u8, OptimizationAction)> = Vec::new();
        for alert in &report.alerts {
            for &action in OptimizationAction::for_alert(alert) {
                let score = alert.severity.weight() * 10 + action.priority();
                match candidates.iter_mut().find(|(_, a)| *a == action) {
                    Some(existing) => existing.0 = existing.0.max(score),
                    None => candidates.push((score, action)),
                }
            }
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, action) in candidates.into_iter().take(self.config.max_actions_per_tick) {
            let applied = match action {
                OptimizationAction::ShrinkCache => target.shrink_cache(),
                OptimizationAction::ReduceBatchSize => target.reduce_batch_size(),
                OptimizationAction::DeferNonCritical => target.defer_non_critical(),
                OptimizationAction::ForceCleanup => target.force_cleanup(),
            };
            info!(action = ?action, applied, tick = self.ticks, "Optimization action");
            report.actions.push(ActionRecord { action, applied });
        }

        let healthy = report
            .alerts
            .iter()
            .all(|a| a.severity == AlertSeverity::Info);
        if healthy {
            report.resumed = target.resume_non_critical();
            if report.resumed {
                debug!(tick = self.ticks, "Non-critical work resumed");
            }
        }
        report
    }

    fn check(&self, metric: Metric) -> Option<Alert> {
        let value = self.average(metric)?;
        let t = &self.config.thresholds;
        if metric == Metric::CacheHitRatio {
            return (value < t.min_cache_hit_ratio).then(|| Alert {
                metric,
                severity: AlertSeverity::Info,
                value,
                threshold: t.min_cache_hit_ratio,
                tick: self.ticks,
            });
        }
        let Threshold { warning, critical } = match metric {
            Metric::ConditionCheckTime => t.condition_check_ms,
            Metric::NpcConversionTime => t.npc_conversion_ms,
            Metric::UiUpdateTime => t.ui_update_ms,
            Metric::FrameImpact => t.frame_impact_ms,
            Metric::MemoryUsage => t.memory_bytes,
            Metric::CacheHitRatio => return None,
        };
        let (severity, threshold) = if value >= critical {
            (AlertSeverity::Critical, critical)
        } else if value >= warning {
            (AlertSeverity::Warning, warning)
        } else {
            return None;
        };
        Some(Alert {
            metric,
            severity,
            value,
            threshold,
            tick: self.ticks,
        })
    }

    /// Forget samples and alert history.
    pub fn reset(&mut self) {
        for w in &self.windows {
            w.clear();
        }
        self.history.clear();
        self.ticks = 0;
    }

    /// Multi-line summary of every non-empty window.
    #[must_use]
    pub fn summary(&self) -> String {
        Metric::ALL
            .iter()
            .filter_map(|&m| {
                let p = self.percentiles(m);
                (p.samples > 0).then(|| format!("{m}: {}", p.summary(m.unit())))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn log_alert(alert: &Alert) {
    let message = alert.message();
    match alert.severity {
        AlertSeverity::Info => info!(metric = %alert.metric, tick = alert.tick, "{message}"),
        AlertSeverity::Warning => warn!(metric = %alert.metric, tick = alert.tick, "{message}"),
        AlertSeverity::Critical => error!(metric = %alert.metric, tick = alert.tick, "{message}"),
    }
}
