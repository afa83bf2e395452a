// src/progress.rs
//! Completion tracking with percentage and ETA output.

use std::time::{Duration, Instant};

/// Render at most once per this many completions...
const RENDER_EVERY_N: usize = 10;
/// ...unless this much wall time has passed since the last render.
const RENDER_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Point-in-time view of a run's progress. Derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub elapsed_secs: f64,
    /// None until at least one completion has landed.
    pub eta_secs: Option<f64>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let pct = self.completed as f64 / self.total as f64 * 100.0;
            pct
        }
    }
}

/// Converts completion events into throttled percentage/ETA output.
///
/// ETA comes from the average completions-per-second since start, not the
/// last item's duration, so one slow file does not whipsaw the estimate.
#[derive(Debug)]
pub struct ProgressReporter {
    total: usize,
    completed: usize,
    started: Instant,
    last_render: Option<Instant>,
    renders_at: usize,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            started: Instant::now(),
            last_render: None,
            renders_at: RENDER_EVERY_N,
        }
    }

    pub fn on_completed(&mut self, n: usize) {
        self.completed = (self.completed + n).min(self.total);
    }

    /// True when the throttle allows output for the current state.
    /// The final completion always renders.
    pub fn should_render(&mut self) -> bool {
        if self.total == 0 {
            return false;
        }
        let due_by_count = self.completed >= self.renders_at;
        let due_by_time = self
            .last_render
            .map_or(true, |t| t.elapsed() >= RENDER_MIN_INTERVAL);
        let finished = self.completed == self.total;

        if finished || due_by_count || due_by_time {
            self.last_render = Some(Instant::now());
            self.renders_at = self.completed + RENDER_EVERY_N;
            return true;
        }
        false
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started.elapsed().as_secs_f64();
        let eta_secs = if self.total == 0 || self.completed == 0 {
            None
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.completed as f64 / elapsed.max(f64::EPSILON);
            #[allow(clippy::cast_precision_loss)]
            let remaining = (self.total - self.completed) as f64;
            Some(remaining / rate)
        };
        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            elapsed_secs: elapsed,
            eta_secs,
        }
    }

    /// One-line human rendering, e.g. `42/120 (35.0%) eta 12s`.
    #[must_use]
    pub fn render_line(&self) -> String {
        let snap = self.snapshot();
        match snap.eta_secs {
            Some(eta) => format!(
                "{}/{} ({:.1}%) eta {:.0}s",
                snap.completed,
                snap.total,
                snap.percent(),
                eta
            ),
            None => format!("{}/{} ({:.1}%)", snap.completed, snap.total, snap.percent()),
        }
    }
}
