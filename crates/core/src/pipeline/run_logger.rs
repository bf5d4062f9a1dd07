use std::collections::HashMap;
use std::time::Instant;

use crate::pipeline::frame_processor::FrameReport;

/// Observer for tracking-run events.
///
/// Keeps the frame loop free of output decisions: the CLI logs through
/// the `log` facade, tests discard everything.
pub trait RunLogger: Send {
    /// Report frame-level progress. `total` is 0 when the length is unknown.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record the outcome of one processed frame.
    fn frame(&mut self, report: &FrameReport);

    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

pub struct NullRunLogger;

impl RunLogger for NullRunLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn frame(&mut self, _report: &FrameReport) {}
    fn info(&mut self, _message: &str) {}
}

/// Running totals over all frame reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub frames: usize,
    pub identities_created: usize,
    pub detections_recorded: usize,
    pub detections_skipped: usize,
    pub best_replaced: usize,
    pub evicted: usize,
}

/// Logs through the `log` crate: throttled progress, per-stage timings and
/// identity counters, with a summary at the end of the run.
pub struct LogRunLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    counters: RunCounters,
    start_time: Instant,
}

impl LogRunLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            counters: RunCounters::default(),
            start_time: Instant::now(),
        }
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    /// Returns the formatted summary, or `None` if no frame was seen.
    pub fn summary_string(&self) -> Option<String> {
        let c = self.counters;
        if c.frames == 0 {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Tracking summary ({} frames, {:.1}s total):",
            c.frames,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        lines.push(format!("  Identities created:  {}", c.identities_created));
        lines.push(format!("  Detections recorded: {}", c.detections_recorded));
        lines.push(format!("  Best image replaced: {}", c.best_replaced));
        if c.detections_skipped > 0 {
            lines.push(format!("  Detections skipped:  {}", c.detections_skipped));
        }
        if c.evicted > 0 {
            lines.push(format!("  Identities evicted:  {}", c.evicted));
        }

        Some(lines.join("\n"))
    }
}

impl Default for LogRunLogger {
    fn default() -> Self {
        Self::new(25)
    }
}

impl RunLogger for LogRunLogger {
    fn progress(&mut self, current: usize, total: usize) {
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Processing: {current}/{total} frames ({pct:.1}%)");
        } else {
            log::info!("Processing: {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn frame(&mut self, report: &FrameReport) {
        let c = &mut self.counters;
        c.frames += 1;
        c.identities_created += report.new_identities();
        c.detections_recorded += report.faces.len();
        c.detections_skipped += report.skipped.len();
        c.best_replaced += report
            .faces
            .iter()
            .filter(|f| !f.is_new && f.best_replaced)
            .count();
        c.evicted += report.evicted.len();
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
