use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting observer for acquisition loop events.
///
/// Keeps the loop free of any particular reporting mechanism; the server
/// installs a periodic `log` summary, tests install nothing.
pub trait PipelineLogger: Send {
    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. live track count).
    fn metric(&mut self, name: &str, value: f64);

    /// Mark the end of one processed (detected and tracked) frame.
    fn frame_done(&mut self);
}

/// Discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn frame_done(&mut self) {}
}

/// Aggregates stage timings and metrics over a window of processed frames
/// and emits one `info!` summary per window.
pub struct PeriodicPipelineLogger {
    every: usize,
    timings: BTreeMap<String, Vec<f64>>,
    metrics: BTreeMap<String, Vec<f64>>,
    frames: usize,
    window_start: Instant,
}

impl PeriodicPipelineLogger {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            frames: 0,
            window_start: Instant::now(),
        }
    }

    /// Summary of the current window, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.window_start.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Acquisition ({} frames, {:.1}s):",
            self.frames,
            elapsed_ms / 1000.0
        )];

        for (stage, durations) in &self.timings {
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:10}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms"
            ));
        }

        for (name, values) in &self.metrics {
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        if self.frames > 0 && elapsed_ms > 0.0 {
            let fps = self.frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(Vec::as_slice)
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(Vec::as_slice)
    }

    fn reset_window(&mut self) {
        self.timings.clear();
        self.metrics.clear();
        self.frames = 0;
        self.window_start = Instant::now();
    }
}

impl Default for PeriodicPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for PeriodicPipelineLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn frame_done(&mut self) {
        self.frames += 1;
        if self.frames >= self.every {
            if let Some(text) = self.summary_string() {
                log::info!("{text}");
            }
            self.reset_window();
        }
    }
}
