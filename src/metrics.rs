//! Stage timings and prediction statistics for a single run.

use crate::types::{Label, Predictions};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Load,
    Read,
    Align,
    Preprocess,
    Predict,
    Write,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Read => "read",
            Stage::Align => "align",
            Stage::Preprocess => "preprocess",
            Stage::Predict => "predict",
            Stage::Write => "write",
        }
    }
}

/// Metrics collector for one prediction run
#[derive(Debug, Clone)]
pub struct RunMetrics {
    /// Wall time per stage
    stage_times: BTreeMap<Stage, Duration>,
    /// Rows sent through inference
    rows_processed: u64,
    /// Predicted label counts
    label_counts: BTreeMap<Label, u64>,
    /// Top-class probability distribution buckets
    confidence_buckets: [u64; 10],
    /// Start time for the total
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            stage_times: BTreeMap::new(),
            rows_processed: 0,
            label_counts: BTreeMap::new(),
            confidence_buckets: [0; 10],
            start_time: Instant::now(),
        }
    }

    /// Run `f` and add its wall time to `stage`
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record_stage(stage, start.elapsed());
        out
    }

    pub fn record_stage(&mut self, stage: Stage, elapsed: Duration) {
        *self.stage_times.entry(stage).or_default() += elapsed;
    }

    /// Record the labels and confidence of a batch of predictions
    pub fn record_predictions(&mut self, predictions: &Predictions) {
        self.rows_processed += predictions.n_rows() as u64;

        for label in &predictions.labels {
            *self.label_counts.entry(label.clone()).or_insert(0) += 1;
        }

        if let Some(top) = predictions.top_probabilities() {
            for p in top {
                let bucket = ((p as f64) * 10.0).clamp(0.0, 9.0) as usize;
                self.confidence_buckets[bucket] += 1;
            }
        }
    }

    pub fn rows_processed(&self) -> u64 {
        self.rows_processed
    }

    pub fn stage_time(&self, stage: Stage) -> Option<Duration> {
        self.stage_times.get(&stage).copied()
    }

    pub fn label_counts(&self) -> &BTreeMap<Label, u64> {
        &self.label_counts
    }

    pub fn confidence_distribution(&self) -> [u64; 10] {
        self.confidence_buckets
    }

    /// Rows per second over the predict stage
    pub fn throughput(&self) -> f64 {
        match self.stage_time(Stage::Predict) {
            Some(t) if t.as_secs_f64() > 0.0 => self.rows_processed as f64 / t.as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let total = self.start_time.elapsed();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║                 PREDICTION RUN - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Rows Processed: {:>10}  │  Throughput: {:>10.1} rows/s ║",
            self.rows_processed,
            self.throughput()
        );
        info!("║ Total Time: {:>10.3} ms", total.as_secs_f64() * 1000.0);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Stage Times (ms):                                            ║");
        for (stage, elapsed) in &self.stage_times {
            info!(
                "║   {:10}: {:>10.3}",
                stage.name(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Predicted Labels:                                            ║");
        for (label, count) in &self.label_counts {
            let pct = if self.rows_processed > 0 {
                (*count as f64 / self.rows_processed as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:10}: {:>8} ({:>5.1}%)", label.to_string(), count, pct);
        }

        let scored: u64 = self.confidence_buckets.iter().sum();
        if scored > 0 {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Top-Class Probability Distribution:                          ║");
            for (i, &count) in self.confidence_buckets.iter().enumerate() {
                let pct = (count as f64 / scored as f64) * 100.0;
                let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
                info!(
                    "║   {:.1}-{:.1}: {:>8} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
