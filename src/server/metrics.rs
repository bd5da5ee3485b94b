//! Serving and retraining metrics, exposed as a pull-based text exposition.
//!
//! Every value is updated through atomic primitives; readers never block
//! writers and no lock is held across I/O.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Instant;

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gauge holding an f64 as raw bits
#[derive(Debug)]
pub struct Gauge(AtomicU64);

impl Default for Gauge {
    fn default() -> Self {
        Self(AtomicU64::new(0.0_f64.to_bits()))
    }
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::SeqCst);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Latency histogram with fixed upper bounds (seconds). The final implicit
/// bucket is +Inf.
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bounds: Vec<f64>) -> Self {
        let counts = (0..bounds.len() + 1).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum_bits: AtomicU64::new(0.0_f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        let idx = self.bounds.partition_point(|b| value > *b);
        self.counts[idx].fetch_add(1, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }
}

/// Lock-free ring of recent fraud/legitimate outcomes backing the rolling
/// fraud-rate gauge.
#[derive(Debug)]
pub struct FraudRateWindow {
    slots: Vec<AtomicU8>,
    head: AtomicUsize,
    positives: AtomicI64,
}

impl FraudRateWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            head: AtomicUsize::new(0),
            positives: AtomicI64::new(0),
        }
    }

    pub fn observe(&self, is_fraud: bool) {
        let seq = self.head.fetch_add(1, Ordering::SeqCst);
        let slot = &self.slots[seq % self.slots.len()];
        let new = is_fraud as u8;
        let old = slot.swap(new, Ordering::SeqCst);
        self.positives
            .fetch_add(new as i64 - old as i64, Ordering::SeqCst);
    }

    /// Fraction of the most recent observations that were fraud
    pub fn rate(&self) -> f64 {
        let seen = self.head.load(Ordering::Relaxed).min(self.slots.len());
        if seen == 0 {
            return 0.0;
        }
        self.positives.load(Ordering::Relaxed).max(0) as f64 / seen as f64
    }
}

/// All counters, gauges, and the latency histogram for the serving process
#[derive(Debug)]
pub struct MetricsRegistry {
    /// Successful prediction responses
    pub predictions_total: Counter,
    /// Request failures by error kind
    pub input_errors: Counter,
    pub schema_errors: Counter,
    pub prediction_errors: Counter,
    /// Rolling fraction of recent responses scored as fraud
    pub fraud_rate: Gauge,
    fraud_window: FraudRateWindow,
    /// Wall-clock duration of the full predict path
    pub prediction_latency: Histogram,
    /// Version of the currently active model
    pub model_version: Gauge,
    /// Retraining outcomes
    pub retrain_success_total: Counter,
    pub retrain_fetch_failures: Counter,
    pub retrain_train_failures: Counter,
    pub retrain_publish_failures: Counter,
    pub retrain_cancellations: Counter,
    started_at: Instant,
}

const LATENCY_BOUNDS: [f64; 11] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

impl MetricsRegistry {
    pub fn new(fraud_window: usize) -> Self {
        Self {
            predictions_total: Counter::default(),
            input_errors: Counter::default(),
            schema_errors: Counter::default(),
            prediction_errors: Counter::default(),
            fraud_rate: Gauge::default(),
            fraud_window: FraudRateWindow::new(fraud_window),
            prediction_latency: Histogram::new(LATENCY_BOUNDS.to_vec()),
            model_version: Gauge::default(),
            retrain_success_total: Counter::default(),
            retrain_fetch_failures: Counter::default(),
            retrain_train_failures: Counter::default(),
            retrain_publish_failures: Counter::default(),
            retrain_cancellations: Counter::default(),
            started_at: Instant::now(),
        }
    }

    /// Record a successful prediction and refresh the fraud-rate gauge
    pub fn record_success(&self, is_fraud: bool) {
        self.predictions_total.inc();
        self.fraud_window.observe(is_fraud);
        self.fraud_rate.set(self.fraud_window.rate());
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Render every metric in a stable text exposition
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);

        writeln!(out, "# HELP predictions_total Successful prediction responses").ok();
        writeln!(out, "# TYPE predictions_total counter").ok();
        writeln!(out, "predictions_total {}", self.predictions_total.get()).ok();

        writeln!(out, "# HELP error_count Number of API errors by kind").ok();
        writeln!(out, "# TYPE error_count counter").ok();
        writeln!(out, "error_count{{kind=\"input\"}} {}", self.input_errors.get()).ok();
        writeln!(out, "error_count{{kind=\"schema\"}} {}", self.schema_errors.get()).ok();
        writeln!(
            out,
            "error_count{{kind=\"prediction\"}} {}",
            self.prediction_errors.get()
        )
        .ok();

        writeln!(out, "# HELP fraud_rate Fraction of recent predictions scored as fraud").ok();
        writeln!(out, "# TYPE fraud_rate gauge").ok();
        writeln!(out, "fraud_rate {}", self.fraud_rate.get()).ok();

        writeln!(out, "# HELP prediction_latency_seconds Prediction latency in seconds").ok();
        writeln!(out, "# TYPE prediction_latency_seconds histogram").ok();
        let mut cumulative = 0u64;
        for (bound, count) in self
            .prediction_latency
            .bounds
            .iter()
            .zip(&self.prediction_latency.counts)
        {
            cumulative += count.load(Ordering::Relaxed);
            writeln!(
                out,
                "prediction_latency_seconds_bucket{{le=\"{}\"}} {}",
                bound, cumulative
            )
            .ok();
        }
        writeln!(
            out,
            "prediction_latency_seconds_bucket{{le=\"+Inf\"}} {}",
            self.prediction_latency.count()
        )
        .ok();
        writeln!(
            out,
            "prediction_latency_seconds_sum {}",
            self.prediction_latency.sum()
        )
        .ok();
        writeln!(
            out,
            "prediction_latency_seconds_count {}",
            self.prediction_latency.count()
        )
        .ok();

        writeln!(out, "# HELP model_version Version of the active model").ok();
        writeln!(out, "# TYPE model_version gauge").ok();
        writeln!(out, "model_version {}", self.model_version.get()).ok();

        writeln!(out, "# HELP retrain_success_total Completed retraining jobs").ok();
        writeln!(out, "# TYPE retrain_success_total counter").ok();
        writeln!(out, "retrain_success_total {}", self.retrain_success_total.get()).ok();

        writeln!(out, "# HELP retrain_failures_total Failed retraining jobs by stage").ok();
        writeln!(out, "# TYPE retrain_failures_total counter").ok();
        writeln!(
            out,
            "retrain_failures_total{{stage=\"fetch\"}} {}",
            self.retrain_fetch_failures.get()
        )
        .ok();
        writeln!(
            out,
            "retrain_failures_total{{stage=\"train\"}} {}",
            self.retrain_train_failures.get()
        )
        .ok();
        writeln!(
            out,
            "retrain_failures_total{{stage=\"publish\"}} {}",
            self.retrain_publish_failures.get()
        )
        .ok();
        writeln!(
            out,
            "retrain_failures_total{{stage=\"cancelled\"}} {}",
            self.retrain_cancellations.get()
        )
        .ok();

        writeln!(out, "# HELP uptime_seconds Seconds since process start").ok();
        writeln!(out, "# TYPE uptime_seconds gauge").ok();
        writeln!(out, "uptime_seconds {}", self.uptime_secs()).ok();

        out
    }
}
