//! Simulation metrics, split by what each engine call did.

use std::collections::{BTreeMap, VecDeque};

use channelpay_escrow::PayOutcome;

/// Latency samples kept per operation kind.
const WINDOW: usize = 4096;

/// What a successful engine call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    /// Payment held in escrow.
    PayLocked,
    /// Payment forwarded to a registered wallet.
    PayForwarded,
    /// Channel registration (with or without a release).
    Register,
}

impl OperationKind {
    /// Every kind, in report order.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::PayLocked,
        OperationKind::PayForwarded,
        OperationKind::Register,
    ];

    /// Label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::PayLocked => "pay-locked",
            OperationKind::PayForwarded => "pay-forwarded",
            OperationKind::Register => "register",
        }
    }
}

impl From<&PayOutcome> for OperationKind {
    fn from(outcome: &PayOutcome) -> Self {
        match outcome {
            PayOutcome::Locked { .. } => OperationKind::PayLocked,
            PayOutcome::Forwarded { .. } => OperationKind::PayForwarded,
        }
    }
}

/// Completed calls of one kind and their recent latencies.
#[derive(Debug, Clone, Default)]
pub struct KindStats {
    /// Calls completed.
    pub count: u64,
    samples: VecDeque<u64>,
}

impl KindStats {
    fn record(&mut self, latency_us: u64) {
        self.count += 1;
        if self.samples.len() >= WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_us);
    }

    /// Latency at `percentile` (0-100) over the sample window, in µs.
    pub fn percentile_us(&self, percentile: usize) -> u64 {
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        match sorted.len() {
            0 => 0,
            n => sorted[(n * percentile / 100).min(n - 1)],
        }
    }
}

/// Simulation metrics.
#[derive(Debug, Clone, Default)]
pub struct SimulationMetrics {
    by_kind: BTreeMap<OperationKind, KindStats>,
    failures: BTreeMap<&'static str, u64>,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful call.
    pub fn record_success(&mut self, kind: OperationKind, latency_us: u64) {
        self.by_kind.entry(kind).or_default().record(latency_us);
    }

    /// Record a failed call by its error code.
    pub fn record_failure(&mut self, code: &'static str) {
        *self.failures.entry(code).or_insert(0) += 1;
    }

    /// Stats for one kind of call.
    pub fn kind(&self, kind: OperationKind) -> KindStats {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    /// Failures with error code `code`.
    pub fn failures(&self, code: &str) -> u64 {
        self.failures.get(code).copied().unwrap_or(0)
    }

    /// Failure counts by error code.
    pub fn failures_by_code(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.failures.iter().map(|(code, count)| (*code, *count))
    }

    /// Successful calls.
    pub fn successful_operations(&self) -> u64 {
        self.by_kind.values().map(|stats| stats.count).sum()
    }

    /// Failed calls.
    pub fn failed_operations(&self) -> u64 {
        self.failures.values().sum()
    }

    /// All calls.
    pub fn total_operations(&self) -> u64 {
        self.successful_operations() + self.failed_operations()
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        match self.total_operations() {
            0 => 0.0,
            total => self.successful_operations() as f64 / total as f64,
        }
    }
}
