use std::time::Duration;

/// The per-claim deletion latencies observed during one run.
///
/// Order is irrelevant. Statistics sort a copy so the sample itself is never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencySample {
    latencies: Vec<Duration>,
}

/// Summary statistics for a non-empty [LatencySample].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: usize,
    pub avg: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
}

impl LatencySample {
    pub fn new(latencies: Vec<Duration>) -> Self {
        Self { latencies }
    }

    pub fn len(&self) -> usize {
        self.latencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty()
    }

    pub fn as_slice(&self) -> &[Duration] {
        &self.latencies
    }

    /// Nearest-rank percentile.
    ///
    /// The value at index `floor(p * n / 100)` of the ascending sample, clamped to the last
    /// element. Returns zero for an empty sample.
    pub fn percentile(&self, p: u32) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();

        let n = sorted.len();
        let idx = (p as usize * n / 100).min(n - 1);
        sorted[idx]
    }

    /// Arithmetic mean, zero for an empty sample.
    pub fn average(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = self.latencies.iter().sum();
        total / self.latencies.len() as u32
    }

    /// `None` when nothing was observed, so that callers report that case explicitly rather than
    /// presenting zero latency.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.latencies.is_empty() {
            return None;
        }

        Some(LatencyStats {
            count: self.latencies.len(),
            avg: self.average(),
            p50: self.percentile(50),
            p90: self.percentile(90),
            p99: self.percentile(99),
        })
    }
}

impl From<Vec<Duration>> for LatencySample {
    fn from(latencies: Vec<Duration>) -> Self {
        Self::new(latencies)
    }
}
