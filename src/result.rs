//! Per-target probe statistics and the fastest-selection rule.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::prober::{Protocol, Target};

/// Smallest latency a successful probe is recorded with, so `avg() == 0` always means "no success".
const MIN_RECORDED: Duration = Duration::from_nanos(1);

/// Statistics accumulated by one prober. Owned by that prober until it is sent to the aggregator.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub target: Arc<Target>,
    pub total: u32,
    pub success: u32,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub total_duration: Duration,
}

impl ProbeResult {
    pub fn new(target: Arc<Target>) -> Self {
        Self {
            target,
            total: 0,
            success: 0,
            min_duration: Duration::ZERO,
            max_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
        }
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        let elapsed = elapsed.max(MIN_RECORDED);
        self.total = self.total.saturating_add(1);
        if self.success == 0 {
            self.min_duration = elapsed;
            self.max_duration = elapsed;
        } else {
            self.min_duration = self.min_duration.min(elapsed);
            self.max_duration = self.max_duration.max(elapsed);
        }
        self.total_duration = self.total_duration.saturating_add(elapsed);
        self.success = self.success.saturating_add(1);
    }

    pub fn record_failure(&mut self) {
        self.total = self.total.saturating_add(1);
    }

    /// Mean latency of successful probes, zero when none succeeded.
    pub fn avg(&self) -> Duration {
        if self.success == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.success
    }

    pub fn failed(&self) -> u32 {
        self.total - self.success
    }

    /// Whether `self` should replace `best`: at least as many successes and a strictly lower average.
    ///
    /// Applied incrementally in arrival order, so the winner depends on that order when the two
    /// conditions disagree. A result without any success averages zero, so once it is the best
    /// nothing replaces it.
    pub fn is_faster_than(&self, best: &ProbeResult) -> bool {
        self.success >= best.success && self.avg() < best.avg()
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Probe statistics {}", self.target)?;
        writeln!(f, "\t{} probes sent.", self.total)?;
        writeln!(f, "\t{} successful, {} failed.", self.success, self.failed())?;
        writeln!(f, "Approximate trip times:")?;
        write!(
            f,
            "\tMinimum = {:?}, Maximum = {:?}, Average = {:?}",
            self.min_duration,
            self.max_duration,
            self.avg()
        )
    }
}

#[derive(Serialize)]
struct ResultView<'a> {
    name: &'a str,
    protocol: Protocol,
    host: &'a str,
    port: u16,
    total: u32,
    success: u32,
    failed: u32,
    min_ms: f64,
    max_ms: f64,
    avg_ms: f64,
}

fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

impl Serialize for ProbeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultView {
            name: &self.target.name,
            protocol: self.target.protocol,
            host: &self.target.host,
            port: self.target.port,
            total: self.total,
            success: self.success,
            failed: self.failed(),
            min_ms: as_ms(self.min_duration),
            max_ms: as_ms(self.max_duration),
            avg_ms: as_ms(self.avg()),
        }
        .serialize(serializer)
    }
}
