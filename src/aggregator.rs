//! Collects prober results and keeps the fastest one.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::result::ProbeResult;

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every expected result (or every result still obtainable) arrived.
    Fastest(ProbeResult),
    /// All probers went away without reporting.
    NoResult,
    /// The overall deadline elapsed first. `best` is the best result seen up to then.
    TimedOut {
        after: Duration,
        best: Option<ProbeResult>,
    },
    /// External stop requested.
    Stopped,
}

#[derive(Debug)]
pub struct Report {
    /// Results in the order they arrived.
    pub results: Vec<ProbeResult>,
    pub outcome: Outcome,
}

pub struct Aggregator {
    results: mpsc::Receiver<ProbeResult>,
    expected: usize,
    deadline: Option<Duration>,
    stop: CancellationToken,
    probes: CancellationToken,
}

impl Aggregator {
    /// `stop` is the external stop signal, `probes` is cancelled whenever the aggregator is done
    /// so that any prober still running exits.
    pub fn new(
        results: mpsc::Receiver<ProbeResult>,
        expected: usize,
        deadline: Option<Duration>,
        stop: CancellationToken,
        probes: CancellationToken,
    ) -> Self {
        Self {
            results,
            expected,
            deadline,
            stop,
            probes,
        }
    }

    pub async fn run(mut self) -> Report {
        let _guard = self.probes.clone().drop_guard();
        let mut received = Vec::with_capacity(self.expected);
        let mut best: Option<ProbeResult> = None;

        let limit = self.deadline;
        let deadline = async move {
            match limit {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        while received.len() < self.expected {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => {
                    debug!(received = received.len(), "stop requested");
                    return Report { results: received, outcome: Outcome::Stopped };
                }
                _ = &mut deadline => {
                    let after = limit.unwrap_or_default();
                    if let Some(b) = &best {
                        info!(after = ?after, best = %b.target, "deadline hit before every result arrived");
                    } else {
                        warn!(after = ?after, "deadline hit without any result");
                    }
                    return Report { results: received, outcome: Outcome::TimedOut { after, best } };
                }
                next = self.results.recv() => {
                    let Some(result) = next else {
                        // probers also exit on stop, their senders closing is not a result
                        if self.stop.is_cancelled() {
                            debug!(received = received.len(), "stop requested");
                            return Report { results: received, outcome: Outcome::Stopped };
                        }
                        debug!(received = received.len(), expected = self.expected, "all probers exited");
                        break;
                    };
                    debug!(target = %result.target, success = result.success, avg = ?result.avg(), "result received");
                    best = Some(select_faster(best, &result));
                    received.push(result);
                }
            }
        }

        let outcome = match best {
            Some(b) => Outcome::Fastest(b),
            None => Outcome::NoResult,
        };
        Report {
            results: received,
            outcome,
        }
    }
}

/// One step of the fastest-selection fold: the first candidate is taken unconditionally,
/// later ones only when they beat the current best.
pub fn select_faster(best: Option<ProbeResult>, candidate: &ProbeResult) -> ProbeResult {
    match best {
        Some(b) if !candidate.is_faster_than(&b) => b,
        _ => candidate.clone(),
    }
}
