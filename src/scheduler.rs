use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::prober::{Connector, TcpConnector, Target};
use crate::result::ProbeResult;

/// tokio intervals cannot tick at zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Runs the probes of one target on a fixed interval and sends its result once.
pub struct Prober<C = TcpConnector> {
    target: Arc<Target>,
    interval: Duration,
    connector: C,
}

impl Prober {
    pub fn new(target: Arc<Target>) -> Self {
        Self::with_connector(target, TcpConnector)
    }
}

impl<C: Connector> Prober<C> {
    pub fn with_connector(target: Arc<Target>, connector: C) -> Self {
        let interval = target.interval.max(MIN_INTERVAL);
        Self {
            target,
            interval,
            connector,
        }
    }

    fn finished(&self, result: &ProbeResult) -> bool {
        self.target.counter != 0 && result.total >= self.target.counter
    }

    /// Ticks every `interval`, first tick one full interval after start.
    /// Each tick runs one probe, or sends the result once `counter` probes are done.
    /// Returns without sending anything when `cancel` fires.
    pub async fn run(self, results: mpsc::Sender<ProbeResult>, cancel: CancellationToken) {
        let target = self.target.clone();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut result = ProbeResult::new(target.clone());

        info!(target = %target, counter = target.counter, "start probing");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(target = %target, probed = result.total, "probing cancelled, result dropped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if self.finished(&result) {
                info!(
                    target = %target,
                    success = result.success,
                    failed = result.failed(),
                    avg = ?result.avg(),
                    "probing finished"
                );
                if results.send(result).await.is_err() {
                    debug!(target = %target, "aggregator gone, result dropped");
                }
                return;
            }

            let attempt = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(target = %target, probed = result.total, "probing cancelled mid-attempt, result dropped");
                    return;
                }
                attempt = self.connector.connect(&target) => attempt,
            };

            match attempt {
                Ok(connected) => {
                    debug!(target = %target, peer = %connected.peer, time = ?connected.elapsed, "connected");
                    result.record_success(connected.elapsed);
                }
                Err(e) => {
                    debug!(target = %target, error = %e, "probe failed");
                    result.record_failure();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::prober::tcp_connect::{connect_within, Connected, ProbeError};
    use std::future::Future;
    use std::io::ErrorKind;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn listener() -> Option<TcpListener> {
        match TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => Some(l),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => None,
            Err(e) => panic!("Failed to bind test listener: {e}"),
        }
    }

    fn target(port: u16, counter: u32, interval: Duration, timeout: Duration) -> Arc<Target> {
        let run = RunConfig {
            counter,
            interval,
            timeout,
        };
        Arc::new(Target::tcp("local", "127.0.0.1", port, &run))
    }

    /// Connects that never complete, so every attempt runs into the target's timeout.
    struct Stalled;

    impl Connector for Stalled {
        fn connect(&self, target: &Target) -> impl Future<Output = Result<Connected, ProbeError>> + Send {
            connect_within(target.timeout, std::future::pending())
        }
    }

    #[tokio::test]
    async fn test_prober_emits_once_after_counter_attempts() {
        let Some(listener) = listener().await else { return };
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let (tx, mut rx) = mpsc::channel(1);
        let prober = Prober::new(target(port, 3, Duration::from_millis(10), Duration::from_secs(1)));
        let started = Instant::now();
        let handle = tokio::spawn(prober.run(tx, CancellationToken::new()));

        let result = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .expect("prober should emit a result");
        // three probe ticks plus the emitting tick
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(result.total, 3);
        assert_eq!(result.success, 3);
        assert!(result.min_duration <= result.max_duration);

        handle.await.unwrap();
        // the sender is gone once the prober finished, nothing else arrives
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_prober_counts_failures() {
        let Some(listener) = listener().await else { return };
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::channel(1);
        let prober = Prober::new(target(port, 2, Duration::from_millis(10), Duration::from_millis(50)));
        tokio::spawn(prober.run(tx, CancellationToken::new()));

        let result = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.success, 0);
        assert_eq!(result.failed(), 2);
        assert_eq!(result.avg(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_prober_unbounded_only_stops_on_cancel() {
        let Some(listener) = listener().await else { return };
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let prober = Prober::new(target(port, 0, Duration::from_millis(5), Duration::from_secs(1)));
        let handle = tokio::spawn(prober.run(tx, cancel.clone()));

        // plenty of ticks pass without a result
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

        cancel.cancel();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_prober_cancel_drops_partial_result() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let prober = Prober::new(target(9, 5, Duration::from_millis(30), Duration::from_millis(10)));
        let handle = tokio::spawn(prober.run(tx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prober_waits_one_interval_before_first_attempt() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let prober = Prober::new(target(9, 1, Duration::from_secs(60), Duration::from_millis(10)));
        let handle = tokio::spawn(prober.run(tx, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(rx.try_recv().is_err());
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempts_count_as_failures() {
        let timeout_limit = Duration::from_millis(50);
        let (tx, mut rx) = mpsc::channel(1);
        let task = Prober::with_connector(target(9, 2, Duration::from_millis(10), timeout_limit), Stalled);
        let started = Instant::now();
        tokio::spawn(task.run(tx, CancellationToken::new()));

        let result = rx.recv().await.expect("a result after two attempts");
        assert_eq!(result.total, 2);
        assert_eq!(result.success, 0);
        assert_eq!(result.failed(), 2);
        assert_eq!(result.avg(), Duration::ZERO);
        assert!(started.elapsed() >= timeout_limit * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_stalled_attempt() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = Prober::with_connector(target(9, 1, Duration::from_millis(10), Duration::from_secs(60)), Stalled);
        let handle = tokio::spawn(task.run(tx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
