use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregator::{Aggregator, Report};
use crate::config::RunConfig;
use crate::prober::Target;
use crate::scheduler::Prober;
use crate::subscribe::TargetDescriptor;
use crate::util::parse_host_port;

/// Port used for `--target` endpoints given without one.
pub const DEFAULT_PORT: u16 = 443;

/// Turn descriptors and `host:port` endpoints into targets. Bad entries are skipped.
pub fn build_targets(descriptors: &[TargetDescriptor], endpoints: &[String], cfg: &RunConfig) -> Vec<Arc<Target>> {
    let from_subscription = descriptors.iter().filter_map(|desc| match Target::from_descriptor(desc, cfg) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!(error = %e, "skip target");
            None
        }
    });

    let direct = endpoints.iter().filter_map(|endpoint| match parse_host_port(endpoint, DEFAULT_PORT) {
        Ok((host, port)) => Some(Target::tcp(endpoint.trim(), host, port, cfg)),
        Err(e) => {
            warn!(error = %e, "skip target");
            None
        }
    });

    from_subscription.chain(direct).map(Arc::new).collect()
}

/// Probe every target concurrently and aggregate the results.
///
/// `stop` ends the run early. Returns once the aggregator is done and every prober task has exited.
pub async fn run(targets: Vec<Arc<Target>>, cfg: &RunConfig, stop: CancellationToken) -> Report {
    let expected = targets.len();
    let deadline = cfg.deadline(expected);
    let probes = stop.child_token();
    // one slot per prober so no send ever waits on the aggregator
    let (tx, rx) = mpsc::channel(expected.max(1));

    info!(targets = expected, deadline = ?deadline, "start run");

    let mut tasks = JoinSet::new();
    for target in targets {
        tasks.spawn(Prober::new(target).run(tx.clone(), probes.clone()));
    }
    drop(tx);

    let report = Aggregator::new(rx, expected, deadline, stop, probes).run().await;

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "prober task failed");
        }
    }
    report
}
