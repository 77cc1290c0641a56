mod aggregator;
mod config;
mod prober;
mod report;
mod result;
mod runner;
mod scheduler;
mod subscribe;
mod util;

use clap::Parser;
use config::Cli;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let log_level = cli.get_tracing_level()?;

    // Logs go to stderr, stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
                         .add_directive(format!("node_probe={}", log_level.as_str().to_lowercase()).parse()?))
        .init();

    if cli.source.is_none() && cli.targets.is_empty() {
        anyhow::bail!("nothing to probe, give a subscription source or at least one --target");
    }

    let run_cfg = cli.run_config();

    let descriptors = match &cli.source {
        Some(source) => match subscribe::load(source).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                println!("can not subscribe '{}', err: {}", source, e);
                return Ok(ExitCode::FAILURE);
            }
        },
        None => Vec::new(),
    };
    info!(descriptors = descriptors.len(), "subscription loaded");

    let targets = runner::build_targets(&descriptors, &cli.targets, &run_cfg);
    if targets.is_empty() {
        println!("can not load targets, see the debug log");
        return Ok(ExitCode::FAILURE);
    }

    if !cli.json {
        for target in &targets {
            println!("Start probing '{}'", target);
        }
    }

    let stop = CancellationToken::new();
    tokio::spawn(watch_signals(stop.clone()));

    let report = runner::run(targets, &run_cfg, stop).await;

    if cli.json {
        match report::render_json(&report, &run_cfg) {
            Ok(json) => println!("{json}"),
            Err(e) => error!(error = %e, "render report failed"),
        }
    } else {
        print!("{}", report::render_text(&report, cli.all));
    }

    Ok(report::exit_code(&report.outcome))
}

/// Cancel `stop` on Ctrl-C or SIGTERM.
async fn watch_signals(stop: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "can not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "can not listen for ctrl-c");
                return;
            }
        }
        _ = terminate => {}
    }
    info!("stop requested");
    stop.cancel();
}
