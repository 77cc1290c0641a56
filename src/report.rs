//! Text and JSON rendering of a finished run.

use serde::Serialize;
use std::fmt::Write;
use std::process::ExitCode;

use crate::aggregator::{Outcome, Report};
use crate::config::RunConfig;
use crate::result::ProbeResult;

/// Process exit status for an outcome.
pub fn exit_code(outcome: &Outcome) -> ExitCode {
    match outcome {
        Outcome::Fastest(_) => ExitCode::SUCCESS,
        Outcome::NoResult => ExitCode::from(1),
        Outcome::TimedOut { .. } => ExitCode::from(2),
        Outcome::Stopped => ExitCode::from(130),
    }
}

pub fn render_text(report: &Report, all: bool) -> String {
    let mut out = String::new();
    if all {
        for result in &report.results {
            let _ = writeln!(out, "{result}");
        }
    }
    let _ = match &report.outcome {
        Outcome::Fastest(best) => writeln!(out, "\nfastest probe result: {best}"),
        Outcome::NoResult => writeln!(out, "no result"),
        Outcome::TimedOut { after, .. } => writeln!(out, "timeout: {after:?}, no result"),
        Outcome::Stopped => writeln!(out, "exit"),
    };
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    config: &'a RunConfig,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    deadline_ms: Option<u64>,
    fastest: Option<&'a ProbeResult>,
    results: &'a [ProbeResult],
}

pub fn render_json(report: &Report, config: &RunConfig) -> serde_json::Result<String> {
    let (outcome, deadline_ms, fastest) = match &report.outcome {
        Outcome::Fastest(best) => ("fastest", None, Some(best)),
        Outcome::NoResult => ("no_result", None, None),
        Outcome::TimedOut { after, best } => (
            "timeout",
            Some(u64::try_from(after.as_millis()).unwrap_or(u64::MAX)),
            best.as_ref(),
        ),
        Outcome::Stopped => ("stopped", None, None),
    };
    serde_json::to_string_pretty(&JsonReport {
        config,
        outcome,
        deadline_ms,
        fastest,
        results: &report.results,
    })
}
