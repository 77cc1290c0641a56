use anyhow::Result;
use clap::Parser;
use serde::{Serialize, Serializer};
use std::time::Duration;

const DEFAULT_COUNTER: u32 = 4;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Attempt policy applied to every target of a run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RunConfig {
    pub counter: u32,
    #[serde(rename = "timeout_ms", serialize_with = "as_millis")]
    pub timeout: Duration,
    #[serde(rename = "interval_ms", serialize_with = "as_millis")]
    pub interval: Duration,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            counter: DEFAULT_COUNTER,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl RunConfig {
    /// Upper bound for a whole run: every attempt of every target timing out.
    /// `None` when targets probe without limit.
    pub fn deadline(&self, targets: usize) -> Option<Duration> {
        if self.counter == 0 {
            return None;
        }
        let attempts = u32::try_from(targets)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.counter);
        Some(self.timeout.saturating_mul(attempts))
    }
}

/// Probe the nodes of a subscription (or plain host:port endpoints) and report the fastest.
#[derive(Debug, Parser)]
#[command(name = "node-probe", version)]
pub struct Cli {
    /// Subscription URL (http/https) or path to a file holding a subscription
    pub source: Option<String>,

    /// Probe HOST:PORT directly, may be repeated
    #[arg(short = 't', long = "target", value_name = "HOST:PORT")]
    pub targets: Vec<String>,

    /// Attempts per target, 0 probes until interrupted
    #[arg(short = 'c', long, default_value_t = DEFAULT_COUNTER)]
    pub counter: u32,

    /// Connect timeout: "ns", "us" (or "µs"), "ms", "s", "m", "h", plain numbers are milliseconds
    #[arg(short = 'T', long, default_value = "1s", value_parser = parse_duration_arg)]
    pub timeout: Duration,

    /// Probe interval: "ns", "us" (or "µs"), "ms", "s", "m", "h", plain numbers are milliseconds
    #[arg(short = 'I', long, default_value = "500ms", value_parser = parse_interval_arg)]
    pub interval: Duration,

    /// Print every per-target result, not only the fastest
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the debug log
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Log level when --debug is not given
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            counter: self.counter,
            timeout: self.timeout,
            interval: self.interval,
        }
    }

    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level> {
        if self.debug {
            return Ok(tracing::Level::DEBUG);
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(anyhow::anyhow!("Invalid log level: {}. Valid levels are: trace, debug, info, warn, error", self.log_level))
        }
    }
}

/// Plain integers are milliseconds, anything else goes through humantime.
pub fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(&s.replace('µ', "u")).map_err(|e| e.to_string())
}

fn parse_interval_arg(s: &str) -> Result<Duration, String> {
    let d = parse_duration_arg(s)?;
    if d.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_arg() {
        assert_eq!(parse_duration_arg("250"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration_arg("1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration_arg("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration_arg("20µs"), Ok(Duration::from_micros(20)));
        assert_eq!(parse_duration_arg("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration_arg("soon").is_err());
        assert!(parse_interval_arg("0").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["node-probe", "https://example.com/sub"]).unwrap();
        assert_eq!(cli.source.as_deref(), Some("https://example.com/sub"));
        assert_eq!(cli.run_config(), RunConfig::default());
        assert_eq!(cli.get_tracing_level().unwrap(), tracing::Level::WARN);
        assert!(!cli.all && !cli.json);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "node-probe", "-c", "2", "-T", "300", "-I", "1s", "-t", "1.1.1.1:53", "-t", "8.8.8.8", "-D",
        ])
        .unwrap();
        assert!(cli.source.is_none());
        assert_eq!(cli.targets, ["1.1.1.1:53", "8.8.8.8"]);
        assert_eq!(
            cli.run_config(),
            RunConfig {
                counter: 2,
                timeout: Duration::from_millis(300),
                interval: Duration::from_secs(1),
            }
        );
        assert_eq!(cli.get_tracing_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_invalid_log_level() {
        let cli = Cli::try_parse_from(["node-probe", "--log-level", "loud", "x"]).unwrap();
        assert!(cli.get_tracing_level().is_err());
    }

    #[test]
    fn test_deadline() {
        let run = RunConfig::default();
        assert_eq!(run.deadline(2), Some(Duration::from_secs(8)));
        let unbounded = RunConfig { counter: 0, ..run };
        assert_eq!(unbounded.deadline(2), None);
    }

    #[test]
    fn test_run_config_json() {
        let value = serde_json::to_value(RunConfig::default()).unwrap();
        assert_eq!(value["counter"], 4);
        assert_eq!(value["timeout_ms"], 1000);
        assert_eq!(value["interval_ms"], 500);
    }
}
