use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::config::RunConfig;
use crate::subscribe::TargetDescriptor;

pub mod tcp_connect;

use tcp_connect::{probe_tcp, Connected, ProbeError};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid port '{port}' for target '{name}'")]
    InvalidPort { name: String, port: String },

    #[error("invalid endpoint '{0}', expected host:port")]
    InvalidEndpoint(String),
}

/// One probe job. Immutable once built; probers and results share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub protocol: Protocol,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Number of attempts, `0` keeps probing until cancelled.
    pub counter: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Target {
    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16, run: &RunConfig) -> Self {
        Self {
            protocol: Protocol::Tcp,
            name: name.into(),
            host: host.into(),
            port,
            counter: run.counter,
            interval: run.interval,
            timeout: run.timeout,
        }
    }

    /// Build a target from an externally supplied descriptor.
    /// Fails when the descriptor's port is not a valid TCP port.
    pub fn from_descriptor(desc: &TargetDescriptor, run: &RunConfig) -> Result<Self, TargetError> {
        let port = desc
            .port
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| TargetError::InvalidPort {
                name: desc.name.clone(),
                port: desc.port.clone(),
            })?;
        Ok(Self::tcp(desc.name.clone(), desc.host.clone(), port, run))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}://{}:{})", self.name, self.protocol, self.host, self.port)
    }
}

/// Performs one connect attempt against a target, bounded by the target's timeout.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, target: &Target) -> impl Future<Output = Result<Connected, ProbeError>> + Send;
}

/// Plain TCP connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, target: &Target) -> impl Future<Output = Result<Connected, ProbeError>> + Send {
        probe_tcp(&target.host, target.port, target.timeout)
    }
}
