use std::future::Future;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration, Instant};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(#[from] io::Error),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

/// A successful connect: how long it took and who answered.
#[derive(Debug, Clone, Copy)]
pub struct Connected {
    pub elapsed: Duration,
    pub peer: SocketAddr,
}

/// One TCP connect bounded by `limit`. Name resolution counts against the limit.
/// The stream is closed as soon as it is established.
pub async fn probe_tcp(host: &str, port: u16, limit: Duration) -> Result<Connected, ProbeError> {
    connect_within(limit, TcpStream::connect((host, port))).await
}

/// Drive `connect` for at most `limit` and time it.
pub(crate) async fn connect_within<F>(limit: Duration, connect: F) -> Result<Connected, ProbeError>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    let start = Instant::now();
    let conn = timeout(limit, connect)
        .await
        .map_err(|_| ProbeError::Timeout(limit))??;
    let elapsed = start.elapsed();
    let peer = conn.peer_addr()?;
    drop(conn);
    Ok(Connected { elapsed, peer })
}
