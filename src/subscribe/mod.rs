//! Subscription loading: fetch a base64 list of proxy links and turn it into target descriptors.

use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::util::b64_decode_string;

pub mod parser;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint as announced by a subscription. The port is kept as text until a target is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub name: String,
    pub host: String,
    pub port: String,
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("fetch subscription failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("read subscription file {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("subscription is neither base64 nor a list of links")]
    Undecodable,
}

/// Load descriptors from an http(s) URL or a local file.
pub async fn load(source: &str) -> Result<Vec<TargetDescriptor>, SubscribeError> {
    let body = if source.starts_with("http://") || source.starts_with("https://") {
        fetch(source).await?
    } else {
        read_file(source).await?
    };
    decode_subscription(&body)
}

async fn fetch(url: &str) -> Result<String, SubscribeError> {
    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let body = client.get(url).send().await?.error_for_status()?.text().await?;
    debug!(url, bytes = body.len(), "subscription fetched");
    Ok(body)
}

async fn read_file(path: &str) -> Result<String, SubscribeError> {
    let io_err = |source: std::io::Error| SubscribeError::Io {
        path: path.to_string(),
        source,
    };
    fs::read_to_string(path).await.map_err(io_err)
}

/// Decode a subscription body. Links that fail to parse are logged and skipped.
pub fn decode_subscription(body: &str) -> Result<Vec<TargetDescriptor>, SubscribeError> {
    // providers wrap the base64 text at a fixed column
    let compact: String = body.split_ascii_whitespace().collect();
    let links = match b64_decode_string(&compact) {
        Some(decoded) => decoded,
        // some providers serve the link list without the base64 wrapping
        None if body.contains("://") => body.to_string(),
        None => return Err(SubscribeError::Undecodable),
    };

    let descriptors = links
        .lines()
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .filter_map(|link| match parser::parse_link(link) {
            Ok(desc) => Some(desc),
            Err(e) => {
                warn!(link, error = %e, "skip link");
                None
            }
        })
        .collect();
    Ok(descriptors)
}
