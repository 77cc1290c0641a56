//! Proxy link parsers: `vmess://`, `ss://` and `ssr://`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use url::form_urlencoded;

use super::TargetDescriptor;
use crate::util::{b64_decode, b64_decode_string};

const UNKNOWN_NAME: &str = "unknown";

/// `...@host:port[/][?query]#name`, host may be a bracketed IPv6 literal.
static SS_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@(\[[0-9A-Fa-f:.]+\]|[^\s:@/?#\[\]]+):(\d+)/?(?:\?[^#\s]*)?#(\S+)").unwrap()
});

static SSR_REMARKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"remarks=([^&\s]+)").unwrap());

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid link: {0}")]
    Invalid(String),

    #[error("unsupported scheme: {0}")]
    Unsupported(String),

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("vmess payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown content: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Vmess,
    Ss,
    Ssr,
    Socks,
}

impl FromStr for Scheme {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vmess" => Ok(Scheme::Vmess),
            "ss" => Ok(Scheme::Ss),
            "ssr" => Ok(Scheme::Ssr),
            "socks" => Ok(Scheme::Socks),
            other => Err(LinkError::Unsupported(other.to_string())),
        }
    }
}

/// Parse one `scheme://payload` link into a descriptor.
pub fn parse_link(link: &str) -> Result<TargetDescriptor, LinkError> {
    let (scheme, payload) = link
        .trim()
        .split_once("://")
        .ok_or_else(|| LinkError::Invalid(link.to_string()))?;

    match scheme.parse::<Scheme>()? {
        Scheme::Vmess => parse_vmess(payload),
        Scheme::Ss => parse_ss(payload),
        Scheme::Ssr => parse_ssr(payload),
        Scheme::Socks => Err(LinkError::Unsupported(scheme.to_string())),
    }
}

/// vmess ports show up both as numbers and as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortField {
    Number(u64),
    Text(String),
}

impl Default for PortField {
    fn default() -> Self {
        PortField::Text(String::new())
    }
}

impl PortField {
    fn into_string(self) -> String {
        match self {
            PortField::Number(n) => n.to_string(),
            PortField::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VmessConfig {
    #[serde(default)]
    add: String,
    #[serde(default)]
    port: PortField,
    #[serde(default)]
    ps: String,
}

fn parse_vmess(payload: &str) -> Result<TargetDescriptor, LinkError> {
    let json = b64_decode(payload)?;
    let cfg: VmessConfig = serde_json::from_slice(&json)?;
    if cfg.add.is_empty() {
        return Err(LinkError::Malformed(String::from_utf8_lossy(&json).into_owned()));
    }
    Ok(TargetDescriptor {
        name: cfg.ps,
        host: cfg.add,
        port: cfg.port.into_string(),
    })
}

fn parse_ss(payload: &str) -> Result<TargetDescriptor, LinkError> {
    // Legacy form: base64("method:password@host:port")#name
    let expanded;
    let content: &str = if payload.contains('@') {
        payload
    } else {
        let (encoded, name) = payload.split_once('#').unwrap_or((payload, UNKNOWN_NAME));
        let decoded = b64_decode_string(encoded).ok_or_else(|| LinkError::Malformed(payload.to_string()))?;
        expanded = format!("{decoded}#{name}");
        expanded.as_str()
    };

    let caps = SS_LINK
        .captures(content)
        .ok_or_else(|| LinkError::Malformed(format!("can not find sub match in '{content}'")))?;
    let host = caps[1].trim_start_matches('[').trim_end_matches(']');
    Ok(TargetDescriptor {
        name: query_unescape(&caps[3]),
        host: host.to_string(),
        port: caps[2].to_string(),
    })
}

fn parse_ssr(payload: &str) -> Result<TargetDescriptor, LinkError> {
    let decoded = b64_decode(payload)?;
    let content = String::from_utf8_lossy(&decoded);
    let segments: Vec<&str> = content.split(':').collect();
    if segments.len() < 6 {
        return Err(LinkError::Malformed(content.to_string()));
    }

    let name = SSR_REMARKS
        .captures(segments[5])
        .and_then(|caps| b64_decode_string(&caps[1]))
        .unwrap_or_else(|| {
            tracing::debug!(link = %content, "ssr link without a readable remarks");
            UNKNOWN_NAME.to_string()
        });

    Ok(TargetDescriptor {
        name,
        host: segments[0].to_string(),
        port: segments[1].to_string(),
    })
}

/// Form-style unescape: `%XX` sequences and `+` as space.
fn query_unescape(s: &str) -> String {
    let escaped = s.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}
