// Helpers shared by target parsing and subscription decoding.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::prober::TargetError;

/// Split `host:port`, `[v6]:port` or a bare host (which gets `default_port`).
pub fn parse_host_port(s: &str, default_port: u16) -> Result<(String, u16), TargetError> {
    let s = s.trim();
    let invalid = || TargetError::InvalidEndpoint(s.to_string());

    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if tail.is_empty() => (host, None),
            None => return Err(invalid()),
        }
    } else {
        match s.rsplit_once(':') {
            // more than one colon without brackets is a bare IPv6 address
            Some((host, _)) if host.contains(':') => (s, None),
            Some((host, port)) => (host, Some(port)),
            None => (s, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(p) => p.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(invalid)?,
        None => default_port,
    };
    Ok((host.to_string(), port))
}

/// Decode base64 in whichever flavour subscriptions happen to use.
pub fn b64_decode(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let content = content.trim();
    let mut last_err = None;
    for engine in [&STANDARD, &URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD_NO_PAD] {
        match engine.decode(content) {
            Ok(data) => return Ok(data),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(base64::DecodeError::InvalidLength(content.len())))
}

pub fn b64_decode_string(content: &str) -> Option<String> {
    b64_decode(content).ok().and_then(|data| String::from_utf8(data).ok())
}
