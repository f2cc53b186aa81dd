//! Hard/soft classification of raw failure strings.
//!
//! A *hard* failure means the proxy (or the network path through it) is
//! unusable and the endpoint should be quarantined. A *soft* failure is an
//! application-level problem such as a missing field or upstream throttling,
//! and is retried without touching proxy health.

use serde::{Deserialize, Serialize};

/// Status codes that mark a failed CONNECT tunnel as a proxy-level failure.
const TUNNEL_STATUS_CODES: [u16; 8] = [400, 401, 403, 407, 429, 502, 503, 504];

const HARD_MARKERS: [&str; 11] = [
    "proxy authentication required",
    "tunnel connection failed",
    "connection refused",
    "no route to host",
    "connection reset",
    "timed out",
    "timeout",
    "cannot connect to proxy",
    "unable to connect to proxy",
    "proxyerror",
    "proxy error",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Hard,
    Soft,
}

impl FailureClass {
    pub const fn is_hard(self) -> bool {
        matches!(self, Self::Hard)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }
}

/// Classify a raw error string. `None`, empty and blank input are soft.
pub fn classify(error: Option<&str>) -> FailureClass {
    let Some(error) = error else {
        return FailureClass::Soft;
    };
    let normalized = error.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return FailureClass::Soft;
    }

    if HARD_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
    {
        return FailureClass::Hard;
    }

    if is_failed_tunnel(&normalized) {
        return FailureClass::Hard;
    }

    FailureClass::Soft
}

/// `CONNECT` paired with a tunnel status code, in either order.
fn is_failed_tunnel(normalized: &str) -> bool {
    let mut mentions_connect = false;
    let mut mentions_status = false;

    for token in normalized.split(|ch: char| !ch.is_ascii_alphanumeric()) {
        if token == "connect" {
            mentions_connect = true;
        } else if token.len() == 3 {
            if let Ok(code) = token.parse::<u16>() {
                mentions_status |= TUNNEL_STATUS_CODES.contains(&code);
            }
        }
    }

    mentions_connect && mentions_status
}
