use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Client address as used for rate-limit keys, device fingerprints and the
/// suspicious-IP registry. `None` when nothing identified the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientIp(pub Option<IpAddr>);

impl ClientIp {
    /// `x-forwarded-for` (first hop), then `x-real-ip`, then the socket
    /// peer. Proxy headers are ignored unless `trust_proxy` is set.
    pub fn derive(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Self {
        if trust_proxy {
            let forwarded = headers
                .get(FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(parse_ip);
            if forwarded.is_some() {
                return Self(forwarded);
            }

            let real = headers.get(REAL_IP).and_then(|v| v.to_str().ok()).and_then(parse_ip);
            if real.is_some() {
                return Self(real);
            }
        }
        Self(peer.map(|addr| addr.ip()))
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.0
    }
}

impl fmt::Display for ClientIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ip) => write!(f, "{}", ip),
            None => f.write_str("unknown"),
        }
    }
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}
