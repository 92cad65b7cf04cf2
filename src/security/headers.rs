//! Header hygiene for forwarded requests and responses.
//!
//! # Responsibilities
//! - Resolve the client address (trusted `X-Forwarded-For` or peer)
//! - Strip hop-by-hop headers in both directions
//! - Append `X-Forwarded-For`, set `X-Forwarded-Proto` / `X-Forwarded-Host`
//! - Replace any client-supplied identity header with the verified subject

use std::net::{IpAddr, SocketAddr};

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Headers meaningful only for a single transport hop (RFC 9110 §7.6.1).
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Parse an address as it appears in `X-Forwarded-For` or a socket address.
///
/// Accepts bare addresses, bracketed IPv6 and `addr:port` forms. IPv4-mapped
/// IPv6 addresses collapse to IPv4.
pub fn normalize_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    let ip = raw
        .parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
        .or_else(|| raw.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().ok())?;
    Some(ip.to_canonical())
}

/// Client address for rate limiting and `X-Forwarded-For`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(normalize_ip);
        if forwarded.is_some() {
            return forwarded;
        }
    }
    peer.map(|p| p.ip().to_canonical())
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Add the `X-Forwarded-*` set for the upstream request.
pub fn set_forwarded(headers: &mut HeaderMap, peer: Option<SocketAddr>) {
    if let Some(peer) = peer {
        let peer_ip = peer.ip().to_canonical().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {peer_ip}"),
            _ => peer_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
    if let Some(host) = headers.get(header::HOST).cloned() {
        headers.insert(X_FORWARDED_HOST, host);
    }
}

/// Drop any client-supplied identity header, then set the verified subject.
pub fn set_identity(headers: &mut HeaderMap, name: &HeaderName, subject: Option<&str>) {
    headers.remove(name);
    if let Some(value) = subject.and_then(|s| HeaderValue::from_str(s).ok()) {
        headers.insert(name.clone(), value);
    }
}

/// True for `Connection: upgrade` requests naming a protocol in `Upgrade`.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade && headers.contains_key(header::UPGRADE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_addresses() {
        assert_eq!(normalize_ip(" 203.0.113.7 "), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(normalize_ip("[2001:db8::1]"), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(normalize_ip("[2001:db8::1]:443"), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(normalize_ip("10.1.2.3:8080"), Some("10.1.2.3".parse().unwrap()));
        assert_eq!(normalize_ip("::ffff:192.0.2.1"), Some("192.0.2.1".parse().unwrap()));
        assert_eq!(normalize_ip("unknown"), None);
    }

    #[test]
    fn forwarded_for_is_trusted_only_when_enabled() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("198.51.100.4, 10.0.0.2"));
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer), true), Some("198.51.100.4".parse().unwrap()));
        assert_eq!(client_ip(&headers, Some(peer), false), Some("10.0.0.9".parse().unwrap()));

        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("garbage"));
        assert_eq!(client_ip(&headers, Some(peer), true), Some("10.0.0.9".parse().unwrap()));
    }

    #[test]
    fn strips_hop_by_hop_and_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[test]
    fn forwarded_headers_are_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("198.51.100.4"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));

        set_forwarded(&mut headers, Some("10.0.0.9:4000".parse().unwrap()));
        assert_eq!(headers[X_FORWARDED_FOR], "198.51.100.4, 10.0.0.9");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
        assert_eq!(headers[X_FORWARDED_HOST], "gateway.local");
    }

    #[test]
    fn identity_header_cannot_be_spoofed() {
        let name = HeaderName::from_static("x-authenticated-user");
        let mut headers = HeaderMap::new();
        headers.insert(name.clone(), HeaderValue::from_static("admin"));

        set_identity(&mut headers, &name, None);
        assert!(!headers.contains_key(&name));

        set_identity(&mut headers, &name, Some("alice"));
        assert_eq!(headers[&name], "alice");
    }

    #[test]
    fn detects_upgrade_requests() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        assert!(!is_upgrade_request(&headers));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert!(is_upgrade_request(&headers));
    }
}
