//! Request inspection helpers.
//!
//! # Responsibilities
//! - Extract the routing-relevant host (Host header, or the HTTP/2
//!   `:authority` carried in the URI)
//! - Detect upgrade handshakes
//! - Work out the originating address of a request
//! - Generate request IDs (UUID v4)

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// The host a request is addressed to, if non-empty and valid UTF-8.
///
/// HTTP/2 clients send `:authority` instead of `Host`; hyper exposes it as
/// the URI authority, which is used when the header is absent.
pub fn request_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .map(str::trim)
        .filter(|h| !h.is_empty())
}

/// True for requests asking to switch protocols: `Connection` lists the
/// `upgrade` token and an `Upgrade` header names the target protocol.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    let headers = request.headers();
    let wants_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    wants_upgrade && headers.contains_key(header::UPGRADE)
}

/// Address the client connected from: `x-forwarded-for` when a proxy set
/// it, otherwise the peer address.
pub fn endpoint_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => String::new(),
    }
}

/// Assigns a random UUID as `x-request-id` to requests lacking one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn request(uri: &str, pairs: &[(&'static str, &'static str)]) -> Request<()> {
        let mut request = Request::builder().uri(uri).body(()).unwrap();
        *request.headers_mut() = headers(pairs);
        request
    }

    #[test]
    fn host_requires_value() {
        assert_eq!(
            request_host(&request("/", &[("host", "a.example.com")])),
            Some("a.example.com")
        );
        assert_eq!(request_host(&request("/", &[("host", "")])), None);
        assert_eq!(request_host(&request("/", &[])), None);
    }

    #[test]
    fn host_falls_back_to_uri_authority() {
        assert_eq!(
            request_host(&request("http://b.example.com:8443/x", &[])),
            Some("b.example.com:8443")
        );
        assert_eq!(
            request_host(&request("http://b.example.com/x", &[("host", "a.example.com")])),
            Some("a.example.com")
        );
    }

    #[test]
    fn upgrade_detection() {
        let upgrade = |pairs: &[(&'static str, &'static str)]| {
            let mut request = Request::new(());
            *request.headers_mut() = headers(pairs);
            is_upgrade_request(&request)
        };

        assert!(upgrade(&[("connection", "Upgrade"), ("upgrade", "websocket")]));
        assert!(upgrade(&[("connection", "keep-alive, upgrade"), ("upgrade", "h2c")]));
        assert!(!upgrade(&[("connection", "keep-alive"), ("upgrade", "websocket")]));
        assert!(!upgrade(&[("connection", "upgrade")]));
    }

    #[test]
    fn endpoint_prefers_forwarded_for() {
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();

        assert_eq!(
            endpoint_ip(&headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]), Some(peer)),
            "203.0.113.9"
        );
        assert_eq!(endpoint_ip(&HeaderMap::new(), Some(peer)), "192.0.2.1");
    }

    #[test]
    fn request_ids_are_unique() {
        let request = Request::new(());
        let mut make = MakeRequestUuidV4;
        let a = make.make_request_id(&request).unwrap();
        let b = make.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
