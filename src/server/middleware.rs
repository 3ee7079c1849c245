//! Request interceptors: admission control and access logging.
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, time::Instant};
use tracing::info;

use super::AppState;
use crate::error::ApiError;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Caller identity used as the rate-limiter key: the peer IP, or the first
/// `X-Forwarded-For` hop when the deployment sits behind a trusted proxy.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Admission gate. Denied requests get a 429 before anything else runs.
pub async fn admission(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer, state.trust_forwarded_for);

    if !state.limiter.admit(&identity) {
        return ApiError::RateLimited.into_response();
    }

    next.run(request).await
}

/// One log line per request: method, URI, status, body size and latency.
pub async fn access_log(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let start = Instant::now();

    let response = next.run(request).await;

    let size = response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    info!(
        "{} {} {:?} {} {} {:?}",
        method,
        uri,
        version,
        response.status().as_u16(),
        size,
        start.elapsed()
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.168.1.1:53211".parse().unwrap())
    }

    #[test]
    fn test_identity_ignores_port() {
        let a = client_identity(&HeaderMap::new(), peer(), false);
        let other_port = Some("192.168.1.1:40000".parse().unwrap());
        let b = client_identity(&HeaderMap::new(), other_port, false);
        assert_eq!(a, "192.168.1.1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("203.0.113.9, 10.0.0.1"));

        assert_eq!(client_identity(&headers, peer(), true), "203.0.113.9");
        assert_eq!(client_identity(&headers, peer(), false), "192.168.1.1");
    }

    #[test]
    fn test_blank_forwarded_for_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static(" "));
        assert_eq!(client_identity(&headers, peer(), true), "192.168.1.1");
        assert_eq!(client_identity(&headers, None, true), "unknown");
    }
}
