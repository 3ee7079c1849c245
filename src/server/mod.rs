//! Axum front end: routing, CORS and admission around the lyrics service.
pub mod middleware;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::{rate_limit::ClientRateLimiter, service::LyricsService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LyricsService>,
    pub limiter: Arc<ClientRateLimiter>,
    pub cache_access_token: Arc<str>,
    pub trust_forwarded_for: bool,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("⚠️ Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
}

/// Builds the application. Layers run outermost first: admission, CORS,
/// access log, then the route handlers.
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/getLyrics", get(routes::get_lyrics))
        .route("/cache", get(routes::get_cache_dump))
        .route("/", get(routes::help))
        .layer(from_fn(middleware::access_log))
        .layer(cors_layer(allowed_origins))
        .layer(from_fn_with_state(state.clone(), middleware::admission))
        .with_state(state)
}

/// Serves `app` on `port` until `shutdown` resolves.
pub async fn serve<F>(app: Router, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("🌐 Server listening on port {}", port);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::ExpiringCache,
        sources::{Lyrics, MockLyricsSource},
    };
    use axum::{
        body::{to_bytes, Body},
        extract::ConnectInfo,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const TOKEN: &str = "dump-token";

    fn app_with(source: MockLyricsSource, rate: f64, burst: u32) -> (Router, Arc<ExpiringCache>) {
        let cache = Arc::new(
            ExpiringCache::new(true).with_reserved_keys(["accessToken", "oauthAccessToken"]),
        );
        let hour = Duration::from_secs(3600);
        let state = AppState {
            service: Arc::new(LyricsService::new(cache.clone(), Arc::new(source), hour, hour)),
            limiter: Arc::new(ClientRateLimiter::new(rate, burst)),
            cache_access_token: Arc::from(TOKEN),
            trust_forwarded_for: false,
        };
        (build_app(state, &["http://localhost:3000".to_string()]), cache)
    }

    fn request(uri: &str, ip: [u8; 4]) -> Request<Body> {
        let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(SocketAddr::from((ip, 50_000))));
        request
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn blue_source() -> MockLyricsSource {
        let mut source = MockLyricsSource::new();
        source
            .expect_search_track()
            .returning(|_| Ok(Some("track-1".to_string())));
        source
            .expect_fetch_lyrics()
            .returning(|_| Ok(Some(Lyrics::from_lines(Vec::new(), "en".to_string()))));
        source
    }

    #[tokio::test]
    async fn test_get_lyrics() {
        let (app, _) = app_with(blue_source(), 100.0, 100);

        let response = app
            .oneshot(request("/getLyrics?s=Blue&a=Billie%20Eilish", [10, 0, 0, 1]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["trackId"], "track-1");
        assert_eq!(body["error"], Value::Null);
        assert_eq!(body["language"], "en");
        assert!(body["lyrics"].is_array());
    }

    #[tokio::test]
    async fn test_missing_query_is_unprocessable() {
        let (app, _) = app_with(MockLyricsSource::new(), 100.0, 100);
        let response = app.oneshot(request("/getLyrics", [10, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_rate_limited_request_does_no_work() {
        let mut source = MockLyricsSource::new();
        source
            .expect_fetch_lyrics()
            .times(1)
            .returning(|_| Ok(Some(Lyrics::from_lines(Vec::new(), "en".to_string()))));
        let (app, _) = app_with(source, 0.001, 1);

        let uri = "/getLyrics?trackId=abc";
        let first = app.clone().oneshot(request(uri, [10, 0, 0, 7])).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.clone().oneshot(request(uri, [10, 0, 0, 7])).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = app.oneshot(request("/", [10, 0, 0, 8])).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cache_dump_requires_token() {
        let (app, cache) = app_with(blue_source(), 100.0, 100);
        cache.set("accessToken", "secret", Duration::from_secs(60)).unwrap();
        cache.set("track:x", "track-1", Duration::from_secs(60)).unwrap();

        let denied = app.clone().oneshot(request("/cache", [10, 0, 0, 1])).await.unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let mut wrong = request("/cache", [10, 0, 0, 1]);
        wrong.headers_mut().insert(header::AUTHORIZATION, "invalid_token".parse().unwrap());
        assert_eq!(app.clone().oneshot(wrong).await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let mut authorized = request("/cache", [10, 0, 0, 1]);
        authorized.headers_mut().insert(header::AUTHORIZATION, TOKEN.parse().unwrap());
        let response = app.oneshot(authorized).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["NumberOfKeys"], 1);
        assert!(body["Cache"].get("track:x").is_some());
        assert!(body["Cache"].get("accessToken").is_none());
    }

    #[tokio::test]
    async fn test_help() {
        let (app, _) = app_with(MockLyricsSource::new(), 100.0, 100);
        let response = app.oneshot(request("/", [127, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["help"].as_str().unwrap().contains("/getLyrics"));
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let (app, _) = app_with(MockLyricsSource::new(), 100.0, 100);
        let mut req = request("/", [127, 0, 0, 1]);
        req.headers_mut().insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }
}
