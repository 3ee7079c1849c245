use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lyrics_relay::{
    cache::{ExpiringCache, InvalidationSweeper},
    config::Config,
    rate_limit::ClientRateLimiter,
    server::{self, AppState},
    service::LyricsService,
    sources::SpotifyClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lyrics_relay=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("🎵 Starting lyrics relay v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let shutdown = CancellationToken::new();

    // Caché compartido; los tokens no aparecen en el dump
    let cache = Arc::new(
        ExpiringCache::new(config.cache_compression)
            .with_reserved_keys([config.token_key.clone(), config.oauth_token_key.clone()]),
    );
    let sweeper = InvalidationSweeper::spawn(
        cache.clone(),
        config.cache_invalidation_interval,
        shutdown.child_token(),
    );

    let limiter = Arc::new(ClientRateLimiter::new(
        config.rate_limit_per_second,
        config.rate_limit_burst_limit,
    ));
    let janitor = limiter.spawn_janitor(config.rate_limiter_idle_timeout, shutdown.child_token());

    let source = Arc::new(SpotifyClient::new(&config, cache.clone())?);
    let service = Arc::new(LyricsService::new(
        cache,
        source,
        config.track_cache_ttl,
        config.lyrics_cache_ttl,
    ));

    let state = AppState {
        service,
        limiter,
        cache_access_token: Arc::from(config.cache_access_token.as_str()),
        trust_forwarded_for: config.trust_forwarded_for,
    };
    let app = server::build_app(state, &config.allowed_origins);

    // Manejar shutdown graceful
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("⚠️ Shutdown signal received, closing..."),
            Err(e) => warn!("Could not listen for Ctrl+C: {}", e),
        }
        signal.cancel();
    });

    let stop = shutdown.clone();
    let served = server::serve(app, config.port, async move { stop.cancelled().await }).await;

    shutdown.cancel();
    sweeper.shutdown().await;
    janitor.shutdown().await;
    info!("👋 Bye");

    served
}
