use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

const DEFAULT_ALLOWED_ORIGINS: &str = "https://music.youtube.com,http://localhost:3000";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Server
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub trust_forwarded_for: bool,

    // Rate limiting
    pub rate_limit_per_second: f64,
    pub rate_limit_burst_limit: u32,
    pub rate_limiter_idle_timeout: Duration,

    // Cache
    pub cache_invalidation_interval: Duration,
    pub lyrics_cache_ttl: Duration,
    pub track_cache_ttl: Duration,
    pub cache_access_token: String,

    // Upstream
    pub lyrics_url: String,
    pub track_url: String,
    pub token_url: String,
    pub token_key: String,
    pub oauth_token_url: String,
    pub oauth_token_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub app_platform: String,
    pub user_agent: String,
    pub cookie_string_format: String,
    pub cookie_value: String,
    pub upstream_timeout: Duration,

    // Features
    pub cache_compression: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves every setting through `lookup`, falling back to defaults for
    /// missing or blank values, then validates the result.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let secs = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_secs(parse(&get, key, default)?))
        };

        let config = Self {
            // Server
            port: parse(&get, "PORT", 8080)?,
            allowed_origins: text("ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            trust_forwarded_for: parse(&get, "TRUST_FORWARDED_FOR", false)?,

            // Rate limiting
            rate_limit_per_second: parse(&get, "RATE_LIMIT_PER_SECOND", 2.0)?,
            rate_limit_burst_limit: parse(&get, "RATE_LIMIT_BURST_LIMIT", 5)?,
            rate_limiter_idle_timeout: secs("RATE_LIMITER_IDLE_TIMEOUT_IN_SECONDS", 600)?,

            // Cache
            cache_invalidation_interval: secs("CACHE_INVALIDATION_INTERVAL_IN_SECONDS", 3600)?,
            lyrics_cache_ttl: secs("LYRICS_CACHE_TTL_IN_SECONDS", 86_400)?,
            track_cache_ttl: secs("TRACK_CACHE_TTL_IN_SECONDS", 3600)?,
            cache_access_token: text("CACHE_ACCESS_TOKEN", ""),

            // Upstream
            lyrics_url: text("LYRICS_URL", ""),
            track_url: text("TRACK_URL", ""),
            token_url: text("TOKEN_URL", ""),
            token_key: text("TOKEN_KEY", "accessToken"),
            oauth_token_url: text("OAUTH_TOKEN_URL", ""),
            oauth_token_key: text("OAUTH_TOKEN_KEY", "oauthAccessToken"),
            client_id: text("CLIENT_ID", ""),
            client_secret: text("CLIENT_SECRET", ""),
            app_platform: text("APP_PLATFORM", ""),
            user_agent: text("USER_AGENT", ""),
            cookie_string_format: text("COOKIE_STRING_FORMAT", ""),
            cookie_value: text("COOKIE_VALUE", ""),
            upstream_timeout: secs("UPSTREAM_TIMEOUT_IN_SECONDS", 10)?,

            // Features
            cache_compression: parse(&get, "FF_CACHE_COMPRESSION", true)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Rate must be a positive, finite number of requests per second
    /// - Burst must allow at least one request
    /// - Background intervals must be non-zero
    /// - Token keys must be distinct
    pub fn validate(&self) -> Result<()> {
        if !(self.rate_limit_per_second.is_finite() && self.rate_limit_per_second > 0.0) {
            anyhow::bail!(
                "Rate limit must be a positive number, got: {}",
                self.rate_limit_per_second
            );
        }

        if self.rate_limit_burst_limit == 0 {
            anyhow::bail!("Burst limit must be greater than 0");
        }

        if self.cache_invalidation_interval.is_zero() {
            anyhow::bail!("Cache invalidation interval must be greater than 0");
        }

        if self.rate_limiter_idle_timeout.is_zero() {
            anyhow::bail!("Rate limiter idle timeout must be greater than 0");
        }

        if self.token_key == self.oauth_token_key {
            anyhow::bail!(
                "TOKEN_KEY and OAUTH_TOKEN_KEY must differ, both are: {}",
                self.token_key
            );
        }

        Ok(())
    }

    /// Cookie header value: the first `%s` in the format is replaced by the
    /// cookie value.
    pub fn cookie_header(&self) -> String {
        self.cookie_string_format.replacen("%s", &self.cookie_value, 1)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Credentials and upstream URLs are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Server: port {}, origins [{}], forwarded-for {}\n  \
            Rate limit: {}/s, burst {}, idle eviction after {}\n  \
            Cache: sweep every {}, track TTL {}, lyrics TTL {}, compression={}\n  \
            Upstream: timeout {}, dump {}",
            self.port,
            self.allowed_origins.join(", "),
            self.trust_forwarded_for,
            self.rate_limit_per_second,
            self.rate_limit_burst_limit,
            humantime::format_duration(self.rate_limiter_idle_timeout),
            humantime::format_duration(self.cache_invalidation_interval),
            humantime::format_duration(self.track_cache_ttl),
            humantime::format_duration(self.lyrics_cache_ttl),
            self.cache_compression,
            humantime::format_duration(self.upstream_timeout),
            if self.cache_access_token.is_empty() { "disabled" } else { "enabled" },
        )
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_per_second, 2.0);
        assert_eq!(config.rate_limit_burst_limit, 5);
        assert_eq!(config.cache_invalidation_interval, Duration::from_secs(3600));
        assert_eq!(config.lyrics_cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.track_cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert!(config.cache_compression);
        assert!(!config.trust_forwarded_for);
        assert_eq!(
            config.allowed_origins,
            vec!["https://music.youtube.com", "http://localhost:3000"]
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("RATE_LIMIT_PER_SECOND", "0.5"),
            ("RATE_LIMIT_BURST_LIMIT", "1"),
            ("FF_CACHE_COMPRESSION", "false"),
            ("TRACK_CACHE_TTL_IN_SECONDS", "60"),
            ("ALLOWED_ORIGINS", " https://a.example , ,https://b.example"),
            ("CACHE_ACCESS_TOKEN", "s3cret"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.rate_limit_per_second, 0.5);
        assert_eq!(config.rate_limit_burst_limit, 1);
        assert!(!config.cache_compression);
        assert_eq!(config.track_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.cache_access_token, "s3cret");
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("PORT", "  "), ("TOKEN_KEY", "")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_key, "accessToken");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("RATE_LIMIT_PER_SECOND", "0")]).is_err());
        assert!(config_from(&[("RATE_LIMIT_BURST_LIMIT", "0")]).is_err());
        assert!(config_from(&[("CACHE_INVALIDATION_INTERVAL_IN_SECONDS", "0")]).is_err());
        assert!(config_from(&[("TOKEN_KEY", "same"), ("OAUTH_TOKEN_KEY", "same")]).is_err());
    }

    #[test]
    fn test_cookie_header() {
        let config = config_from(&[
            ("COOKIE_STRING_FORMAT", "sp_dc=%s; lang=en"),
            ("COOKIE_VALUE", "abc"),
        ])
        .unwrap();
        assert_eq!(config.cookie_header(), "sp_dc=abc; lang=en");
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config =
            config_from(&[("CACHE_ACCESS_TOKEN", "s3cret"), ("CLIENT_SECRET", "hunter2")]).unwrap();
        let summary = config.summary();
        assert!(!summary.contains("s3cret"));
        assert!(!summary.contains("hunter2"));
        assert!(summary.contains("dump enabled"));
    }
}
