//! # Cache Module
//!
//! Shared, expiring key-value store used to memoize upstream responses
//! (track ids, lyrics, access tokens).
//!
//! ## Features
//!
//! - **TTL Support**: every entry carries an absolute expiration instant
//! - **Lazy Expiration**: a read that finds a stale entry removes it
//! - **Background Sweeping**: [`InvalidationSweeper`] evicts cold entries
//! - **Thread Safety**: sharded map, no caller-visible exclusive lock
//! - **Optional Compression**: values stored as base64 gzip (see [`compression`])
//!
//! Keys are opaque strings composed by the caller (`track:<query>`,
//! `lyrics:<id>`, token keys). The cache does not interpret prefixes and has
//! no capacity bound: entries leave only by expiring.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lyrics_relay::cache::ExpiringCache;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), lyrics_relay::error::CacheError> {
//! let cache = ExpiringCache::new(true);
//! cache.set("lyrics:4uLOomWMdzZ1sSxC5c4lYr", "{\"lyrics\":[]}", Duration::from_secs(60))?;
//!
//! if let Some(cached) = cache.get("lyrics:4uLOomWMdzZ1sSxC5c4lYr")? {
//!     println!("Found cached lyrics: {}", cached);
//! }
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod sweeper;

pub use sweeper::InvalidationSweeper;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    error::{CacheError, DumpError},
    maintenance::deadline_after,
};

/// Fixed per-entry overhead counted by [`CacheDump::size_in_kb`].
const ENTRY_OVERHEAD_BYTES: usize = 8;

/// A stored value and the instant after which it is no longer served.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline_after(ttl),
        }
    }

    /// Live only while the expiration is strictly in the future.
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Concurrent string cache with per-entry expiration.
///
/// Constructed once at startup and shared behind an `Arc` with every
/// request handler and the sweeper.
#[derive(Debug)]
pub struct ExpiringCache {
    data: DashMap<String, CacheEntry>,
    compress: bool,
    reserved_keys: HashSet<String>,
}

impl ExpiringCache {
    pub fn new(compress: bool) -> Self {
        Self {
            data: DashMap::new(),
            compress,
            reserved_keys: HashSet::new(),
        }
    }

    /// Keys used for internal bookkeeping (e.g. access tokens). They behave
    /// like any other entry but never appear in [`ExpiringCache::dump`].
    pub fn with_reserved_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    /// Returns the live value for `key`.
    ///
    /// An expired entry is removed and reported as a miss. When compression
    /// is enabled and the stored payload cannot be decoded, the entry is
    /// removed and the decode error is returned instead of a value.
    pub fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();

        let stored = match self.data.get(key) {
            Some(entry) if !entry.is_expired_at(now) => entry.value.clone(),
            Some(entry) => {
                let expires_at = entry.expires_at;
                drop(entry);
                // Only drop the entry we saw; a concurrent set may have replaced it.
                self.data.remove_if(key, |_, e| e.expires_at == expires_at);
                debug!("⏰ Expired entry removed on read: {}", key);
                return Ok(None);
            }
            None => return Ok(None),
        };

        if !self.compress {
            return Ok(Some(stored));
        }

        match compression::decompress(&stored) {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                self.data.remove_if(key, |_, e| e.value == stored);
                warn!("⚠️ Undecodable cache entry dropped: {}", key);
                Err(CacheError::Decode {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    /// A zero `ttl` produces an entry that is already expired; a `ttl` past
    /// the representable range is capped at roughly thirty years.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let stored = if self.compress {
            compression::compress(value).map_err(CacheError::Compression)?
        } else {
            value.to_string()
        };

        let key = key.into();
        debug!("💾 Cached {} for {}", key, humantime::format_duration(ttl));
        self.data.insert(key, CacheEntry::new(stored, ttl));
        Ok(())
    }

    /// Removes every entry that is expired at the moment of the scan and
    /// returns how many were dropped. Entries written during the scan carry
    /// a later expiration and survive.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|key, entry| {
            let keep = !entry.is_expired_at(now);
            if !keep {
                debug!("🗑️ Deleted expired key: {}", key);
            }
            keep
        });
        before.saturating_sub(self.data.len())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Point-in-time copy of every non-reserved entry with its raw stored
    /// value. Shards are locked one at a time, so writers are never blocked
    /// for the whole walk.
    pub fn dump(&self) -> Vec<DumpEntry> {
        let now = Instant::now();
        let wall_now = Utc::now();

        self.data
            .iter()
            .filter(|entry| !self.reserved_keys.contains(entry.key()))
            .map(|entry| DumpEntry {
                key: entry.key().clone(),
                value: entry.value().value.clone(),
                expiration: wall_clock(entry.value().expires_at, now, wall_now),
            })
            .collect()
    }

    /// [`ExpiringCache::dump`] gated by a credential. An empty `expected`
    /// token disables dumping altogether.
    pub fn dump_authorized(
        &self,
        credential: Option<&str>,
        expected: &str,
    ) -> Result<CacheDump, DumpError> {
        match credential {
            Some(given) if !expected.is_empty() && given == expected => {
                Ok(CacheDump::from_entries(self.dump()))
            }
            _ => {
                warn!("🔒 Rejected cache dump request");
                Err(DumpError::Unauthorized)
            }
        }
    }

    /// Stores an already encoded payload as-is, bypassing compression.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: &str, stored: &str, ttl: Duration) {
        self.data.insert(key.to_string(), CacheEntry::new(stored.to_string(), ttl));
    }
}

/// Maps a monotonic instant onto the wall clock for export.
fn wall_clock(at: Instant, now: Instant, wall_now: DateTime<Utc>) -> DateTime<Utc> {
    let offset = |d: Duration| chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX);
    if at >= now {
        wall_now.checked_add_signed(offset(at - now)).unwrap_or(DateTime::<Utc>::MAX_UTC)
    } else {
        wall_now.checked_sub_signed(offset(now - at)).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// One exported entry. `value` is the stored form: base64 gzip when the
/// cache compresses, plain text otherwise.
#[derive(Debug, Clone)]
pub struct DumpEntry {
    pub key: String,
    pub value: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DumpValue {
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Expiration")]
    pub expiration: DateTime<Utc>,
}

/// Diagnostic export served by the `/cache` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheDump {
    #[serde(rename = "NumberOfKeys")]
    pub number_of_keys: usize,
    #[serde(rename = "SizeInKB")]
    pub size_in_kb: usize,
    #[serde(rename = "Cache")]
    pub cache: BTreeMap<String, DumpValue>,
}

impl CacheDump {
    pub fn from_entries(entries: Vec<DumpEntry>) -> Self {
        let size: usize = entries
            .iter()
            .map(|e| e.key.len() + e.value.len() + ENTRY_OVERHEAD_BYTES)
            .sum();

        let cache: BTreeMap<_, _> = entries
            .into_iter()
            .map(|e| {
                (
                    e.key,
                    DumpValue {
                        value: e.value,
                        expiration: e.expiration,
                    },
                )
            })
            .collect();

        Self {
            number_of_keys: cache.len(),
            size_in_kb: size / 1024,
            cache,
        }
    }
}
