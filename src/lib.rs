//! Lyrics relay: looks up track ids and synchronized lyrics upstream and
//! re-serves them behind a per-client rate limiter and an expiring cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod rate_limit;
pub mod server;
pub mod service;
pub mod sources;
