//! Error types shared by the cache, the admission layer and the HTTP surface.
//!
//! Everything here is local and recoverable: callers either fall back to a
//! fresh upstream fetch or reject the request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Failures of the gzip + base64 codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid gzip stream: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("decompressed payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("encoded payload is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to compress value: {0}")]
    Compression(#[source] CodecError),

    #[error("stored value for `{key}` could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: CodecError,
    },
}

/// Raised when the diagnostic dump is requested with the wrong credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DumpError {
    #[error("unauthorized")]
    Unauthorized,
}

/// Request-level failures, mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Song name or artist name not provided")]
    MissingQuery,

    #[error("Track not found")]
    TrackNotFound,

    #[error("Lyrics not available for this track")]
    LyricsUnavailable,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too Many Requests")]
    RateLimited,

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingQuery => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TrackNotFound | ApiError::LyricsUnavailable => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DumpError> for ApiError {
    fn from(err: DumpError) -> Self {
        match err {
            DumpError::Unauthorized => ApiError::Unauthorized,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("❌ Request failed: {:#}", self);
        }
        (status, self.to_string()).into_response()
    }
}
