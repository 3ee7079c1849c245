//! At-rest encoding for cached values.
//!
//! Format: the UTF-8 text is gzip-compressed (RFC 1952, default level) and
//! the resulting stream is base64-encoded with the standard alphabet and
//! padding. A dump consumer can decode any stored value with
//! `base64 -d | gunzip`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

use crate::error::CodecError;

/// Compresses `input` and returns the base64 text of the gzip stream.
pub fn compress(input: &str) -> Result<String, CodecError> {
    let buffer = Vec::with_capacity(input.len() / 2 + 32);
    let mut encoder = GzEncoder::new(buffer, Compression::default());
    encoder.write_all(input.as_bytes())?;
    let gzipped = encoder.finish()?;
    Ok(STANDARD.encode(gzipped))
}

/// Reverses [`compress`]. Fails on anything that is not a complete gzip
/// stream wrapped in base64; never returns partial output.
pub fn decompress(input: &str) -> Result<String, CodecError> {
    let gzipped = STANDARD.decode(input)?;
    if gzipped.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut decoder = GzDecoder::new(gzipped.as_slice());
    let mut raw = Vec::with_capacity(gzipped.len() * 2);
    decoder.read_to_end(&mut raw)?;
    Ok(String::from_utf8(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip() {
        let samples = [
            "",
            "4uLOomWMdzZ1sSxC5c4lYr",
            "{\"lyrics\":[{\"startTimeMs\":\"1200\",\"words\":\"♪\"}],\"language\":\"en\"}",
            "مرحبا بالعالم — שלום",
        ];
        for sample in samples {
            let encoded = compress(sample).unwrap();
            assert_eq!(decompress(&encoded).unwrap(), sample);
        }
    }

    #[test]
    fn test_large_repetitive_payload_shrinks() {
        let payload = "la la la ".repeat(2_000);
        let encoded = compress(&payload).unwrap();
        assert!(encoded.len() < payload.len() / 4);
        assert_eq!(decompress(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_rejects_invalid_base64() {
        assert!(matches!(decompress("not base64 at all!"), Err(CodecError::Base64(_))));
    }

    #[test]
    fn test_rejects_empty_payload() {
        assert!(matches!(decompress(""), Err(CodecError::Empty)));
    }

    #[test]
    fn test_rejects_non_gzip_bytes() {
        let encoded = STANDARD.encode("plain text, not gzip");
        assert!(matches!(decompress(&encoded), Err(CodecError::Gzip(_))));
    }

    #[test]
    fn test_rejects_truncated_stream() {
        let encoded = compress("a value that will lose its trailer").unwrap();
        let mut gzipped = STANDARD.decode(encoded).unwrap();
        gzipped.truncate(gzipped.len() - 4);
        let truncated = STANDARD.encode(gzipped);
        assert!(decompress(&truncated).is_err());
    }
}
