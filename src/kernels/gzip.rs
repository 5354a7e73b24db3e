//! Gzip kernels: one complete gzip member per job.
//!
//! This module is a safe, panic-free wrapper around the `flate2` crate.

use std::io::{Cursor, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::BatchzipError;

/// Fixed bytes a single member can add: the 10-byte header and 8-byte trailer,
/// plus the deflate end-of-stream and stored-block framing allowance.
pub const ITEM_OVERHEAD: usize = 18 + 13;

/// Worst-case deflate expansion on `n` input bytes.
///
/// This is zlib's conservative bound for non-default settings, not the tight
/// `deflateBound`: the `miniz_oxide` backend's fast path (level 1) can exceed
/// the tight form on incompressible input.
pub fn growth(n: usize) -> usize {
    (n >> 5) + (n >> 7) + (n >> 11)
}

//==================================================================================
// 1. Core Logic
//==================================================================================

/// Compresses `input` straight into `out`. Returns the member length.
pub fn compress_into(input: &[u8], out: &mut [u8], level: u32) -> Result<usize, BatchzipError> {
    let mut encoder = GzEncoder::new(Cursor::new(out), Compression::new(level));
    encoder
        .write_all(input)
        .map_err(|e| BatchzipError::GzipError(e.to_string()))?;

    // `finish` writes the trailer; a full slice surfaces here as `WriteZero`.
    let cursor = encoder
        .finish()
        .map_err(|e| BatchzipError::GzipError(e.to_string()))?;
    Ok(cursor.position() as usize)
}

//==================================================================================
// 2. Public API
//==================================================================================

pub fn encode(input: &[u8], level: u32) -> Result<Vec<u8>, BatchzipError> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(input.len() / 2 + ITEM_OVERHEAD),
        Compression::new(level),
    );
    encoder
        .write_all(input)
        .map_err(|e| BatchzipError::GzipError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| BatchzipError::GzipError(e.to_string()))
}

pub fn decode(input: &[u8]) -> Result<Vec<u8>, BatchzipError> {
    let mut decoder = GzDecoder::new(input);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| BatchzipError::GzipError(e.to_string()))?;
    Ok(output)
}

//==================================================================================
// 3. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_roundtrip_simple_text() {
        let original = b"hello world, this is a test of gzip compression. hello world.".to_vec();
        let compressed = encode(&original, 6).unwrap();

        // Gzip magic bytes.
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(decode(&compressed).unwrap(), original);
    }

    #[test]
    fn test_compress_into_matches_allocating_form() {
        let original = vec![7u8; 4096];
        let mut out = vec![0u8; original.len() + growth(original.len()) + ITEM_OVERHEAD];

        let written = compress_into(&original, &mut out, 6).unwrap();

        assert!(written < original.len());
        assert_eq!(decode(&out[..written]).unwrap(), original);
    }

    #[test]
    fn test_empty_input_is_a_valid_member() {
        let compressed = encode(&[], 6).unwrap();
        assert!(!compressed.is_empty());
        assert!(decode(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_gzip_decode_invalid_data() {
        let result = decode(&[1, 2, 3, 4, 5]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Gzip"));
        }
    }
}
