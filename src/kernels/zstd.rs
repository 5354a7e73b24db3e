//! This module contains the pure, stateless kernels for Zstandard compression
//! and decompression of single jobs.
//!
//! Each compressed item is an 8-byte little-endian uncompressed length followed
//! by one zstd frame. An empty input compresses to an empty output. This module
//! is a safe, panic-free wrapper around the `zstd` crate.

use std::io::Write;

use crate::error::BatchzipError;

/// Length of the uncompressed-size prefix.
const HEADER_LEN: usize = 8;

/// Per-item allowance: the size prefix plus zstd's small-input margin.
pub const ITEM_OVERHEAD: usize = HEADER_LEN + 64;

/// Worst-case zstd expansion on `n` input bytes, excluding the small-input margin.
pub fn growth(n: usize) -> usize {
    n >> 8
}

//==================================================================================
// 1. Core Logic (The "Engine")
//==================================================================================

/// Compresses `input` straight into `out`, returning the number of bytes written.
pub fn compress_into(input: &[u8], out: &mut [u8], level: i32) -> Result<usize, BatchzipError> {
    if input.is_empty() {
        return Ok(0);
    }
    if out.len() < HEADER_LEN {
        return Err(BatchzipError::ZstdError(
            "Output buffer too short to hold the size header.".to_string(),
        ));
    }

    let (header, body) = out.split_at_mut(HEADER_LEN);
    header.copy_from_slice(&(input.len() as u64).to_le_bytes());

    // Single-shot compression stays within `compress_bound`, which the payload is sized for.
    let written = zstd::bulk::compress_to_buffer(input, body, level)
        .map_err(|e| BatchzipError::ZstdError(e.to_string()))?;
    Ok(HEADER_LEN + written)
}

//==================================================================================
// 2. Public API
//==================================================================================

pub fn encode(input: &[u8], level: i32) -> Result<Vec<u8>, BatchzipError> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let mut output_buf = Vec::with_capacity(input.len());
    output_buf.extend_from_slice(&(input.len() as u64).to_le_bytes());

    // We use the streaming Encoder, which writes directly to the output buffer.
    let mut encoder = zstd::stream::Encoder::new(&mut output_buf, level)
        .map_err(|e| BatchzipError::ZstdError(e.to_string()))?;
    encoder
        .write_all(input)
        .map_err(|e| BatchzipError::ZstdError(e.to_string()))?;

    // `finish` is essential to finalize the Zstd frame.
    encoder
        .finish()
        .map_err(|e| BatchzipError::ZstdError(e.to_string()))?;

    Ok(output_buf)
}

pub fn decode(input: &[u8]) -> Result<Vec<u8>, BatchzipError> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    if input.len() < HEADER_LEN {
        return Err(BatchzipError::ZstdError(
            "Input stream too short to contain size header.".to_string(),
        ));
    }

    let mut len_bytes = [0u8; HEADER_LEN];
    len_bytes.copy_from_slice(&input[..HEADER_LEN]);
    let uncompressed_len = u64::from_le_bytes(len_bytes) as usize;

    let mut decompressed = Vec::with_capacity(uncompressed_len);
    zstd::stream::copy_decode(&input[HEADER_LEN..], &mut decompressed)
        .map_err(|e| BatchzipError::ZstdError(e.to_string()))?;

    if decompressed.len() != uncompressed_len {
        return Err(BatchzipError::ZstdError(format!(
            "Decompressed size does not match header. Expected {}, got {}.",
            uncompressed_len,
            decompressed.len()
        )));
    }

    Ok(decompressed)
}

//==================================================================================
// 3. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_roundtrip_simple_text() {
        let original_bytes =
            b"hello world, this is a test of zstd compression. hello world, this is a test."
                .to_vec();

        let compressed_bytes = encode(&original_bytes, 3).unwrap();
        assert!(compressed_bytes.len() < original_bytes.len());

        let decompressed_bytes = decode(&compressed_bytes).unwrap();
        assert_eq!(original_bytes, decompressed_bytes);
    }

    #[test]
    fn test_zstd_compress_into_is_decodable() {
        let original_bytes = vec![42u8; 10_000];
        let mut out = vec![0u8; original_bytes.len() + growth(original_bytes.len()) + ITEM_OVERHEAD];

        let written = compress_into(&original_bytes, &mut out, 5).unwrap();

        assert!(written < 60);
        assert_eq!(decode(&out[..written]).unwrap(), original_bytes);
    }

    #[test]
    fn test_zstd_empty_roundtrip() {
        let mut out = [0u8; 16];
        assert_eq!(compress_into(&[], &mut out, 3).unwrap(), 0);
        assert!(decode(&encode(&[], 3).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_zstd_decompress_invalid_data() {
        let invalid_bytes = vec![1, 2, 3, 4, 5]; // This is too short to be valid.
        let result = decode(&invalid_bytes);

        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Zstd"));
        }
    }
}
