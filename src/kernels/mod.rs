//! This module contains the single-item compression kernels a worker runs.
//!
//! The pool treats each kernel as an opaque `compress(bytes) -> bytes` call. The
//! only pool-specific requirements are that a kernel can write its output
//! directly into a caller-provided slice of the output payload, and that it can
//! state a worst-case output size so the payload can be sized up front.

pub mod gzip;
pub mod zstd;

use crate::config::CodecKind;
use crate::error::BatchzipError;

//==================================================================================
// 1. Dispatch
//==================================================================================

/// Compresses `input` into `out`, returning the number of bytes written.
///
/// Fails (without panicking) if the result does not fit in `out`.
pub fn compress_into(
    codec: &CodecKind,
    input: &[u8],
    out: &mut [u8],
) -> Result<usize, BatchzipError> {
    match *codec {
        CodecKind::Gzip { level } => gzip::compress_into(input, out, level),
        CodecKind::Zstd { level } => zstd::compress_into(input, out, level),
    }
}

/// Allocating form of [`compress_into`].
pub fn compress(codec: &CodecKind, input: &[u8]) -> Result<Vec<u8>, BatchzipError> {
    match *codec {
        CodecKind::Gzip { level } => gzip::encode(input, level),
        CodecKind::Zstd { level } => zstd::encode(input, level),
    }
}

/// Reverses [`compress`] (and [`compress_into`]) for the given codec.
pub fn decompress(codec: &CodecKind, input: &[u8]) -> Result<Vec<u8>, BatchzipError> {
    match codec {
        CodecKind::Gzip { .. } => gzip::decode(input),
        CodecKind::Zstd { .. } => zstd::decode(input),
    }
}

//==================================================================================
// 2. Sizing & Validation
//==================================================================================

/// Output payload size for a batch of at most `max_batch_count` items totalling
/// at most `max_batch_bytes` input bytes.
///
/// Both bounds are of the form `n + growth(n) + per_item`, where `growth` is a
/// sum of right shifts. Shifts of a sum dominate the sum of shifts, so sizing
/// on the batch total covers any split of it into items.
pub fn output_capacity(codec: &CodecKind, max_batch_bytes: usize, max_batch_count: usize) -> usize {
    let (growth, per_item) = match codec {
        CodecKind::Gzip { .. } => (gzip::growth(max_batch_bytes), gzip::ITEM_OVERHEAD),
        CodecKind::Zstd { .. } => (zstd::growth(max_batch_bytes), zstd::ITEM_OVERHEAD),
    };
    max_batch_bytes
        .saturating_add(growth)
        .saturating_add(max_batch_count.saturating_mul(per_item))
}

pub fn validate_level(codec: &CodecKind) -> Result<(), BatchzipError> {
    match *codec {
        CodecKind::Gzip { level } if level > 9 => Err(BatchzipError::InvalidConfig(format!(
            "gzip level must be within 0..=9, got {}",
            level
        ))),
        CodecKind::Zstd { level } if !::zstd::compression_level_range().contains(&level) => {
            Err(BatchzipError::InvalidConfig(format!(
                "zstd level {} is outside the supported range",
                level
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_bytes(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x9E37_79B9;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn every_codec() -> Vec<CodecKind> {
        let mut codecs: Vec<CodecKind> = (0..=9).map(|level| CodecKind::Gzip { level }).collect();
        codecs.extend([1, 3, 19].map(|level| CodecKind::Zstd { level }));
        codecs
    }

    #[test]
    fn test_capacity_covers_incompressible_items() {
        // Pseudo-random bytes compress poorly; every split must still fit.
        let data = noisy_bytes(64 * 1024);

        for codec in every_codec() {
            for chunk in [1, 31, 1000, 40_000] {
                let items: Vec<&[u8]> = data.chunks(chunk).take(256).collect();
                let total: usize = items.iter().map(|item| item.len()).sum();
                let capacity = output_capacity(&codec, total + 1, items.len());
                let mut out = vec![0u8; capacity];
                let mut offset = 0;
                for item in &items {
                    offset += compress_into(&codec, item, &mut out[offset..])
                        .unwrap_or_else(|e| panic!("{:?}, chunk {}: {}", codec, chunk, e));
                }
                assert!(offset <= capacity);
            }
        }
    }

    #[test]
    fn test_capacity_covers_one_item_filling_the_batch() {
        let max_batch_bytes = 1024 * 1024;
        let data = noisy_bytes(max_batch_bytes - 1);

        for codec in every_codec() {
            let mut out = vec![0u8; output_capacity(&codec, max_batch_bytes, 1)];
            let written = compress_into(&codec, &data, &mut out)
                .unwrap_or_else(|e| panic!("{:?}: {}", codec, e));
            assert_eq!(decompress(&codec, &out[..written]).unwrap(), data);
        }
    }

    #[test]
    fn test_compress_into_too_small_buffer_fails_cleanly() {
        let codec = CodecKind::default();
        let mut tiny = [0u8; 4];
        let result = compress_into(&codec, b"this will not fit in four bytes", &mut tiny);
        assert!(result.is_err());
    }

    #[test]
    fn test_dispatch_roundtrip_both_codecs() {
        let original = b"batch batch batch batch batch".to_vec();
        for codec in [CodecKind::Gzip { level: 1 }, CodecKind::Zstd { level: 1 }] {
            let compressed = compress(&codec, &original).unwrap();
            assert_eq!(decompress(&codec, &compressed).unwrap(), original);
        }
    }
}
