//! Endian-safe PCM16 <-> byte conversion and small buffer utilities.

use crate::audio::resample::RateConverter;
use crate::error::{GatewayError, Result};

/// Decode little-endian PCM16 bytes into samples.
///
/// `bytes.len()` must be even; an odd-length buffer is a caller bug (a
/// truncated or misaligned append) and is rejected rather than silently
/// dropping the trailing byte.
pub fn bytes_to_i16_le(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(GatewayError::AudioFormat(format!(
            "odd byte length {} is not a whole number of PCM16 samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode samples as little-endian PCM16 bytes.
pub fn i16_to_bytes_le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|s| *s as f32 / 32768.0).collect()
}

fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Deterministic 48 kHz → 16 kHz decimation with anti-alias filtering,
/// built on the same rubato pipeline as [`RateConverter`] so there is a
/// single source of truth for the gateway's resampling behavior.
///
/// This is a one-shot conversion over an already-accumulated buffer
/// (e.g. for debug persistence); the streaming append path uses
/// `RateConverter` directly so partial chunks carry over between calls.
pub fn resample_48k_to_16k(samples: &[i16]) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    let floats = i16_to_f32(samples);
    // Using the whole buffer as the chunk size means a single `process`
    // call consumes it in full — no partial remainder carried over.
    let Ok(mut converter) = RateConverter::new(48_000, 16_000, samples.len()) else {
        return samples.to_vec();
    };
    let out = converter.process(&floats);
    f32_to_i16(&out)
}

/// Split a sample buffer into fixed-size chunks; the final chunk may be
/// shorter than `chunk_size`.
pub fn split_into_chunks(samples: &[i16], chunk_size: usize) -> Vec<Vec<i16>> {
    if chunk_size == 0 {
        return vec![samples.to_vec()];
    }
    samples.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

/// Concatenate a sequence of chunks back into one contiguous buffer.
pub fn merge_chunks(chunks: &[Vec<i16>]) -> Vec<i16> {
    let mut out = Vec::with_capacity(chunks.iter().map(|c| c.len()).sum());
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}

/// Trim leading and trailing samples whose absolute value falls at or
/// below `threshold`, leaving the contiguous non-silent span untouched.
pub fn trim_silence(samples: &[i16], threshold: i16) -> Vec<i16> {
    let start = samples
        .iter()
        .position(|s| s.unsigned_abs() > threshold as u16)
        .unwrap_or(samples.len());
    let end = samples
        .iter()
        .rposition(|s| s.unsigned_abs() > threshold as u16)
        .map(|idx| idx + 1)
        .unwrap_or(start);
    samples[start..end].to_vec()
}
