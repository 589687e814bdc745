//! Audio utilities: PCM byte conversion, resampling, WAV framing.
//!
//! Everything here runs on the session's own async task — there is no
//! realtime audio thread in this gateway, so none of the allocation or
//! locking constraints a capture callback would impose apply.

pub mod convert;
pub mod persistence;
pub mod resample;
pub mod wav;

pub use convert::{bytes_to_i16_le, i16_to_bytes_le, merge_chunks, split_into_chunks, trim_silence};
pub use resample::RateConverter;
pub use wav::pcm_to_wav;
