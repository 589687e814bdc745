//! Voice Activity Detection (VAD) abstraction.
//!
//! The `VoiceActivityDetector` trait is the primary extensibility point:
//! swap in `EnergyVad` (default) or any future provider without touching
//! the segmenter that drives it.

pub mod energy;
pub mod segmenter;

pub use energy::EnergyVad;
pub use segmenter::VadSegmenter;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// The frame contains speech energy above threshold.
    Speech,
    /// The frame is silent (or below threshold, including hangover period).
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful (hangover counters, RNN hidden states, etc.).
/// A detector classifies fixed-size windows — the segmenter is responsible
/// for slicing a session's 16 kHz mono stream into those windows.
pub trait VoiceActivityDetector: Send + 'static {
    /// Analyse a window of 16 kHz mono f32 samples and return a decision.
    fn classify(&mut self, window: &[f32]) -> VadDecision;

    /// Reset any internal state (e.g. hangover counters, hidden states).
    fn reset(&mut self);
}
