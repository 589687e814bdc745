//! Per-session VAD segmenter: wraps a `VoiceActivityDetector` behind the
//! fixed-window contract the session engine drives it with.

use super::{EnergyVad, VoiceActivityDetector};

/// One window's worth of samples the detector attributed to speech.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
}

/// Segmenter configuration, derived from a session's turn-detection config
/// at session creation. `provider` names the detector backend; only the
/// energy-based default is built in, but the field exists so an
/// alternative provider can be selected without changing the contract.
#[derive(Debug, Clone)]
pub struct VadSegmenterConfig {
    pub threshold: f32,
    pub min_silence_duration_secs: f32,
    pub min_speech_duration_secs: f32,
    pub max_speech_duration_secs: f32,
    pub window_size: usize,
    pub provider: String,
}

impl Default for VadSegmenterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            min_silence_duration_secs: 0.5,
            min_speech_duration_secs: 0.1,
            max_speech_duration_secs: 30.0,
            window_size: 160,
            provider: "energy".to_string(),
        }
    }
}

/// Stateful per-session detector. Consumes fixed-size 16 kHz mono f32
/// windows and emits completed speech windows; never shares state across
/// sessions (each session owns its own instance).
pub struct VadSegmenter {
    detector: Box<dyn VoiceActivityDetector>,
    config: VadSegmenterConfig,
    /// Running count of consecutive speech samples, used to cap a single
    /// burst at `max_speech_duration_secs` — beyond that the segmenter
    /// reports silence, forcing the turn-detection layer to cut the turn.
    consecutive_speech_samples: usize,
    /// Samples carried over between `push` calls, awaiting a full window.
    scratch: Vec<f32>,
}

impl VadSegmenter {
    pub fn new(config: VadSegmenterConfig) -> Self {
        let hangover_frames =
            ((config.min_silence_duration_secs * 16_000.0) / config.window_size as f32).round()
                as u32;
        let detector: Box<dyn VoiceActivityDetector> =
            Box::new(EnergyVad::new(config.threshold, hangover_frames));
        Self {
            detector,
            config,
            consecutive_speech_samples: 0,
            scratch: Vec::new(),
        }
    }

    fn max_speech_samples(&self) -> usize {
        (self.config.max_speech_duration_secs * 16_000.0) as usize
    }

    /// Consume exactly one window. The window length need not equal
    /// `window_size`, but callers normally route through `push` which
    /// enforces that.
    pub fn process(&mut self, window: &[f32]) -> Option<SpeechSegment> {
        let decision = self.detector.classify(window);
        if !decision.is_speech() {
            self.consecutive_speech_samples = 0;
            return None;
        }

        self.consecutive_speech_samples += window.len();
        if self.consecutive_speech_samples > self.max_speech_samples() {
            self.consecutive_speech_samples = 0;
            self.detector.reset();
            return None;
        }

        Some(SpeechSegment {
            samples: window.to_vec(),
        })
    }

    /// Accumulate `samples` into the scratch buffer and process every
    /// complete `window_size` window that becomes available, in order.
    /// Each element is the outcome of one window tick: `Some` for a
    /// speech window, `None` for a silent one — callers that need to
    /// drive a turn-detection state machine need both, not just the
    /// speech windows.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Option<SpeechSegment>> {
        self.scratch.extend_from_slice(samples);
        let mut out = Vec::new();
        while self.scratch.len() >= self.config.window_size {
            let window: Vec<f32> = self.scratch.drain(..self.config.window_size).collect();
            out.push(self.process(&window));
        }
        out
    }

    /// Drop all internal state: scratch buffer, detector hangover state,
    /// and burst-length tracking. Used on `input_audio_buffer.clear`.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.scratch.clear();
        self.consecutive_speech_samples = 0;
    }

    pub fn config(&self) -> &VadSegmenterConfig {
        &self.config
    }
}
