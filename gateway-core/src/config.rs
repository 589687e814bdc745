//! Shared configuration shape, read once at process start.
//!
//! `gateway-core` only defines the struct and its defaults; loading it from
//! a TOML file plus environment overlay is `gateway-server`'s job (the
//! core's own scope per its component design stops at "configuration is a
//! value passed in").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::vad::segmenter::VadSegmenterConfig;

/// VAD tuning, as accepted from a configuration source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub threshold: f32,
    pub min_silence_duration_secs: f32,
    pub min_speech_duration_secs: f32,
    pub max_speech_duration_secs: f32,
    pub window_size: usize,
    /// If set, the safety-valve that forces a commit once the VAD buffer
    /// has been accumulating for this long without a client-sent commit.
    /// A deviation from the spec-correct "wait for client" behavior; leave
    /// unset in production.
    pub force_asr_after_seconds: Option<u64>,
}

impl Default for VadConfig {
    fn default() -> Self {
        let defaults = VadSegmenterConfig::default();
        Self {
            threshold: defaults.threshold,
            min_silence_duration_secs: defaults.min_silence_duration_secs,
            min_speech_duration_secs: defaults.min_speech_duration_secs,
            max_speech_duration_secs: defaults.max_speech_duration_secs,
            window_size: defaults.window_size,
            force_asr_after_seconds: None,
        }
    }
}

impl From<&VadConfig> for VadSegmenterConfig {
    fn from(config: &VadConfig) -> Self {
        VadSegmenterConfig {
            threshold: config.threshold,
            min_silence_duration_secs: config.min_silence_duration_secs,
            min_speech_duration_secs: config.min_speech_duration_secs,
            max_speech_duration_secs: config.max_speech_duration_secs,
            window_size: config.window_size,
            provider: "energy".to_string(),
        }
    }
}

/// Debug audio persistence. Entirely optional; disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioPersistenceConfig {
    pub enabled: bool,
    pub directory: String,
    pub keep_files: usize,
    pub buffer_duration_secs: u64,
}

impl Default for AudioPersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "./debug-audio".to_string(),
            keep_files: 20,
            buffer_duration_secs: 30,
        }
    }
}

/// The external transcription service a committed utterance is dispatched
/// to. `api_key` is deliberately never given a useful default — callers are
/// expected to overlay it from an environment variable rather than a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini-transcribe".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Full process configuration, matching the fields enumerated in
/// "External Interfaces": listen port, session timeout, max concurrent
/// sessions, heartbeat interval, ASR settings, VAD parameters, and audio
/// persistence options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_port: u16,
    pub session_timeout_secs: u64,
    pub max_sessions: usize,
    pub heartbeat_interval_secs: u64,
    pub asr: AsrConfig,
    pub vad: VadConfig,
    pub audio_persistence: AudioPersistenceConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_port: 8787,
            session_timeout_secs: 30 * 60,
            max_sessions: 256,
            heartbeat_interval_secs: 30,
            asr: AsrConfig::default(),
            vad: VadConfig::default(),
            audio_persistence: AudioPersistenceConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn force_asr_after(&self) -> Option<Duration> {
        self.vad.force_asr_after_seconds.map(Duration::from_secs)
    }

    pub fn vad_segmenter_config(&self) -> VadSegmenterConfig {
        VadSegmenterConfig::from(&self.vad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_port, 8787);
        assert_eq!(config.max_sessions, 256);
        assert_eq!(config.heartbeat_interval_secs, 30);
        assert!(config.vad.force_asr_after_seconds.is_none());
    }

    #[test]
    fn deserializes_partial_toml_with_defaults() {
        let toml_str = r#"
            listen_port = 9000

            [asr]
            base_url = "https://example.invalid/v1"
        "#;
        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.asr.base_url, "https://example.invalid/v1");
        assert_eq!(config.asr.model, "gpt-4o-mini-transcribe");
        assert_eq!(config.max_sessions, 256);
    }

    #[test]
    fn vad_segmenter_config_carries_thresholds_through() {
        let mut config = GatewayConfig::default();
        config.vad.threshold = 0.1;
        config.vad.window_size = 320;
        let segmenter_config = config.vad_segmenter_config();
        assert_eq!(segmenter_config.threshold, 0.1);
        assert_eq!(segmenter_config.window_size, 320);
    }
}
