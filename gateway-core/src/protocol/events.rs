//! Wire event types for the realtime transcription protocol.
//!
//! This is a subset of a well-known realtime-transcription event schema:
//! enough that clients written against that schema can speak to this
//! gateway unchanged, but trimmed to the operations this gateway actually
//! implements (audio streaming + transcription, no TTS/function-calling).

use serde::{Deserialize, Serialize};

/// Modality a session has been configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Audio,
    TextAndAudio,
}

/// Audio format declared for input/output on a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            kind: "pcm16".to_string(),
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

/// Turn-detection parameters, as accepted in `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TurnDetectionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_prefix_padding_ms")]
    pub prefix_padding_ms: u32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
}

fn default_threshold() -> f32 {
    0.5
}
fn default_prefix_padding_ms() -> u32 {
    300
}
fn default_silence_duration_ms() -> u32 {
    500
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            prefix_padding_ms: default_prefix_padding_ms(),
            silence_duration_ms: default_silence_duration_ms(),
        }
    }
}

/// Fields accepted by `session.update`. All fields optional — only
/// present fields are merged into the session's live configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfigPatch {
    pub modality: Option<Modality>,
    pub input_audio_format: Option<AudioFormat>,
    pub output_audio_format: Option<AudioFormat>,
    pub transcription_model: Option<String>,
    pub language: Option<String>,
    pub turn_detection: Option<TurnDetectionConfig>,
    pub tools: Option<Vec<serde_json::Value>>,
}

/// A single piece of conversation item content (transcript text, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl ContentPart {
    pub fn transcript(text: impl Into<String>) -> Self {
        Self {
            kind: "transcript".to_string(),
            transcript: Some(text.into()),
            audio: None,
        }
    }

    pub fn audio(base64_pcm: impl Into<String>) -> Self {
        Self {
            kind: "audio".to_string(),
            transcript: None,
            audio: Some(base64_pcm.into()),
        }
    }
}

/// A structured protocol-level error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// Events the client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        event_id: Option<String>,
        session: SessionConfigPatch,
    },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        event_id: Option<String>,
        audio: String,
    },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit { event_id: Option<String> },
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear { event_id: Option<String> },
    #[serde(rename = "heartbeat.ping")]
    HeartbeatPing { event_id: Option<String> },
    #[serde(rename = "conversation.item.deleted")]
    ConversationItemDeleted {
        event_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.cleared")]
    InputAudioBufferCleared { event_id: Option<String> },
}

impl ClientEvent {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            ClientEvent::SessionUpdate { event_id, .. }
            | ClientEvent::InputAudioBufferAppend { event_id, .. }
            | ClientEvent::InputAudioBufferCommit { event_id }
            | ClientEvent::InputAudioBufferClear { event_id }
            | ClientEvent::HeartbeatPing { event_id }
            | ClientEvent::ConversationItemDeleted { event_id, .. }
            | ClientEvent::InputAudioBufferCleared { event_id } => event_id.as_deref(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit { .. } => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear { .. } => "input_audio_buffer.clear",
            ClientEvent::HeartbeatPing { .. } => "heartbeat.ping",
            ClientEvent::ConversationItemDeleted { .. } => "conversation.item.deleted",
            ClientEvent::InputAudioBufferCleared { .. } => "input_audio_buffer.cleared",
        }
    }
}

/// Events the server emits to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        event_id: String,
        session_id: String,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        event_id: String,
        session_id: String,
    },
    #[serde(rename = "conversation.created")]
    ConversationCreated {
        event_id: String,
        session_id: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        event_id: String,
        session_id: String,
        audio_start_ms: u64,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        event_id: String,
        session_id: String,
        audio_end_ms: u64,
    },
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        event_id: String,
        session_id: String,
    },
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        event_id: String,
        session_id: String,
        item_id: String,
        audio: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        event_id: String,
        session_id: String,
        item_id: String,
        content: Vec<ContentPart>,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    TranscriptionFailed {
        event_id: String,
        session_id: String,
        item_id: String,
        error: ErrorDetail,
    },
    #[serde(rename = "heartbeat.pong")]
    HeartbeatPong {
        event_id: String,
        session_id: String,
    },
    #[serde(rename = "error")]
    Error {
        event_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        error: ErrorDetail,
    },
}

impl ServerEvent {
    /// Fresh `event_id` per outgoing event, as required by §4.1.
    pub fn new_event_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_parses_session_update() {
        let raw = r#"{"type":"session.update","event_id":"ev1","session":{"modality":"audio"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::SessionUpdate { session, .. } => {
                assert_eq!(session.modality, Some(Modality::Audio));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn client_event_rejects_unknown_type() {
        let raw = r#"{"type":"not_a_real_event"}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn server_event_serializes_tagged_type() {
        let event = ServerEvent::SessionCreated {
            event_id: "e1".into(),
            session_id: "s1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session.created");
        assert_eq!(json["session_id"], "s1");
    }

    #[test]
    fn error_detail_serializes_with_optional_param() {
        let detail = ErrorDetail {
            kind: "invalid_request_error".into(),
            code: "message_processing_error".into(),
            message: "bad json".into(),
            param: None,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert!(json.get("param").is_none());
    }
}
