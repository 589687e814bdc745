//! The per-connection `Session` value and its owned state.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::protocol::events::{AudioFormat, Modality, TurnDetectionConfig};
use crate::vad::segmenter::{VadSegmenter, VadSegmenterConfig};

/// Status of a conversation item's transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    InProgress,
    Completed,
    Failed,
}

/// A single user utterance and its transcription outcome.
#[derive(Debug, Clone)]
pub struct ConversationItem {
    pub id: String,
    pub kind: String,
    pub status: ItemStatus,
    pub role: Option<String>,
    pub transcript: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Instant,
    pub completed_at: Option<Instant>,
}

impl ConversationItem {
    pub fn new(kind: impl Into<String>, role: Option<String>) -> Self {
        Self {
            id: format!("item_{}", Uuid::new_v4().simple()),
            kind: kind.into(),
            status: ItemStatus::InProgress,
            role,
            transcript: None,
            error_message: None,
            created_at: Instant::now(),
            completed_at: None,
        }
    }
}

/// Mutable session configuration, seeded from defaults and merged with
/// `session.update` patches.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub modality: Modality,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub transcription_model: String,
    pub language: Option<String>,
    pub turn_detection: TurnDetectionConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modality: Modality::Audio,
            input_audio_format: AudioFormat::default(),
            output_audio_format: AudioFormat::default(),
            transcription_model: "gpt-4o-mini-transcribe".to_string(),
            language: None,
            turn_detection: TurnDetectionConfig::default(),
        }
    }
}

/// Whether the turn-detection engine currently considers the session to be
/// mid-utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Speaking,
}

/// Server-side state for one open client connection.
pub struct Session {
    pub id: String,
    pub config: SessionConfig,
    pub created_at: Instant,
    pub last_active: Instant,
    pub last_heartbeat: Instant,
    pub speech_start_time: Option<Instant>,

    /// Raw samples from every `input_audio_buffer.append`, for optional
    /// debug persistence. Never read by the VAD or the dispatcher.
    pub raw_buffer: Vec<i16>,
    /// VAD-confirmed samples only, always 16 kHz mono. This is what gets
    /// wrapped into a WAV and sent to the transcription service.
    pub vad_buffer: Vec<i16>,

    pub items: Vec<ConversationItem>,
    pub turn_state: TurnState,

    pub segmenter: VadSegmenter,
    /// Last wall-clock time a forced commit was dispatched, for the
    /// `force_asr_after_seconds` safety valve.
    pub last_forced_dispatch: Option<Instant>,

    /// Signaled by the store's idle sweep (or any other forced teardown)
    /// to tell the owning `SessionEngine` to close its transport and exit
    /// its read loop, rather than leaving the connection open against a
    /// session the store no longer tracks.
    pub close_signal: Arc<Notify>,
}

impl Session {
    pub fn new(id: String, config: SessionConfig, segmenter_config: VadSegmenterConfig) -> Self {
        let now = Instant::now();
        Self {
            id,
            config,
            created_at: now,
            last_active: now,
            last_heartbeat: now,
            speech_start_time: None,
            raw_buffer: Vec::new(),
            vad_buffer: Vec::new(),
            items: Vec::new(),
            turn_state: TurnState::Idle,
            close_signal: Arc::new(Notify::new()),
            segmenter: VadSegmenter::new(segmenter_config),
            last_forced_dispatch: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
        self.touch();
    }

    pub fn create_item(&mut self, kind: impl Into<String>, role: Option<String>) -> &ConversationItem {
        let item = ConversationItem::new(kind, role);
        self.items.push(item);
        self.items.last().expect("just pushed")
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut ConversationItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    pub fn mark_item_completed(&mut self, item_id: &str, transcript: String) {
        if let Some(item) = self.item_mut(item_id) {
            item.status = ItemStatus::Completed;
            item.transcript = Some(transcript);
            item.completed_at = Some(Instant::now());
        }
    }

    pub fn mark_item_failed(&mut self, item_id: &str, reason: String) {
        if let Some(item) = self.item_mut(item_id) {
            item.status = ItemStatus::Failed;
            item.error_message = Some(reason);
            item.completed_at = Some(Instant::now());
        }
    }

    pub fn clear_buffers(&mut self) {
        self.raw_buffer.clear();
        self.vad_buffer.clear();
        self.segmenter.reset();
        self.turn_state = TurnState::Idle;
        self.speech_start_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            "sess-1".to_string(),
            SessionConfig::default(),
            VadSegmenterConfig::default(),
        )
    }

    #[test]
    fn create_item_appends_in_progress() {
        let mut s = session();
        let id = s.create_item("message", Some("user".to_string())).id.clone();
        assert_eq!(s.items.len(), 1);
        assert_eq!(s.items[0].status, ItemStatus::InProgress);
        assert_eq!(s.item_mut(&id).unwrap().id, id);
    }

    #[test]
    fn mark_completed_sets_transcript() {
        let mut s = session();
        let id = s.create_item("message", None).id.clone();
        s.mark_item_completed(&id, "hello world".to_string());
        let item = s.item_mut(&id).unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.transcript.as_deref(), Some("hello world"));
    }

    #[test]
    fn mark_failed_sets_error_message() {
        let mut s = session();
        let id = s.create_item("message", None).id.clone();
        s.mark_item_failed(&id, "boom".to_string());
        let item = s.item_mut(&id).unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn clear_buffers_resets_turn_state() {
        let mut s = session();
        s.vad_buffer.extend_from_slice(&[1, 2, 3]);
        s.turn_state = TurnState::Speaking;
        s.speech_start_time = Some(Instant::now());
        s.clear_buffers();
        assert!(s.vad_buffer.is_empty());
        assert_eq!(s.turn_state, TurnState::Idle);
        assert!(s.speech_start_time.is_none());
    }
}
