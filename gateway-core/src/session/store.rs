//! Registry of live sessions.
//!
//! The store itself is a single map behind a coarse `parking_lot::RwLock`
//! (cheap: lookups and registration are brief, non-blocking operations).
//! Each session's own state is behind its own `parking_lot::Mutex`, so two
//! different sessions never contend with each other and a slow mutation on
//! one session never blocks a lookup of another.
//!
//! This collapses the four separate per-session locks (raw buffer, VAD
//! buffer, outbound+config, debug-persistence) into one per-session mutex.
//! Every caller — the read loop, the heartbeat loop, and the transcription
//! dispatcher — only ever holds it for the duration of a plain field
//! mutation, never across a suspension point or I/O, so the coarser lock
//! preserves the "never held across I/O" policy without the bookkeeping
//! overhead of four handles per session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::error::{GatewayError, Result};
use crate::session::model::{Session, SessionConfig};
use crate::vad::segmenter::VadSegmenterConfig;

pub type SessionHandle = Arc<Mutex<Session>>;

/// Aggregate counts returned by `stats()`.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_sessions: usize,
    pub by_modality: HashMap<&'static str, usize>,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session. Rejects with `GatewayError::Capacity` when
    /// the live count is already at the configured maximum — no per-session
    /// state is allocated in that case.
    pub fn create(
        &self,
        id: String,
        config: SessionConfig,
        segmenter_config: VadSegmenterConfig,
    ) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(GatewayError::Capacity);
        }
        let session = Arc::new(Mutex::new(Session::new(id.clone(), config, segmenter_config)));
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    /// Apply `mutator` under the session's own lock and refresh its
    /// `last_active` timestamp. Returns `UnknownSession` if the id is gone.
    pub fn update<F, T>(&self, id: &str, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> T,
    {
        let handle = self
            .get(id)
            .ok_or_else(|| GatewayError::UnknownSession(id.to_string()))?;
        let mut session = handle.lock();
        let result = mutator(&mut session);
        session.touch();
        Ok(result)
    }

    pub fn delete(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().remove(id)
    }

    pub fn append_raw(&self, id: &str, samples: &[i16]) -> Result<()> {
        self.update(id, |s| s.raw_buffer.extend_from_slice(samples))
    }

    pub fn append_vad(&self, id: &str, samples: &[i16]) -> Result<()> {
        self.update(id, |s| s.vad_buffer.extend_from_slice(samples))
    }

    pub fn raw_size(&self, id: &str) -> Result<usize> {
        self.update(id, |s| s.raw_buffer.len())
    }

    /// Drain and clear the raw buffer, returning whatever had accumulated
    /// since the last drain. Used by the debug-persistence flush.
    pub fn take_raw(&self, id: &str) -> Result<Vec<i16>> {
        self.update(id, |s| std::mem::take(&mut s.raw_buffer))
    }

    pub fn get_vad(&self, id: &str) -> Result<Vec<i16>> {
        self.update(id, |s| s.vad_buffer.clone())
    }

    pub fn clear_vad(&self, id: &str) -> Result<()> {
        self.update(id, |s| s.vad_buffer.clear())
    }

    pub fn vad_size(&self, id: &str) -> Result<usize> {
        self.update(id, |s| s.vad_buffer.len())
    }

    pub fn touch_heartbeat(&self, id: &str) -> Result<()> {
        self.update(id, |s| s.touch_heartbeat())
    }

    /// Remove every session whose `last_active` is older than `timeout`,
    /// signaling each one's `close_signal` first so its owning
    /// `SessionEngine` actually closes the connection instead of being
    /// left running against a session the store no longer tracks.
    pub fn cleanup_inactive(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let stale: Vec<String> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|(_, handle)| now.duration_since(handle.lock().last_active) > timeout)
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut sessions = self.sessions.write();
        for id in &stale {
            if let Some(handle) = sessions.remove(id) {
                handle.lock().close_signal.notify_one();
            }
        }
        stale
    }

    pub fn stats(&self) -> StoreStats {
        let sessions = self.sessions.read();
        let mut by_modality: HashMap<&'static str, usize> = HashMap::new();
        for handle in sessions.values() {
            let modality_key = match handle.lock().config.modality {
                crate::protocol::events::Modality::Text => "text",
                crate::protocol::events::Modality::Audio => "audio",
                crate::protocol::events::Modality::TextAndAudio => "text_and_audio",
            };
            *by_modality.entry(modality_key).or_insert(0) += 1;
        }
        StoreStats {
            total_sessions: sessions.len(),
            by_modality,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
