//! Connection acceptor (C8): wires a freshly upgraded transport into a new
//! `SessionEngine`, and the idle-session sweep that backs the timeout
//! policy in the concurrency model.
//!
//! The actual protocol upgrade (HTTP → WebSocket) is `gateway-server`'s job,
//! since it is inseparable from the HTTP framework in use. This module
//! picks up right after that: given any `T: Transport`, assign it a session
//! id, spawn its engine task, and return a handle the caller can await or
//! detach.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{EngineConfig, SessionEngine};
use crate::session::SessionStore;
use crate::transcription::TranscriptionClient;
use crate::transport::Transport;

/// Everything a new connection needs to become a running session.
#[derive(Clone)]
pub struct Acceptor {
    store: Arc<SessionStore>,
    dispatcher: Arc<TranscriptionClient>,
    engine_config: EngineConfig,
}

impl Acceptor {
    pub fn new(
        store: Arc<SessionStore>,
        dispatcher: Arc<TranscriptionClient>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            engine_config,
        }
    }

    /// Accept one upgraded connection: assign it a session id and spawn its
    /// engine task. The returned handle resolves when the session ends,
    /// which the caller is free to ignore (detached) or await.
    pub fn accept<T>(&self, transport: T) -> JoinHandle<()>
    where
        T: Transport + 'static,
    {
        let session_id = format!("sess_{}", Uuid::new_v4().simple());
        let engine = SessionEngine::new(
            session_id,
            transport,
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
            self.engine_config.clone(),
        );
        tokio::spawn(engine.run())
    }
}

/// Periodically remove sessions whose `last_active` exceeds `timeout`.
/// Runs until the process exits; `gateway-server` spawns this once at
/// startup alongside the acceptor.
pub async fn run_idle_sweep(store: Arc<SessionStore>, timeout: Duration, sweep_interval: Duration) {
    let mut ticker = tokio::time::interval(sweep_interval);
    loop {
        ticker.tick().await;
        let removed = store.cleanup_inactive(Instant::now(), timeout);
        if !removed.is_empty() {
            info!(count = removed.len(), "swept idle sessions");
            for id in removed {
                debug!(session_id = %id, "removed idle session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::SessionConfig;
    use crate::transcription::DispatcherConfig;
    use crate::transport::mock::channel;
    use crate::vad::segmenter::VadSegmenterConfig;

    fn dispatcher() -> Arc<TranscriptionClient> {
        Arc::new(
            TranscriptionClient::new(DispatcherConfig {
                base_url: "https://example.invalid".to_string(),
                api_key: "sk-test".to_string(),
                request_timeout: Duration::from_secs(5),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn accept_spawns_a_running_session() {
        let store = Arc::new(SessionStore::new(10));
        let acceptor = Acceptor::new(Arc::clone(&store), dispatcher(), EngineConfig::default());

        let (transport, inbound_tx, mut outbound_rx) = channel();
        let handle = acceptor.accept(transport);

        let first = outbound_rx.recv().await;
        assert!(first.is_some());

        drop(inbound_tx);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn idle_sweep_removes_stale_sessions() {
        let store = Arc::new(SessionStore::new(10));
        store
            .create(
                "stale".to_string(),
                SessionConfig::default(),
                VadSegmenterConfig::default(),
            )
            .unwrap();
        store.get("stale").unwrap().lock().last_active =
            Instant::now() - Duration::from_secs(3600);

        let removed = store.cleanup_inactive(Instant::now(), Duration::from_secs(1));
        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(store.is_empty());
    }
}
