//! Realtime speech-to-text gateway entry point.

mod config;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use gateway_core::transcription::{DispatcherConfig, TranscriptionClient};
use gateway_core::{Acceptor, EngineConfig, SessionStore};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info".parse().unwrap()),
        )
        .init();

    info!("gateway-server starting");

    let config_path = config::default_config_path();
    let settings = config::load_config(&config_path)?;

    if settings.asr.api_key.is_empty() {
        tracing::warn!("GATEWAY_ASR_API_KEY is unset; transcription requests will fail");
    }

    let store = Arc::new(SessionStore::new(settings.max_sessions));

    let dispatcher = Arc::new(TranscriptionClient::new(DispatcherConfig {
        base_url: settings.asr.base_url.clone(),
        api_key: settings.asr.api_key.clone(),
        request_timeout: Duration::from_secs(settings.asr.request_timeout_secs),
    })?);

    if settings.audio_persistence.enabled {
        tracing::info!(
            directory = %settings.audio_persistence.directory,
            keep_files = settings.audio_persistence.keep_files,
            "debug audio persistence enabled"
        );
    }

    let engine_config = EngineConfig {
        heartbeat_interval: settings.heartbeat_interval(),
        force_asr_after: settings.force_asr_after(),
        segmenter_config: settings.vad_segmenter_config(),
        persistence: settings.audio_persistence.clone(),
    };

    let acceptor = Arc::new(Acceptor::new(
        Arc::clone(&store),
        dispatcher,
        engine_config,
    ));

    tokio::spawn(gateway_core::run_idle_sweep(
        Arc::clone(&store),
        settings.session_timeout(),
        Duration::from_secs(60),
    ));

    let state = ws::AppState { acceptor };
    let app = Router::new()
        .route("/v1/realtime", get(ws::realtime_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", settings.listen_port);
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
