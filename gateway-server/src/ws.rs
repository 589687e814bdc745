//! Bridges an axum `WebSocket` to `gateway_core::Transport`, and the route
//! handler that upgrades an incoming HTTP request into one.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use gateway_core::error::{GatewayError, Result};
use gateway_core::{Acceptor, InboundMessage, Transport};
use tracing::warn;

/// Shared router state: just the acceptor, since everything a connection
/// needs (store, dispatcher, engine config) is already captured in it.
#[derive(Clone)]
pub struct AppState {
    pub acceptor: Arc<Acceptor>,
}

pub async fn realtime_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        state.acceptor.accept(AxumTransport::new(socket));
    })
}

/// `Transport` over an axum `WebSocket`. Ping/pong/close frames map
/// directly; text and binary frames map to the matching `InboundMessage`
/// variants.
pub struct AxumTransport {
    socket: WebSocket,
}

impl AxumTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for AxumTransport {
    async fn recv(&mut self) -> Option<Result<InboundMessage>> {
        match self.socket.recv().await {
            None => None,
            Some(Ok(Message::Text(text))) => Some(Ok(InboundMessage::Text(text))),
            Some(Ok(Message::Binary(bytes))) => Some(Ok(InboundMessage::Binary(bytes))),
            Some(Ok(Message::Ping(_))) => Some(Ok(InboundMessage::Ping)),
            Some(Ok(Message::Pong(_))) => Some(Ok(InboundMessage::Pong)),
            Some(Ok(Message::Close(_))) => Some(Ok(InboundMessage::Close)),
            Some(Err(e)) => {
                warn!(error = %e, "websocket read failed");
                Some(Err(GatewayError::Transport(e.to_string())))
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.socket
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn send_pong(&mut self) -> Result<()> {
        self.socket
            .send(Message::Pong(Vec::new()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.socket
            .close()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}
