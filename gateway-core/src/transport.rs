//! Transport abstraction so the session engine's read loop and dispatch
//! table can be exercised without a real socket.
//!
//! `gateway-server` implements this trait over `axum::extract::ws::WebSocket`;
//! tests implement it over an in-memory channel pair.

use async_trait::async_trait;

use crate::error::Result;

/// One inbound frame, collapsed to the variants the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close,
}

/// A bidirectional message-oriented connection.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next inbound frame. `None` means the connection closed.
    async fn recv(&mut self) -> Option<Result<InboundMessage>>;

    /// Send a text frame (a serialized protocol event).
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Send a low-level ping frame, used by the heartbeat loop.
    async fn send_ping(&mut self) -> Result<()>;

    /// Send a low-level pong frame, in response to an inbound ping.
    async fn send_pong(&mut self) -> Result<()>;

    /// Close the connection from the server side.
    async fn close(&mut self) -> Result<()>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    //! An in-memory `Transport` used by gateway-core's own tests and by
    //! `gateway-server`'s integration tests, so neither needs a real socket.

    use super::*;
    use tokio::sync::mpsc;

    pub struct MockTransport {
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        pub outbound: mpsc::UnboundedSender<InboundMessage>,
        closed: bool,
    }

    /// Returns (transport, inbound feeder, outbound reader).
    pub fn channel() -> (
        MockTransport,
        mpsc::UnboundedSender<InboundMessage>,
        mpsc::UnboundedReceiver<InboundMessage>,
    ) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MockTransport {
                inbound: in_rx,
                outbound: out_tx,
                closed: false,
            },
            in_tx,
            out_rx,
        )
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn recv(&mut self) -> Option<Result<InboundMessage>> {
            if self.closed {
                return None;
            }
            self.inbound.recv().await.map(Ok)
        }

        async fn send_text(&mut self, text: String) -> Result<()> {
            let _ = self.outbound.send(InboundMessage::Text(text));
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<()> {
            let _ = self.outbound.send(InboundMessage::Ping);
            Ok(())
        }

        async fn send_pong(&mut self) -> Result<()> {
            let _ = self.outbound.send(InboundMessage::Pong);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }
}
