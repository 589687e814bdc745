//! # gateway-core
//!
//! Session engine SDK for the realtime speech-to-text gateway.
//!
//! ## Architecture
//!
//! ```text
//! Transport (WebSocket) → SessionEngine → VadSegmenter → turn_detection
//!                                                              │
//!                                                     TranscriptionClient
//!                                                              │
//!                                                   ServerEvent (back over Transport)
//! ```
//!
//! Every connection gets its own `SessionEngine` task; there is no shared
//! audio thread or ring buffer here — each session's state lives behind its
//! own lock in the `SessionStore` and is only ever touched from that task
//! plus whichever task is running its transcription dispatch.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod acceptor;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transcription;
pub mod transport;
pub mod turn_detection;
pub mod vad;

pub use acceptor::{run_idle_sweep, Acceptor};
pub use config::GatewayConfig;
pub use engine::{EngineConfig, SessionEngine};
pub use error::GatewayError;
pub use session::{Session, SessionConfig, SessionStore};
pub use transport::{InboundMessage, Transport};
