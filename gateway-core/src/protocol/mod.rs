//! The realtime wire protocol: event types and their codec.

pub mod codec;
pub mod events;

pub use codec::{decode_base64_pcm, decode_client_event, encode_pcm_base64, encode_server_event};
pub use events::{
    AudioFormat, ClientEvent, ContentPart, ErrorDetail, Modality, ServerEvent,
    SessionConfigPatch, TurnDetectionConfig,
};
