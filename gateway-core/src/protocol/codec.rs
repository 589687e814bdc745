//! Parsing, validation, and serialization of wire events.

use crate::error::{GatewayError, Result};
use crate::protocol::events::{ClientEvent, ServerEvent};

/// Decode a single incoming text frame into a `ClientEvent`.
///
/// Unknown `type` values and malformed JSON both surface as
/// `GatewayError::Codec`, mirroring the server's `error` event contract in
/// §6.2: the caller is expected to turn this into an `error` frame rather
/// than drop the connection.
pub fn decode_client_event(raw: &str) -> Result<ClientEvent> {
    serde_json::from_str(raw).map_err(|e| GatewayError::Codec(e.to_string()))
}

/// Serialize a `ServerEvent` to the JSON text frame sent over the wire.
pub fn encode_server_event(event: &ServerEvent) -> Result<String> {
    serde_json::to_string(event).map_err(|e| GatewayError::Codec(e.to_string()))
}

/// Structural validation of a parsed client event, run immediately after
/// `decode_client_event` and before dispatch. Catches malformed-but-valid-
/// JSON events the type system alone can't rule out: an empty audio
/// payload, a sample rate the gateway doesn't resample from.
pub fn validate(event: &ClientEvent) -> Result<()> {
    match event {
        ClientEvent::InputAudioBufferAppend { audio, .. } => {
            if audio.is_empty() {
                return Err(GatewayError::Validation(
                    "input_audio_buffer.append payload is empty".to_string(),
                ));
            }
            Ok(())
        }
        ClientEvent::SessionUpdate { session, .. } => {
            for format in [&session.input_audio_format, &session.output_audio_format] {
                if let Some(format) = format {
                    if format.sample_rate != 16_000 && format.sample_rate != 48_000 {
                        return Err(GatewayError::Validation(format!(
                            "unsupported sample rate: {}",
                            format.sample_rate
                        )));
                    }
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Decode a base64-encoded PCM16 audio chunk.
///
/// Accepts both a bare base64 string and one carrying a `data:audio/...`
/// URL prefix, stripping the prefix before decoding.
pub fn decode_base64_pcm(payload: &str) -> Result<Vec<u8>> {
    let stripped = match payload.find(",") {
        Some(idx) if payload.starts_with("data:") => &payload[idx + 1..],
        _ => payload,
    };
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, stripped)
        .map_err(|e| GatewayError::Codec(format!("invalid base64 audio payload: {e}")))
}

/// Encode raw PCM16 bytes as a bare base64 string (no data-URL prefix),
/// used when echoing committed audio back in `conversation.item.created`.
pub fn encode_pcm_base64(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_session_update() {
        let raw = r#"{"type":"session.update","session":{}}"#;
        let event = decode_client_event(raw).unwrap();
        assert_eq!(event.type_name(), "session.update");
    }

    #[test]
    fn rejects_garbage_json() {
        let err = decode_client_event("not json at all").unwrap_err();
        assert!(matches!(err, GatewayError::Codec(_)));
    }

    #[test]
    fn round_trips_bare_base64() {
        let original = vec![1u8, 2, 3, 4, 250, 251];
        let encoded = encode_pcm_base64(&original);
        let decoded = decode_base64_pcm(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn strips_data_url_prefix_before_decoding() {
        let original = vec![9u8, 8, 7];
        let encoded = encode_pcm_base64(&original);
        let prefixed = format!("data:audio/wav;base64,{encoded}");
        let decoded = decode_base64_pcm(&prefixed).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_base64_pcm("!!!not base64!!!").unwrap_err();
        assert!(matches!(err, GatewayError::Codec(_)));
    }

    #[test]
    fn validate_rejects_empty_append_payload() {
        let event = decode_client_event(r#"{"type":"input_audio_buffer.append","audio":""}"#).unwrap();
        let err = validate(&event).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn validate_rejects_unsupported_sample_rate() {
        let raw = r#"{"type":"session.update","session":{"input_audio_format":{"type":"pcm16","sample_rate":8000,"channels":1}}}"#;
        let event = decode_client_event(raw).unwrap();
        let err = validate(&event).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn validate_accepts_well_formed_events() {
        let event = decode_client_event(r#"{"type":"input_audio_buffer.commit"}"#).unwrap();
        assert!(validate(&event).is_ok());
    }

    #[test]
    fn encodes_server_event_with_fresh_tag() {
        let event = ServerEvent::HeartbeatPong {
            event_id: "e1".into(),
            session_id: "s1".into(),
        };
        let json = encode_server_event(&event).unwrap();
        assert!(json.contains("\"type\":\"heartbeat.pong\""));
    }
}
