//! Server-side turn-detection state machine (IDLE / SPEAKING).
//!
//! Deliberately does not auto-commit on VAD silence — the client is
//! required to send `input_audio_buffer.commit`. This is a spec deviation
//! from the source's auto-commit shortcut, kept explicit here rather than
//! folded silently into the state machine.

use std::time::{Duration, Instant};

use crate::protocol::events::TurnDetectionConfig;
use crate::session::model::{Session, TurnState};

/// A transition the engine should translate into an outbound protocol
/// event. `on_segment`/`on_empty_tick` never emit the event themselves —
/// they only mutate session state and report what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    SpeechStarted { audio_start_ms: u64 },
    SpeechStopped { audio_end_ms: u64 },
}

/// `silence_timeout = max(500ms, configured min_silence_duration)`.
pub fn silence_timeout(config: &TurnDetectionConfig) -> Duration {
    Duration::from_millis(config.silence_duration_ms.max(500) as u64)
}

/// Feed one non-empty speech segment into the state machine.
///
/// Always appends the segment's samples to the VAD buffer, regardless of
/// whether this causes a state transition.
pub fn on_segment(session: &mut Session, segment_i16: &[i16], now: Instant) -> Option<TurnEvent> {
    session.vad_buffer.extend_from_slice(segment_i16);

    match session.turn_state {
        TurnState::Idle => {
            session.turn_state = TurnState::Speaking;
            session.speech_start_time = Some(now);
            Some(TurnEvent::SpeechStarted { audio_start_ms: 0 })
        }
        TurnState::Speaking => {
            session.speech_start_time = Some(now);
            None
        }
    }
}

/// Feed one silent window (a tick with no segment) into the state machine.
pub fn on_empty_tick(session: &mut Session, now: Instant, timeout: Duration) -> Option<TurnEvent> {
    if session.turn_state != TurnState::Speaking {
        return None;
    }
    let Some(start) = session.speech_start_time else {
        return None;
    };
    if now.duration_since(start) <= timeout {
        return None;
    }

    session.turn_state = TurnState::Idle;
    let audio_end_ms = now.duration_since(start).as_millis() as u64;
    Some(TurnEvent::SpeechStopped { audio_end_ms })
}

/// Forced-commit safety valve: if `force_after` is set and the VAD buffer
/// holds more than a second of 16 kHz audio and that long has passed since
/// the last forced dispatch, the caller should synthesize a commit. This
/// overrides the spec-correct "wait for client" behavior and exists purely
/// as a testing/operational convenience — document any use of it.
pub fn should_force_commit(
    session: &Session,
    force_after: Option<Duration>,
    now: Instant,
) -> bool {
    let Some(force_after) = force_after else {
        return false;
    };
    if session.vad_buffer.len() <= 16_000 {
        return false;
    }
    let since_last = session
        .last_forced_dispatch
        .map(|t| now.duration_since(t))
        .unwrap_or(Duration::MAX);
    since_last >= force_after
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::SessionConfig;
    use crate::vad::segmenter::VadSegmenterConfig;

    fn session() -> Session {
        Session::new(
            "s1".to_string(),
            SessionConfig::default(),
            VadSegmenterConfig::default(),
        )
    }

    #[test]
    fn idle_plus_segment_starts_speaking() {
        let mut s = session();
        let now = Instant::now();
        let event = on_segment(&mut s, &[1, 2, 3], now);
        assert_eq!(event, Some(TurnEvent::SpeechStarted { audio_start_ms: 0 }));
        assert_eq!(s.turn_state, TurnState::Speaking);
        assert_eq!(s.vad_buffer, vec![1, 2, 3]);
    }

    #[test]
    fn speaking_plus_segment_emits_nothing_but_appends() {
        let mut s = session();
        let now = Instant::now();
        on_segment(&mut s, &[1], now);
        let event = on_segment(&mut s, &[2], now);
        assert_eq!(event, None);
        assert_eq!(s.vad_buffer, vec![1, 2]);
    }

    #[test]
    fn empty_tick_before_timeout_stays_speaking() {
        let mut s = session();
        let now = Instant::now();
        on_segment(&mut s, &[1], now);
        let event = on_empty_tick(&mut s, now, Duration::from_millis(500));
        assert_eq!(event, None);
        assert_eq!(s.turn_state, TurnState::Speaking);
    }

    #[test]
    fn empty_tick_past_timeout_stops_speaking() {
        let mut s = session();
        let start = Instant::now();
        on_segment(&mut s, &[1], start);
        let later = start + Duration::from_millis(600);
        let event = on_empty_tick(&mut s, later, Duration::from_millis(500));
        assert!(matches!(event, Some(TurnEvent::SpeechStopped { audio_end_ms }) if audio_end_ms >= 500));
        assert_eq!(s.turn_state, TurnState::Idle);
    }

    #[test]
    fn empty_tick_while_idle_is_noop() {
        let mut s = session();
        let event = on_empty_tick(&mut s, Instant::now(), Duration::from_millis(500));
        assert_eq!(event, None);
    }

    #[test]
    fn silence_timeout_floors_at_500ms() {
        let config = TurnDetectionConfig {
            silence_duration_ms: 100,
            ..Default::default()
        };
        assert_eq!(silence_timeout(&config), Duration::from_millis(500));
    }

    #[test]
    fn force_commit_requires_buffer_over_one_second() {
        let mut s = session();
        assert!(!should_force_commit(&s, Some(Duration::from_secs(5)), Instant::now()));
        s.vad_buffer = vec![0i16; 20_000];
        assert!(should_force_commit(&s, Some(Duration::from_secs(5)), Instant::now()));
    }

    #[test]
    fn force_commit_disabled_when_not_configured() {
        let mut s = session();
        s.vad_buffer = vec![0i16; 20_000];
        assert!(!should_force_commit(&s, None, Instant::now()));
    }
}
