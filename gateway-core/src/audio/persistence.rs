//! Optional debug facility: periodically drain a session's raw audio
//! buffer to a WAV file on disk, then cap how many accumulate.
//!
//! Disabled by default (`AudioPersistenceConfig::enabled`); the core never
//! reads these files back, they exist purely so an operator can inspect
//! what a session actually received.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::AudioPersistenceConfig;

use super::wav::pcm_to_wav;

/// Decides, for one session, when its accumulated raw samples are due to
/// be flushed to disk: every `buffer_duration_secs` of audio, or every
/// `buffer_duration_secs` of wall time, whichever comes first.
pub struct PersistenceTracker {
    directory: PathBuf,
    keep_files: usize,
    flush_interval: Duration,
    flush_samples: usize,
    last_flush: Instant,
}

impl PersistenceTracker {
    pub fn new(config: &AudioPersistenceConfig) -> Self {
        Self {
            directory: PathBuf::from(&config.directory),
            keep_files: config.keep_files,
            flush_interval: Duration::from_secs(config.buffer_duration_secs),
            flush_samples: config.buffer_duration_secs as usize * 16_000,
            last_flush: Instant::now(),
        }
    }

    pub fn due(&self, buffered_samples: usize) -> bool {
        buffered_samples >= self.flush_samples || self.last_flush.elapsed() >= self.flush_interval
    }

    pub fn mark_flushed(&mut self) {
        self.last_flush = Instant::now();
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn keep_files(&self) -> usize {
        self.keep_files
    }
}

/// `segment_<prefix>_<epoch_ms>.wav`, the naming scheme a flushed segment
/// is written under.
pub fn segment_filename(prefix: &str, epoch_ms: u128) -> String {
    format!("segment_{prefix}_{epoch_ms}.wav")
}

/// Write `samples` as a WAV file under `directory`, then delete all but the
/// `keep` most recently named `segment_*.wav` files in that directory.
/// Blocking filesystem I/O — callers invoke this inside `spawn_blocking`,
/// never directly from an async context.
pub fn flush_to_disk(
    directory: &Path,
    filename: &str,
    samples: &[i16],
    keep: usize,
) -> std::io::Result<()> {
    std::fs::create_dir_all(directory)?;
    let bytes = pcm_to_wav(samples, 16_000);
    std::fs::write(directory.join(filename), bytes)?;
    sweep(directory, keep)
}

/// Keep only the `keep` most recent `segment_*.wav` files in `directory`.
/// Filenames embed an epoch-millisecond timestamp, so lexicographic order
/// is chronological order.
fn sweep(directory: &Path, keep: usize) -> std::io::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("segment_") && name.ends_with(".wav"))
        })
        .collect();
    entries.sort();
    if entries.len() > keep {
        for stale in &entries[..entries.len() - keep] {
            std::fs::remove_file(stale)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gateway_core_persistence_test_{}_{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn due_when_sample_threshold_reached() {
        let tracker = PersistenceTracker::new(&AudioPersistenceConfig {
            enabled: true,
            directory: "/tmp".to_string(),
            keep_files: 5,
            buffer_duration_secs: 1,
        });
        assert!(tracker.due(16_000));
        assert!(!tracker.due(100));
    }

    #[test]
    fn due_when_wall_time_elapses() {
        let mut tracker = PersistenceTracker::new(&AudioPersistenceConfig {
            enabled: true,
            directory: "/tmp".to_string(),
            keep_files: 5,
            buffer_duration_secs: 0,
        });
        tracker.mark_flushed();
        assert!(tracker.due(0));
    }

    #[test]
    fn filename_embeds_prefix_and_timestamp() {
        assert_eq!(segment_filename("sess1", 42), "segment_sess1_42.wav");
    }

    #[test]
    fn sweep_keeps_only_newest_files() {
        let dir = test_dir("sweep");
        for ts in [100u128, 200, 300, 400] {
            flush_to_disk(&dir, &segment_filename("s", ts), &[0i16; 4], 2).unwrap();
        }
        let mut remaining: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec!["segment_s_300.wav".to_string(), "segment_s_400.wav".to_string()]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn flush_writes_a_valid_wav_file() {
        let dir = test_dir("flush");
        flush_to_disk(&dir, "segment_s_1.wav", &[0i16, 1, -1, 32767], 5).unwrap();
        let bytes = std::fs::read(dir.join("segment_s_1.wav")).unwrap();
        let header = super::super::wav::parse_wav_header(&bytes).unwrap();
        assert_eq!(header.sample_rate, 16_000);
        assert_eq!(header.data_len, 8);
        std::fs::remove_dir_all(&dir).ok();
    }
}
