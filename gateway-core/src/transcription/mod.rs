//! External transcription service client.

pub mod dispatcher;

pub use dispatcher::{DispatcherConfig, TranscriptionClient};
