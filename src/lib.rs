//! grandpa-hug - talk to Grandpa from your terminal
//!
//! A push-to-talk voice client: record the child's question, send it to the
//! companion backend, and play Grandpa's spoken answer.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod history;
#[cfg(feature = "cli")]
pub mod logging;
pub mod session;

// Composition root
#[cfg(feature = "cli")]
pub mod app;

// Seams (microphone → backend → speaker)
pub use audio::playback::{AudioPlayer, CommandPlayer, PlaybackHandle};
pub use audio::recorder::{CaptureBackend, CaptureHandle, CaptureStream, RecordedAudio};
pub use backend::{ChatBackend, HttpChatBackend, UploadResponse};

// Session
pub use session::{
    SessionCommand, SessionEvent, SessionOptions, SessionState, StatusSnapshot, TurnOutcome,
    VoiceSession,
};

// History
pub use history::{HistoryRecord, Turn, pair_conversation};

// Error handling
pub use error::{HugError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
