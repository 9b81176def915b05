//! Session states and the status projection shown to the user.

use crate::defaults;
use serde::Serialize;
use std::fmt;

/// Where a voice session is in its talk/answer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Waiting for the microphone to be granted.
    Arming,
    Listening,
    /// Recorder stopped, waiting for the final buffer.
    Finalizing,
    Uploading,
    Playing,
    /// A text reply is being shown. Passes straight back to `Idle`.
    Reporting,
    /// A turn failed. Passes straight back to `Idle`.
    Error,
}

impl SessionState {
    /// States in which a toggle is ignored.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SessionState::Arming | SessionState::Finalizing | SessionState::Uploading
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Arming => "arming",
            SessionState::Listening => "listening",
            SessionState::Finalizing => "finalizing",
            SessionState::Uploading => "uploading",
            SessionState::Playing => "playing",
            SessionState::Reporting => "reporting",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the overlay needs to render one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub status_text: String,
    pub error_text: Option<String>,
    /// Codec negotiated for the current or last recording.
    pub mime_type: Option<String>,
    pub live: bool,
}

impl StatusSnapshot {
    /// The line under the status: the last error, or the idle hint.
    pub fn secondary_text(&self) -> &str {
        self.error_text.as_deref().unwrap_or(defaults::HINT_IDLE)
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            status_text: defaults::STATUS_IDLE.to_string(),
            error_text: None,
            mime_type: None,
            live: true,
        }
    }
}

/// How the most recent turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Grandpa's audio reply played to the end.
    Played,
    /// The backend answered with text instead of audio.
    Reported(String),
    /// The turn failed; carries the message shown to the user.
    Failed(String),
}
