//! Messages flowing into a session's event loop.

use crate::audio::recorder::{CaptureStream, RecordedAudio};
use crate::backend::UploadResponse;
use crate::error::{HugError, Result};

/// Completion of background work, tagged with the turn (or playback) that
/// started it so stale results can be dropped.
pub enum SessionEvent {
    MicGranted {
        turn: u64,
        stream: Box<dyn CaptureStream>,
    },
    MicDenied {
        turn: u64,
        error: HugError,
    },
    RecordingFinalized {
        turn: u64,
        result: Result<RecordedAudio>,
    },
    UploadResult {
        turn: u64,
        result: Result<UploadResponse>,
    },
    PlaybackEnded {
        playback_id: u64,
        result: Result<()>,
    },
    /// The max-recording timer for `turn` fired.
    RecordingTimeout {
        turn: u64,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::MicGranted { .. } => "mic_granted",
            SessionEvent::MicDenied { .. } => "mic_denied",
            SessionEvent::RecordingFinalized { .. } => "recording_finalized",
            SessionEvent::UploadResult { .. } => "upload_result",
            SessionEvent::PlaybackEnded { .. } => "playback_ended",
            SessionEvent::RecordingTimeout { .. } => "recording_timeout",
        }
    }
}

/// Requests from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// The mic button was pressed.
    ToggleMic,
    /// The overlay is closing.
    Close,
}
