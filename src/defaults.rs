//! Default configuration constants for grandpa-hug.
//!
//! Shared constants used by the configuration layer, the capture backends and
//! the voice session, kept in one place so the overlay text stays consistent.

/// Backend used when neither config nor environment name one.
pub const BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Request timeout for backend calls, in seconds.
///
/// Generous because the backend runs speech-to-text, an LLM and
/// text-to-speech before it answers.
pub const BACKEND_TIMEOUT_SECS: u64 = 60;

/// Default capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Default cap on a single recording. Zero disables the timer.
pub const MAX_RECORDING_SECS: u64 = 60;

/// Recording codecs in order of preference.
///
/// The first entry the capture backend supports wins; when none match the
/// backend's own default format is used.
pub const PREFERRED_MIME_TYPES: &[&str] = &[
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/ogg;codecs=opus",
    "audio/ogg",
    "audio/wav",
];

/// Mime type assumed when the recorder reports none.
pub const FALLBACK_MIME_TYPE: &str = "audio/webm";

/// Multipart field name and file stem for uploaded recordings.
pub const UPLOAD_FIELD: &str = "file";
pub const UPLOAD_FILE_STEM: &str = "voice";

/// External player used for Grandpa's replies.
pub const PLAYER_COMMAND: &str = "ffplay";
pub const PLAYER_ARGS: &[&str] = &["-nodisp", "-autoexit", "-loglevel", "quiet"];

// Overlay text
pub const STATUS_IDLE: &str = "Tap the mic to start talking";
pub const STATUS_ARMING: &str = "Requesting microphone access...";
pub const STATUS_LISTENING: &str = "I'm listening...";
pub const STATUS_FINALIZING: &str = "Okay... one moment";
pub const STATUS_UPLOADING: &str = "Sending to Grandpa...";
pub const STATUS_PLAYING: &str = "Grandpa is talking...";
pub const HINT_IDLE: &str = "Go ahead, ask me anything!";
