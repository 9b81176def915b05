//! Recording codec negotiation and content-type helpers.

use crate::defaults::{FALLBACK_MIME_TYPE, PREFERRED_MIME_TYPES};

/// Pick the first preferred mime type the recorder supports.
///
/// Returns `None` when nothing in the preference list is supported; the
/// recorder then falls back to its platform default format.
pub fn negotiate_mime_type<F>(is_supported: F) -> Option<&'static str>
where
    F: Fn(&str) -> bool,
{
    PREFERRED_MIME_TYPES
        .iter()
        .copied()
        .find(|mime| is_supported(mime))
}

/// File extension for an upload recorded with `mime_type`.
pub fn extension_for(mime_type: &str) -> &'static str {
    let lower = mime_type.to_ascii_lowercase();
    if lower.contains("ogg") {
        "ogg"
    } else if lower.contains("wav") {
        "wav"
    } else {
        "webm"
    }
}

/// Mime type to send with an upload; empty recorder types become webm.
pub fn upload_mime_type(mime_type: &str) -> &str {
    if mime_type.trim().is_empty() {
        FALLBACK_MIME_TYPE
    } else {
        mime_type
    }
}

/// Whether a response `Content-Type` header denotes playable audio.
pub fn is_audio_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("audio/")
}

/// Temp-file suffix for a reply so external players can sniff the format.
pub fn playback_suffix(content_type: &str) -> &'static str {
    let lower = content_type.to_ascii_lowercase();
    if lower.contains("mpeg") || lower.contains("mp3") {
        ".mp3"
    } else if lower.contains("wav") {
        ".wav"
    } else if lower.contains("ogg") {
        ".ogg"
    } else if lower.contains("webm") {
        ".webm"
    } else if lower.contains("aac") || lower.contains("mp4") {
        ".m4a"
    } else {
        ".audio"
    }
}
