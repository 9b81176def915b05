//! Microphone capture, recording codecs and reply playback.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod codec;
pub mod playback;
pub mod recorder;
pub mod wav;
