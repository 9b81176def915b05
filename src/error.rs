//! Error types for grandpa-hug.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HugError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Microphone errors
    #[error("Microphone access denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Recording contained no audio")]
    EmptyCapture,

    // Backend errors
    #[error("Network request failed: {message}")]
    NetworkFailure {
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed backend response: {message}")]
    MalformedResponse { message: String },

    // Playback errors
    #[error("Playback failed: {message}")]
    Playback { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl HugError {
    /// Short message suitable for the overlay's error line.
    ///
    /// Domain errors surface the backend's or device's own wording when there
    /// is one, so the child sees "Grandpa is sleeping" rather than a
    /// transport-level prefix.
    pub fn user_message(&self) -> String {
        match self {
            HugError::PermissionDenied { message } if message.trim().is_empty() => {
                "Microphone permission was denied".to_string()
            }
            HugError::PermissionDenied { message } => message.clone(),
            HugError::EmptyCapture => "I didn't catch any audio. Try again?".to_string(),
            HugError::NetworkFailure { status, message } => {
                if !message.trim().is_empty() {
                    message.clone()
                } else if let Some(code) = status {
                    format!("HTTP {code}")
                } else {
                    "Request failed".to_string()
                }
            }
            HugError::MalformedResponse { message } => message.clone(),
            HugError::AudioDeviceNotFound { .. } | HugError::AudioCapture { .. } => {
                self.to_string()
            }
            HugError::Playback { message } => message.clone(),
            _ => "Something went wrong".to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, HugError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = HugError::ConfigInvalidValue {
            key: "backend.url".to_string(),
            message: "must start with http:// or https://".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for backend.url: must start with http:// or https://"
        );
    }

    #[test]
    fn test_permission_denied_user_message_uses_reason() {
        let error = HugError::PermissionDenied {
            message: "NotAllowedError".to_string(),
        };
        assert_eq!(error.user_message(), "NotAllowedError");
        assert_eq!(error.to_string(), "Microphone access denied: NotAllowedError");
    }

    #[test]
    fn test_permission_denied_user_message_falls_back() {
        let error = HugError::PermissionDenied {
            message: "  ".to_string(),
        };
        assert_eq!(error.user_message(), "Microphone permission was denied");
    }

    #[test]
    fn test_empty_capture_user_message() {
        assert_eq!(
            HugError::EmptyCapture.user_message(),
            "I didn't catch any audio. Try again?"
        );
    }

    #[test]
    fn test_network_failure_prefers_body_text() {
        let error = HugError::NetworkFailure {
            status: Some(500),
            message: "Grandpa is sleeping".to_string(),
        };
        assert_eq!(error.user_message(), "Grandpa is sleeping");
    }

    #[test]
    fn test_network_failure_synthesizes_status_message() {
        let error = HugError::NetworkFailure {
            status: Some(502),
            message: String::new(),
        };
        assert_eq!(error.user_message(), "HTTP 502");

        let error = HugError::NetworkFailure {
            status: None,
            message: String::new(),
        };
        assert_eq!(error.user_message(), "Request failed");
    }

    #[test]
    fn test_malformed_response_display() {
        let error = HugError::MalformedResponse {
            message: "expected array".to_string(),
        };
        assert_eq!(error.to_string(), "Malformed backend response: expected array");
        assert_eq!(error.user_message(), "expected array");
    }

    #[test]
    fn test_other_display() {
        let error = HugError::Other("unexpected error".to_string());
        assert_eq!(error.to_string(), "unexpected error");
        assert_eq!(error.user_message(), "Something went wrong");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: HugError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: HugError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<HugError>();
        assert_sync::<HugError>();
    }
}
