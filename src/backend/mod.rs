//! The companion backend: audio chat, history, reset and health.

pub mod http;

use crate::audio::recorder::RecordedAudio;
use crate::error::{HugError, Result};
use crate::history::HistoryRecord;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub use http::HttpChatBackend;

/// Successful reply to an audio upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadResponse {
    /// Synthesized speech to play back.
    Audio { content_type: String, bytes: Vec<u8> },
    /// Plain text to show instead, e.g. when speech synthesis failed.
    Text(String),
}

/// Trait for the remote conversation service.
///
/// This trait allows swapping implementations (HTTP backend vs mock).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Upload one recording and wait for Grandpa's answer.
    async fn send_audio(&self, audio: RecordedAudio) -> Result<UploadResponse>;

    /// Fetch the flat conversation record list.
    async fn conversation_history(&self) -> Result<Vec<HistoryRecord>>;

    /// Clear the conversation on the backend; returns its status message.
    async fn reset_conversation(&self) -> Result<String>;

    /// Backend health report as returned by the service.
    async fn health(&self) -> Result<serde_json::Value>;
}

#[derive(Debug, Default)]
struct MockBackendState {
    responses: Mutex<VecDeque<Result<UploadResponse>>>,
    uploads: Mutex<Vec<RecordedAudio>>,
    history: Mutex<Vec<HistoryRecord>>,
    hold_uploads: std::sync::atomic::AtomicBool,
    release: Notify,
}

/// Mock backend for testing
///
/// Answers uploads from a scripted queue (plain text "mock reply" once the
/// queue is empty) and remembers every recording it receives.
#[derive(Debug, Clone, Default)]
pub struct MockChatBackend {
    state: Arc<MockBackendState>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next upload
    pub fn with_response(self, response: Result<UploadResponse>) -> Self {
        if let Ok(mut responses) = self.state.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    /// Queue an audio reply
    pub fn with_audio_reply(self, content_type: &str, bytes: &[u8]) -> Self {
        self.with_response(Ok(UploadResponse::Audio {
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }))
    }

    /// Queue a text reply
    pub fn with_text_reply(self, text: &str) -> Self {
        self.with_response(Ok(UploadResponse::Text(text.to_string())))
    }

    /// Queue a failed upload
    pub fn with_failure(self, status: Option<u16>, message: &str) -> Self {
        self.with_response(Err(HugError::NetworkFailure {
            status,
            message: message.to_string(),
        }))
    }

    /// Records returned by `conversation_history`
    pub fn with_history(self, records: Vec<HistoryRecord>) -> Self {
        if let Ok(mut history) = self.state.history.lock() {
            *history = records;
        }
        self
    }

    /// Make uploads wait for `release_upload`
    pub fn with_held_uploads(self) -> Self {
        self.state
            .hold_uploads
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Let one held upload answer.
    pub fn release_upload(&self) {
        self.state.release.notify_one();
    }

    /// Every recording received, in order.
    pub fn uploads(&self) -> Vec<RecordedAudio> {
        self.state
            .uploads
            .lock()
            .map(|uploads| uploads.clone())
            .unwrap_or_default()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads().len()
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn send_audio(&self, audio: RecordedAudio) -> Result<UploadResponse> {
        if let Ok(mut uploads) = self.state.uploads.lock() {
            uploads.push(audio);
        }

        if self
            .state
            .hold_uploads
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            self.state.release.notified().await;
        }

        let next = self
            .state
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        next.unwrap_or_else(|| Ok(UploadResponse::Text("mock reply".to_string())))
    }

    async fn conversation_history(&self) -> Result<Vec<HistoryRecord>> {
        Ok(self
            .state
            .history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default())
    }

    async fn reset_conversation(&self) -> Result<String> {
        if let Ok(mut history) = self.state.history.lock() {
            history.clear();
        }
        Ok("Conversation reset successfully".to_string())
    }

    async fn health(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "status": "healthy" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_answers_in_queue_order_then_defaults() {
        let backend = MockChatBackend::new()
            .with_audio_reply("audio/mpeg", b"mp3")
            .with_failure(Some(500), "boom");

        let audio = RecordedAudio::new(b"voice".to_vec(), "audio/webm");
        assert_eq!(
            backend.send_audio(audio.clone()).await.unwrap(),
            UploadResponse::Audio {
                content_type: "audio/mpeg".to_string(),
                bytes: b"mp3".to_vec(),
            }
        );
        assert!(backend.send_audio(audio.clone()).await.is_err());
        assert_eq!(
            backend.send_audio(audio).await.unwrap(),
            UploadResponse::Text("mock reply".to_string())
        );
        assert_eq!(backend.upload_count(), 3);
    }

    #[tokio::test]
    async fn mock_reset_clears_history() {
        let backend =
            MockChatBackend::new().with_history(vec![HistoryRecord::new("child", "hi")]);
        assert_eq!(backend.conversation_history().await.unwrap().len(), 1);

        backend.reset_conversation().await.unwrap();
        assert!(backend.conversation_history().await.unwrap().is_empty());
    }
}
