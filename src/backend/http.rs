//! HTTP client for the companion backend.

use super::{ChatBackend, UploadResponse};
use crate::audio::codec;
use crate::audio::recorder::RecordedAudio;
use crate::config::BackendConfig;
use crate::defaults;
use crate::error::{HugError, Result};
use crate::history::{self, HistoryRecord};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Talks to the backend over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatBackend {
    /// Build a client for the configured backend.
    ///
    /// A `timeout_secs` of 0 disables the request timeout.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| HugError::Other(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            // The body usually carries the backend's own explanation.
            let body = response.text().await.unwrap_or_default();
            return Err(HugError::NetworkFailure {
                status: Some(status.as_u16()),
                message: body.trim().to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let response = self.send(self.client.get(self.endpoint(path))).await?;
        read_json(response).await
    }
}

fn transport_error(e: reqwest::Error) -> HugError {
    let message = if e.is_timeout() {
        format!("Request timed out: {e}")
    } else if e.is_connect() {
        format!("Could not reach Grandpa: {e}")
    } else {
        e.to_string()
    };
    HugError::NetworkFailure {
        status: None,
        message,
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|e| HugError::MalformedResponse {
        message: format!("Expected JSON from backend: {e}"),
    })
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send_audio(&self, audio: RecordedAudio) -> Result<UploadResponse> {
        let file_name = audio.file_name();
        let mime_type = audio.upload_mime_type().to_string();
        tracing::info!(
            "uploading {} bytes as {file_name} ({mime_type})",
            audio.len()
        );

        let part = Part::bytes(audio.bytes)
            .file_name(file_name)
            .mime_str(&mime_type)
            .map_err(|e| HugError::Other(format!("Invalid upload mime type {mime_type}: {e}")))?;
        let form = Form::new().part(defaults::UPLOAD_FIELD, part);

        let response = self
            .send(self.client.post(self.endpoint("chat-audio")).multipart(form))
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if codec::is_audio_content_type(&content_type) {
            let bytes = response.bytes().await.map_err(transport_error)?;
            tracing::debug!("received {} bytes of {content_type}", bytes.len());
            Ok(UploadResponse::Audio {
                content_type,
                bytes: bytes.to_vec(),
            })
        } else {
            let text = response.text().await.map_err(transport_error)?;
            tracing::debug!("received text reply ({content_type})");
            Ok(UploadResponse::Text(text))
        }
    }

    async fn conversation_history(&self) -> Result<Vec<HistoryRecord>> {
        let value = self.get_json("conversation-history").await?;
        history::parse_history(value)
    }

    async fn reset_conversation(&self) -> Result<String> {
        let response = self
            .send(self.client.post(self.endpoint("reset-conversation")))
            .await?;
        let value = read_json(response).await?;
        Ok(value
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()))
    }

    async fn health(&self) -> Result<serde_json::Value> {
        self.get_json("health").await
    }
}
