use crate::audio::codec;
use crate::defaults;
use crate::error::{HugError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for microphone providers.
///
/// This trait allows swapping implementations (real audio device vs mock).
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Request access to the microphone.
    ///
    /// Suspends until access is granted or refused. A granted stream holds
    /// live device tracks until [`CaptureStream::stop_tracks`] is called.
    async fn request_microphone(&self) -> Result<Box<dyn CaptureStream>>;

    /// Whether the recorder can produce the given mime type.
    fn is_type_supported(&self, mime_type: &str) -> bool;
}

/// An open microphone stream together with its recorder.
pub trait CaptureStream: Send {
    /// Start recording.
    ///
    /// # Arguments
    /// * `mime_type` - Negotiated format, or `None` for the platform default
    fn start_recording(&mut self, mime_type: Option<&str>) -> Result<()>;

    /// Mime type the recorder actually produces.
    fn mime_type(&self) -> String;

    /// Flush the recorder and return the chunks produced since start.
    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Stop every device track of the stream.
    fn stop_tracks(&mut self);
}

/// One finalized recording, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl RecordedAudio {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Mime type to declare on upload.
    pub fn upload_mime_type(&self) -> &str {
        codec::upload_mime_type(&self.mime_type)
    }

    /// `voice.ogg`, `voice.wav` or `voice.webm`, following the recording's codec.
    pub fn file_name(&self) -> String {
        format!(
            "{}.{}",
            defaults::UPLOAD_FILE_STEM,
            codec::extension_for(self.upload_mime_type())
        )
    }
}

/// Owns an active capture: the stream, its recorder, and the device tracks.
///
/// Tracks are stopped exactly once, either by [`CaptureHandle::finalize`],
/// by [`CaptureHandle::release`], or when the handle is dropped.
pub struct CaptureHandle {
    stream: Box<dyn CaptureStream>,
    mime_type: String,
    recording: bool,
    released: bool,
}

impl CaptureHandle {
    /// Start recording on a freshly granted stream.
    ///
    /// On failure the stream's tracks are stopped before the error is returned.
    pub fn start(mut stream: Box<dyn CaptureStream>, mime_type: Option<&str>) -> Result<Self> {
        if let Err(e) = stream.start_recording(mime_type) {
            stream.stop_tracks();
            return Err(e);
        }
        let mime_type = stream.mime_type();
        Ok(Self {
            stream,
            mime_type,
            recording: true,
            released: false,
        })
    }

    /// Mime type the recorder reported when it started.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Flush the recorder, stop the tracks, and join the chunks into one buffer.
    pub fn finalize(&mut self) -> Result<RecordedAudio> {
        let chunks = if self.recording {
            self.recording = false;
            self.stream.stop_recording()
        } else {
            Ok(Vec::new())
        };
        self.release_tracks();

        let bytes: Vec<u8> = chunks?
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .flatten()
            .collect();
        Ok(RecordedAudio::new(bytes, self.mime_type.clone()))
    }

    /// Abandon the capture. Safe to call in any state, any number of times.
    pub fn release(&mut self) {
        if self.recording {
            self.recording = false;
            if let Err(e) = self.stream.stop_recording() {
                tracing::debug!("recorder stop during release failed: {e}");
            }
        }
        self.release_tracks();
    }

    fn release_tracks(&mut self) {
        if !self.released {
            self.released = true;
            self.stream.stop_tracks();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Default)]
struct MockDeviceState {
    open_tracks: AtomicUsize,
    peak_open_tracks: AtomicUsize,
    streams_opened: AtomicUsize,
    recordings_started: AtomicUsize,
    track_stops: AtomicUsize,
}

/// Mock microphone for testing
///
/// Clones share device counters, so a test can keep one clone and hand the
/// other to a session.
#[derive(Debug, Clone)]
pub struct MockCaptureBackend {
    supported: Vec<String>,
    default_mime_type: String,
    chunks: Vec<Vec<u8>>,
    deny_reason: Option<String>,
    should_fail_start: bool,
    state: Arc<MockDeviceState>,
}

impl MockCaptureBackend {
    /// Create a mock that supports every preferred codec and records one chunk.
    pub fn new() -> Self {
        Self {
            supported: defaults::PREFERRED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_mime_type: defaults::FALLBACK_MIME_TYPE.to_string(),
            chunks: vec![b"mock-voice".to_vec()],
            deny_reason: None,
            should_fail_start: false,
            state: Arc::new(MockDeviceState::default()),
        }
    }

    /// Restrict the codecs the mock recorder claims to support
    pub fn with_supported_types(mut self, types: &[&str]) -> Self {
        self.supported = types.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Format produced when no codec was negotiated
    pub fn with_default_mime_type(mut self, mime_type: &str) -> Self {
        self.default_mime_type = mime_type.to_string();
        self
    }

    /// Chunks the recorder hands back when stopped
    pub fn with_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Refuse microphone access with the given reason
    pub fn with_denial(mut self, reason: &str) -> Self {
        self.deny_reason = Some(reason.to_string());
        self
    }

    /// Fail when the recorder is started
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Tracks currently open across all streams
    pub fn open_tracks(&self) -> usize {
        self.state.open_tracks.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open tracks ever observed
    pub fn peak_open_tracks(&self) -> usize {
        self.state.peak_open_tracks.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.state.streams_opened.load(Ordering::SeqCst)
    }

    pub fn recordings_started(&self) -> usize {
        self.state.recordings_started.load(Ordering::SeqCst)
    }

    /// Number of times any stream's tracks were actually stopped
    pub fn track_stops(&self) -> usize {
        self.state.track_stops.load(Ordering::SeqCst)
    }
}

impl Default for MockCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for MockCaptureBackend {
    async fn request_microphone(&self) -> Result<Box<dyn CaptureStream>> {
        if let Some(reason) = &self.deny_reason {
            return Err(HugError::PermissionDenied {
                message: reason.clone(),
            });
        }

        self.state.streams_opened.fetch_add(1, Ordering::SeqCst);
        let open = self.state.open_tracks.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_open_tracks.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(MockCaptureStream {
            chunks: self.chunks.clone(),
            default_mime_type: self.default_mime_type.clone(),
            mime_type: None,
            recording: false,
            tracks_live: true,
            should_fail_start: self.should_fail_start,
            state: Arc::clone(&self.state),
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|s| s == mime_type)
    }
}

/// Stream handed out by [`MockCaptureBackend`].
///
/// Dropping it does not release its track; only `stop_tracks` does, so tests
/// catch code paths that forget to release.
#[derive(Debug)]
pub struct MockCaptureStream {
    chunks: Vec<Vec<u8>>,
    default_mime_type: String,
    mime_type: Option<String>,
    recording: bool,
    tracks_live: bool,
    should_fail_start: bool,
    state: Arc<MockDeviceState>,
}

impl CaptureStream for MockCaptureStream {
    fn start_recording(&mut self, mime_type: Option<&str>) -> Result<()> {
        if self.should_fail_start {
            return Err(HugError::AudioCapture {
                message: "mock recorder failed to start".to_string(),
            });
        }
        self.mime_type = mime_type.map(str::to_string);
        self.recording = true;
        self.state.recordings_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn mime_type(&self) -> String {
        self.mime_type
            .clone()
            .unwrap_or_else(|| self.default_mime_type.clone())
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>> {
        if !self.recording {
            return Ok(Vec::new());
        }
        self.recording = false;
        Ok(self.chunks.clone())
    }

    fn stop_tracks(&mut self) {
        if self.tracks_live {
            self.tracks_live = false;
            self.state.open_tracks.fetch_sub(1, Ordering::SeqCst);
            self.state.track_stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}
