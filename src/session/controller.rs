//! The voice session controller.
//!
//! A [`VoiceSession`] is mutated only by the task that drives it. Microphone
//! requests, uploads, playback and the max-recording timer run in spawned
//! tasks and report back through the session's event channel, tagged with the
//! turn (or playback) id that started them. Anything arriving for a turn that
//! is no longer current is dropped, and resources it carries are released.

use super::events::{SessionCommand, SessionEvent};
use super::state::{SessionState, StatusSnapshot, TurnOutcome};
use crate::audio::codec;
use crate::audio::playback::{AudioPlayer, PlaybackHandle};
use crate::audio::recorder::{CaptureBackend, CaptureHandle, CaptureStream, RecordedAudio};
use crate::backend::{ChatBackend, UploadResponse};
use crate::config::AudioConfig;
use crate::defaults;
use crate::error::{HugError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Tunables for a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    /// Stop recording automatically after this long.
    pub max_recording: Option<Duration>,
}

impl SessionOptions {
    pub fn from_config(audio: &AudioConfig) -> Self {
        Self {
            max_recording: (audio.max_recording_secs > 0)
                .then(|| Duration::from_secs(audio.max_recording_secs)),
        }
    }

    pub fn with_max_recording(mut self, limit: Duration) -> Self {
        self.max_recording = Some(limit);
        self
    }
}

struct ActivePlayback {
    handle: PlaybackHandle,
    task: JoinHandle<()>,
}

/// One overlay's worth of conversation with Grandpa.
pub struct VoiceSession {
    capture_backend: Arc<dyn CaptureBackend>,
    backend: Arc<dyn ChatBackend>,
    player: Arc<dyn AudioPlayer>,
    options: SessionOptions,

    state: SessionState,
    status_text: String,
    error_text: Option<String>,
    mime_type: Option<String>,

    capture: Option<CaptureHandle>,
    playback: Option<ActivePlayback>,
    timer: Option<JoinHandle<()>>,

    turn: u64,
    next_playback_id: u64,
    live: bool,
    last_outcome: Option<TurnOutcome>,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl VoiceSession {
    pub fn new(
        capture_backend: Arc<dyn CaptureBackend>,
        backend: Arc<dyn ChatBackend>,
        player: Arc<dyn AudioPlayer>,
        options: SessionOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(StatusSnapshot::default());

        Self {
            capture_backend,
            backend,
            player,
            options,
            state: SessionState::Idle,
            status_text: defaults::STATUS_IDLE.to_string(),
            error_text: None,
            mime_type: None,
            capture: None,
            playback: None,
            timer: None,
            turn: 0,
            next_playback_id: 0,
            live: true,
            last_outcome: None,
            events_tx,
            events_rx,
            status_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Current turn id. Bumped every time the microphone is armed.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn last_outcome(&self) -> Option<&TurnOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    /// File backing the reply that is playing, if any.
    pub fn playback_path(&self) -> Option<&Path> {
        self.playback.as_ref().map(|active| active.handle.path())
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            status_text: self.status_text.clone(),
            error_text: self.error_text.clone(),
            mime_type: self.mime_type.clone(),
            live: self.live,
        }
    }

    /// Receive a fresh snapshot whenever the projection changes.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// The mic button.
    pub fn toggle_mic(&mut self) {
        if !self.live {
            tracing::debug!("toggle ignored: session closed");
            return;
        }

        match self.state {
            state if state.is_busy() => {
                tracing::debug!("toggle ignored while {state}");
            }
            SessionState::Listening => self.on_stop_requested(),
            SessionState::Playing => {
                tracing::info!("interrupting playback to listen again");
                self.stop_playback();
                self.arm();
            }
            _ => self.arm(),
        }
    }

    /// Apply one completion event.
    pub fn handle(&mut self, event: SessionEvent) {
        tracing::trace!("event {}", event.name());
        match event {
            SessionEvent::MicGranted { turn, stream } => self.on_mic_granted(turn, stream),
            SessionEvent::MicDenied { turn, error } => self.on_mic_denied(turn, error),
            SessionEvent::RecordingFinalized { turn, result } => {
                self.on_recording_finalized(turn, result)
            }
            SessionEvent::UploadResult { turn, result } => self.on_upload_result(turn, result),
            SessionEvent::PlaybackEnded {
                playback_id,
                result,
            } => self.on_playback_ended(playback_id, result),
            SessionEvent::RecordingTimeout { turn } => self.on_recording_timeout(turn),
        }
    }

    /// Wait for the next completion event and apply it.
    ///
    /// Returns `false` once the session has been torn down.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Drive the session until `Close` arrives or the command channel closes,
    /// then tear it down.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::ToggleMic) => self.toggle_mic(),
                    Some(SessionCommand::Close) | None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle(event),
            }
        }
        self.teardown();
    }

    /// Release everything the session holds. Safe from any state, any number
    /// of times. Results still in flight are discarded when they land.
    pub fn teardown(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;

        self.cancel_timer();
        self.release_capture();
        self.stop_playback();

        // Later sends fail and release what they carry; drain what is queued.
        self.events_rx.close();
        while let Ok(event) = self.events_rx.try_recv() {
            discard(event);
        }

        tracing::info!("session closed on turn {}", self.turn);
        self.transition(SessionState::Idle, defaults::STATUS_IDLE);
    }

    fn arm(&mut self) {
        self.turn += 1;
        let turn = self.turn;
        self.error_text = None;
        self.mime_type = None;
        self.transition(SessionState::Arming, defaults::STATUS_ARMING);

        let capture_backend = Arc::clone(&self.capture_backend);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match capture_backend.request_microphone().await {
                Ok(stream) => SessionEvent::MicGranted { turn, stream },
                Err(error) => SessionEvent::MicDenied { turn, error },
            };
            if let Err(mpsc::error::SendError(event)) = tx.send(event) {
                discard(event);
            }
        });
    }

    fn on_mic_granted(&mut self, turn: u64, mut stream: Box<dyn CaptureStream>) {
        if !self.is_current(turn) || self.state != SessionState::Arming {
            tracing::debug!("releasing stale microphone grant for turn {turn}");
            stream.stop_tracks();
            return;
        }

        let negotiated =
            codec::negotiate_mime_type(|mime| self.capture_backend.is_type_supported(mime));
        match CaptureHandle::start(stream, negotiated) {
            Ok(capture) => {
                tracing::info!("recording as {}", capture.mime_type());
                self.mime_type = Some(capture.mime_type().to_string());
                self.release_capture();
                self.capture = Some(capture);
                self.transition(SessionState::Listening, defaults::STATUS_LISTENING);
                self.start_timer(turn);
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_mic_denied(&mut self, turn: u64, error: HugError) {
        if !self.is_current(turn) || self.state != SessionState::Arming {
            tracing::debug!("ignoring stale microphone denial for turn {turn}");
            return;
        }
        self.fail(error);
    }

    fn on_stop_requested(&mut self) {
        self.cancel_timer();
        let Some(mut capture) = self.capture.take() else {
            tracing::warn!("stop requested with no active capture");
            self.transition(SessionState::Idle, defaults::STATUS_IDLE);
            return;
        };

        self.transition(SessionState::Finalizing, defaults::STATUS_FINALIZING);
        let result = capture.finalize();
        drop(capture);

        let event = SessionEvent::RecordingFinalized {
            turn: self.turn,
            result,
        };
        if self.events_tx.send(event).is_err() {
            tracing::debug!("event channel closed before recording was finalized");
        }
    }

    fn on_recording_timeout(&mut self, turn: u64) {
        if self.is_current(turn) && self.state == SessionState::Listening {
            tracing::info!("max recording length reached, stopping");
            self.on_stop_requested();
        }
    }

    fn on_recording_finalized(&mut self, turn: u64, result: Result<RecordedAudio>) {
        if !self.is_current(turn) || self.state != SessionState::Finalizing {
            return;
        }

        let audio = match result {
            Ok(audio) if audio.is_empty() => {
                self.fail(HugError::EmptyCapture);
                return;
            }
            Ok(audio) => audio,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        tracing::info!("sending {} ({} bytes)", audio.file_name(), audio.len());
        self.transition(SessionState::Uploading, defaults::STATUS_UPLOADING);

        let backend = Arc::clone(&self.backend);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = backend.send_audio(audio).await;
            if tx.send(SessionEvent::UploadResult { turn, result }).is_err() {
                tracing::debug!("discarding upload result for closed session (turn {turn})");
            }
        });
    }

    fn on_upload_result(&mut self, turn: u64, result: Result<UploadResponse>) {
        if !self.is_current(turn) || self.state != SessionState::Uploading {
            tracing::debug!("discarding stale upload result for turn {turn}");
            return;
        }

        match result {
            Ok(UploadResponse::Audio {
                content_type,
                bytes,
            }) => self.start_playback(&content_type, &bytes),
            Ok(UploadResponse::Text(text)) => {
                let shown = if text.is_empty() {
                    defaults::STATUS_IDLE.to_string()
                } else {
                    text.clone()
                };
                self.transition(SessionState::Reporting, &shown);
                self.last_outcome = Some(TurnOutcome::Reported(text));
                self.transition(SessionState::Idle, &shown);
            }
            Err(e) => self.fail(e),
        }
    }

    fn start_playback(&mut self, content_type: &str, bytes: &[u8]) {
        self.stop_playback();

        self.next_playback_id += 1;
        let playback_id = self.next_playback_id;
        let handle = match PlaybackHandle::create(playback_id, bytes, content_type) {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        let player = Arc::clone(&self.player);
        let path = handle.path().to_path_buf();
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let result = player.play(&path).await;
            tx.send(SessionEvent::PlaybackEnded {
                playback_id,
                result,
            })
            .ok();
        });

        tracing::info!("playing reply {playback_id} ({content_type}, {} bytes)", bytes.len());
        self.playback = Some(ActivePlayback { handle, task });
        self.transition(SessionState::Playing, defaults::STATUS_PLAYING);
    }

    fn on_playback_ended(&mut self, playback_id: u64, result: Result<()>) {
        let current = self.playback.as_ref().map(|active| active.handle.id());
        if !self.live || current != Some(playback_id) {
            tracing::debug!("ignoring end of superseded playback {playback_id}");
            return;
        }

        if let Some(mut active) = self.playback.take() {
            active.handle.release();
        }

        match result {
            Ok(()) => {
                self.last_outcome = Some(TurnOutcome::Played);
                self.transition(SessionState::Idle, defaults::STATUS_IDLE);
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: HugError) {
        tracing::warn!("turn {} failed: {error}", self.turn);
        self.cancel_timer();
        self.release_capture();

        let message = error.user_message();
        self.error_text = Some(message.clone());
        self.last_outcome = Some(TurnOutcome::Failed(message));
        self.transition(SessionState::Error, defaults::STATUS_IDLE);
        self.transition(SessionState::Idle, defaults::STATUS_IDLE);
    }

    fn start_timer(&mut self, turn: u64) {
        let Some(limit) = self.options.max_recording else {
            return;
        };
        let tx = self.events_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            tx.send(SessionEvent::RecordingTimeout { turn }).ok();
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn release_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
    }

    fn stop_playback(&mut self) {
        if let Some(mut active) = self.playback.take() {
            // Dropping the player future stops the output.
            active.task.abort();
            active.handle.release();
            tracing::debug!("stopped playback {}", active.handle.id());
        }
    }

    fn is_current(&self, turn: u64) -> bool {
        self.live && turn == self.turn
    }

    fn transition(&mut self, state: SessionState, status_text: &str) {
        if self.state != state {
            tracing::debug!("{} -> {}", self.state, state);
        }
        self.state = state;
        self.status_text = status_text.to_string();
        self.status_tx.send_replace(self.status());
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Release whatever a dropped event carries.
fn discard(event: SessionEvent) {
    if let SessionEvent::MicGranted { mut stream, turn } = event {
        tracing::debug!("releasing undelivered microphone grant for turn {turn}");
        stream.stop_tracks();
    }
}
