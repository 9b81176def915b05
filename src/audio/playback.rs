//! Reply playback: the playable resource and the players that consume it.
//!
//! A reply is written to a temporary file whose path plays the part of a
//! resource URL. The file belongs to exactly one [`PlaybackHandle`] and is
//! deleted exactly once, when the handle is released or dropped.

use crate::audio::codec;
use crate::error::{HugError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempPath;
use tokio::sync::Notify;

/// One playable reply backed by a temporary file.
#[derive(Debug)]
pub struct PlaybackHandle {
    id: u64,
    content_type: String,
    path: PathBuf,
    file: Option<TempPath>,
}

impl PlaybackHandle {
    /// Write `bytes` to a fresh temporary file named after the content type.
    pub fn create(id: u64, bytes: &[u8], content_type: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("grandpa-reply-")
            .suffix(codec::playback_suffix(content_type))
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        tracing::debug!("playback resource {id} created at {}", path.display());

        Ok(Self {
            id,
            content_type: content_type.to_string(),
            path,
            file: Some(temp_path),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Location of the playable resource. Dangling once released.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.file.is_none()
    }

    /// Delete the backing file. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(temp_path) = self.file.take() {
            if let Err(e) = temp_path.close() {
                tracing::warn!("failed to remove playback resource {}: {e}", self.id);
            } else {
                tracing::debug!("playback resource {} released", self.id);
            }
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Trait for audio output.
///
/// `play` resolves when playback has finished. Dropping the future stops
/// playback, which is how the session pauses a reply.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, path: &Path) -> Result<()>;
}

/// Plays replies through an external command such as `ffplay` or `mpv`.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    command: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, path: &Path) -> Result<()> {
        let status = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    HugError::Playback {
                        message: format!(
                            "Audio player '{}' not found. Install ffmpeg (for ffplay) \
                             or set playback.command in the config",
                            self.command
                        ),
                    }
                } else {
                    HugError::Playback {
                        message: format!("Failed to run {}: {}", self.command, e),
                    }
                }
            })?;

        if !status.success() {
            return Err(HugError::Playback {
                message: format!("{} exited with {}", self.command, status),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MockPlayerState {
    played: Mutex<Vec<Vec<u8>>>,
    active: AtomicUsize,
    should_fail: AtomicBool,
    hold: AtomicBool,
    finish: Notify,
}

/// Mock player for testing
///
/// Records the bytes of every file it is asked to play. With
/// [`MockPlayer::with_hold`] each playback waits for
/// [`MockPlayer::finish_current`].
#[derive(Debug, Clone, Default)]
pub struct MockPlayer {
    state: Arc<MockPlayerState>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure playback to fail
    pub fn with_failure(self) -> Self {
        self.state.should_fail.store(true, Ordering::SeqCst);
        self
    }

    /// Keep playing until `finish_current` is called
    pub fn with_hold(self) -> Self {
        self.state.hold.store(true, Ordering::SeqCst);
        self
    }

    /// Let one held playback complete.
    pub fn finish_current(&self) {
        self.state.finish.notify_one();
    }

    /// Contents of every file played so far, in order.
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.state
            .played
            .lock()
            .map(|played| played.clone())
            .unwrap_or_default()
    }

    /// Playbacks currently in progress.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for MockPlayer {
    async fn play(&self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).map_err(|e| HugError::Playback {
            message: format!("mock player could not open {}: {}", path.display(), e),
        })?;
        if let Ok(mut played) = self.state.played.lock() {
            played.push(bytes);
        }

        if self.state.should_fail.load(Ordering::SeqCst) {
            return Err(HugError::Playback {
                message: "mock playback failed".to_string(),
            });
        }

        self.state.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.state.active);
        if self.state.hold.load(Ordering::SeqCst) {
            self.state.finish.notified().await;
        }
        Ok(())
    }
}
