//! Real microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! CPAL delivers raw PCM, so the recorder here produces a single WAV chunk
//! when stopped. `audio/wav` is therefore both the only negotiable codec and
//! the platform default.

use crate::audio::recorder::{CaptureBackend, CaptureStream};
use crate::audio::wav::{downmix_to_mono, encode_wav, resample};
use crate::defaults;
use crate::error::{HugError, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Mime type of recordings produced by [`CpalCaptureStream`].
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probing makes ALSA/JACK print harmless but confusing warnings.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA messages during backend probing.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never useful as a microphone.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List available microphones, marking PipeWire/PulseAudio as recommended.
///
/// # Errors
/// Returns `HugError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| HugError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Open the named device, or the best default (PipeWire, PulseAudio, system default).
///
/// Runs under [`with_suppressed_stderr`], which redirects fd 2 for the whole
/// process. Log lines other threads write to stderr while the device opens
/// are lost.
fn open_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| HugError::AudioCapture {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    return Ok(dev);
                }
            }
            return Err(HugError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| HugError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Microphone provider backed by the system audio host.
#[derive(Debug, Clone)]
pub struct CpalCaptureBackend {
    device_name: Option<String>,
    sample_rate: u32,
}

impl CpalCaptureBackend {
    pub fn new(device_name: Option<String>, sample_rate: u32) -> Self {
        Self {
            device_name,
            sample_rate,
        }
    }
}

impl Default for CpalCaptureBackend {
    fn default() -> Self {
        Self::new(None, defaults::SAMPLE_RATE)
    }
}

#[async_trait]
impl CaptureBackend for CpalCaptureBackend {
    async fn request_microphone(&self) -> Result<Box<dyn CaptureStream>> {
        let device_name = self.device_name.clone();
        let sample_rate = self.sample_rate;

        let device = tokio::task::spawn_blocking(move || open_device(device_name.as_deref()))
            .await
            .map_err(|e| HugError::AudioCapture {
                message: format!("Microphone open task failed: {}", e),
            })?
            .map_err(|e| match e {
                HugError::AudioDeviceNotFound { device } => HugError::PermissionDenied {
                    message: format!("No microphone available ({device})"),
                },
                other => other,
            })?;

        if let Ok(name) = device.name() {
            tracing::info!("microphone opened: {name}");
        }

        Ok(Box::new(CpalCaptureStream {
            device: Some(device),
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate,
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case(WAV_MIME_TYPE)
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by a single `CpalCaptureStream`, which is only
/// ever driven from the session's event loop; it never crosses threads while
/// in use.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// An opened microphone. Recording builds a CPAL input stream; stopping the
/// tracks drops both the stream and the device handle.
pub struct CpalCaptureStream {
    device: Option<cpal::Device>,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalCaptureStream {
    fn device(&self) -> Result<&cpal::Device> {
        self.device.as_ref().ok_or_else(|| HugError::AudioCapture {
            message: "Microphone tracks already stopped".to_string(),
        })
    }

    /// Build the input stream.
    ///
    /// Tries i16 at the target rate and mono first, then f32 with the same
    /// shape, then the device's native config with software conversion.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let device = self.device()?;
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::warn!("audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                    );
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Capture at the device's native config and convert in software.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let device = self.device()?;
        let default_config =
            device
                .default_input_config()
                .map_err(|e| HugError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        tracing::info!(
            "using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            tracing::warn!("audio stream error: {}", err);
        };
        let buffer = Arc::clone(&self.buffer);

        match default_config.sample_format() {
            SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let mono = downmix_to_mono(data, native_channels);
                        let converted = resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| HugError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let i16_data: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let mono = downmix_to_mono(&i16_data, native_channels);
                        let converted = resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| HugError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            fmt => Err(HugError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a device with --device.",
                    fmt
                ),
            }),
        }
    }
}

impl CaptureStream for CpalCaptureStream {
    fn start_recording(&mut self, mime_type: Option<&str>) -> Result<()> {
        if let Some(mime) = mime_type
            && !mime.eq_ignore_ascii_case(WAV_MIME_TYPE)
        {
            return Err(HugError::AudioCapture {
                message: format!("Unsupported recording format: {mime}"),
            });
        }
        if self.stream.is_some() {
            return Ok(());
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| HugError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn mime_type(&self) -> String {
        WAV_MIME_TYPE.to_string()
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>> {
        if let Some(sendable_stream) = self.stream.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| HugError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }

        let samples = {
            let mut buffer = self.buffer.lock().map_err(|e| HugError::AudioCapture {
                message: format!("Failed to lock audio buffer: {}", e),
            })?;
            std::mem::take(&mut *buffer)
        };

        let wav = encode_wav(&samples, self.sample_rate)?;
        if wav.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![wav])
        }
    }

    fn stop_tracks(&mut self) {
        self.stream = None;
        self.device = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("PulseAudio"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_backend_only_supports_wav() {
        let backend = CpalCaptureBackend::default();
        assert!(backend.is_type_supported("audio/wav"));
        assert!(!backend.is_type_supported("audio/webm;codecs=opus"));
        assert!(!backend.is_type_supported("audio/ogg"));
    }

    #[tokio::test]
    async fn test_missing_named_device_is_reported_as_denied() {
        let backend = CpalCaptureBackend::new(Some("NonExistentDevice12345".to_string()), 16000);
        match backend.request_microphone().await {
            Err(HugError::PermissionDenied { message }) => {
                assert!(message.contains("NonExistentDevice12345"));
            }
            Err(HugError::AudioCapture { .. }) => {} // no audio host in CI
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected the named device to be missing"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires audio hardware
    async fn test_record_and_stop_produces_wav() {
        let backend = CpalCaptureBackend::default();
        let mut stream = backend.request_microphone().await.expect("microphone");

        stream.start_recording(Some(WAV_MIME_TYPE)).expect("start");
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let chunks = stream.stop_recording().expect("stop");
        stream.stop_tracks();

        assert!(chunks.len() <= 1);
        if let Some(wav) = chunks.first() {
            assert!(wav.starts_with(b"RIFF"));
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices_filters_outputs() {
        let devices = list_devices().expect("Failed to list devices");
        for device in &devices {
            assert!(!device.to_lowercase().contains("hdmi"), "{device}");
        }
    }
}
