//! End-to-end behaviour of a voice session against mock devices and backend.

use grandpa_hug::audio::playback::MockPlayer;
use grandpa_hug::audio::recorder::{CaptureBackend, MockCaptureBackend};
use grandpa_hug::backend::MockChatBackend;
use grandpa_hug::defaults;
use grandpa_hug::{
    HugError, SessionCommand, SessionEvent, SessionOptions, SessionState, TurnOutcome,
    VoiceSession,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Rig {
    mic: MockCaptureBackend,
    backend: MockChatBackend,
    player: MockPlayer,
}

impl Rig {
    fn new() -> Self {
        Self {
            mic: MockCaptureBackend::new(),
            backend: MockChatBackend::new(),
            player: MockPlayer::new(),
        }
    }

    fn session(&self) -> VoiceSession {
        self.session_with(SessionOptions::default())
    }

    fn session_with(&self, options: SessionOptions) -> VoiceSession {
        VoiceSession::new(
            Arc::new(self.mic.clone()),
            Arc::new(self.backend.clone()),
            Arc::new(self.player.clone()),
            options,
        )
    }
}

/// Apply the next event, failing the test if none arrives in time.
async fn step(session: &mut VoiceSession) {
    let progressed = tokio::time::timeout(Duration::from_secs(2), session.process_next())
        .await
        .expect("session event within timeout");
    assert!(progressed, "session closed unexpectedly");
}

/// Step until the session reaches `state`.
async fn drive_until(session: &mut VoiceSession, state: SessionState) {
    for _ in 0..16 {
        if session.state() == state {
            return;
        }
        step(session).await;
    }
    panic!("session never reached {state}, stuck in {}", session.state());
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

/// Arm, listen, stop: leaves the session uploading.
async fn record_and_send(session: &mut VoiceSession) {
    session.toggle_mic();
    drive_until(session, SessionState::Listening).await;
    session.toggle_mic();
    drive_until(session, SessionState::Uploading).await;
}

#[tokio::test]
async fn toggles_while_busy_never_open_a_second_capture() {
    let rig = Rig {
        backend: MockChatBackend::new().with_held_uploads(),
        ..Rig::new()
    };
    let mut session = rig.session();

    session.toggle_mic();
    for _ in 0..5 {
        session.toggle_mic();
        assert_eq!(session.state(), SessionState::Arming);
    }
    step(&mut session).await;
    assert_eq!(session.state(), SessionState::Listening);

    session.toggle_mic();
    assert_eq!(session.state(), SessionState::Finalizing);
    for _ in 0..5 {
        session.toggle_mic();
        assert_eq!(session.state(), SessionState::Finalizing);
    }

    step(&mut session).await;
    assert_eq!(session.state(), SessionState::Uploading);
    for _ in 0..5 {
        session.toggle_mic();
        assert_eq!(session.state(), SessionState::Uploading);
    }

    assert_eq!(rig.mic.streams_opened(), 1);
    assert_eq!(rig.mic.recordings_started(), 1);
    assert_eq!(rig.mic.peak_open_tracks(), 1);
    assert_eq!(rig.mic.open_tracks(), 0);
}

#[tokio::test]
async fn repeated_turns_keep_at_most_one_track_open() {
    let rig = Rig::new();
    let mut session = rig.session();

    for _ in 0..3 {
        record_and_send(&mut session).await;
        drive_until(&mut session, SessionState::Idle).await;
    }

    assert_eq!(rig.mic.streams_opened(), 3);
    assert_eq!(rig.mic.peak_open_tracks(), 1);
    assert_eq!(rig.mic.open_tracks(), 0);
    assert_eq!(rig.backend.upload_count(), 3);
}

#[tokio::test]
async fn audio_reply_plays_then_returns_to_idle() {
    let rig = Rig {
        backend: MockChatBackend::new().with_audio_reply("audio/webm", b"grandpa-voice"),
        player: MockPlayer::new().with_hold(),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;

    assert_eq!(session.state(), SessionState::Playing);
    assert_eq!(session.status().status_text, "Grandpa is talking...");
    let path = session
        .playback_path()
        .expect("playing reply has a resource")
        .to_path_buf();
    assert!(path.exists());

    rig.player.finish_current();
    step(&mut session).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.status().status_text, defaults::STATUS_IDLE);
    assert_eq!(session.last_outcome(), Some(&TurnOutcome::Played));
    assert_eq!(rig.player.played(), vec![b"grandpa-voice".to_vec()]);
    assert!(session.playback_path().is_none());
    assert!(!path.exists(), "playback resource released after playback");
}

#[tokio::test]
async fn text_reply_skips_playback_and_shows_body() {
    let rig = Rig {
        backend: MockChatBackend::new().with_text_reply("Hello, my dear."),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.status().status_text, "Hello, my dear.");
    assert_eq!(session.status().error_text, None);
    assert_eq!(
        session.last_outcome(),
        Some(&TurnOutcome::Reported("Hello, my dear.".to_string()))
    );
    assert!(rig.player.played().is_empty());
    assert!(session.playback_path().is_none());
}

#[tokio::test]
async fn empty_text_reply_falls_back_to_idle_prompt() {
    let rig = Rig {
        backend: MockChatBackend::new().with_text_reply(""),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;

    assert_eq!(session.status().status_text, defaults::STATUS_IDLE);
}

#[tokio::test]
async fn empty_capture_reports_without_network_call() {
    let rig = Rig {
        mic: MockCaptureBackend::new().with_chunks(vec![Vec::new(), Vec::new()]),
        ..Rig::new()
    };
    let mut session = rig.session();

    session.toggle_mic();
    step(&mut session).await;
    session.toggle_mic();
    step(&mut session).await;

    let status = session.status();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(
        status.error_text.as_deref(),
        Some("I didn't catch any audio. Try again?")
    );
    assert_eq!(status.status_text, defaults::STATUS_IDLE);
    assert_eq!(rig.backend.upload_count(), 0);
    assert_eq!(rig.mic.open_tracks(), 0);
}

#[tokio::test]
async fn server_error_body_becomes_error_text() {
    let rig = Rig {
        backend: MockChatBackend::new().with_failure(Some(500), "Grandpa is sleeping"),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;

    let status = session.status();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.error_text.as_deref(), Some("Grandpa is sleeping"));
    assert_eq!(status.secondary_text(), "Grandpa is sleeping");
}

#[tokio::test]
async fn server_error_without_body_shows_status_code() {
    let rig = Rig {
        backend: MockChatBackend::new().with_failure(Some(503), ""),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;

    assert_eq!(session.status().error_text.as_deref(), Some("HTTP 503"));
}

#[tokio::test]
async fn transport_failure_uses_its_message() {
    let rig = Rig {
        backend: MockChatBackend::new().with_response(Err(HugError::NetworkFailure {
            status: None,
            message: "Could not reach Grandpa: connection refused".to_string(),
        })),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;

    assert_eq!(
        session.status().error_text.as_deref(),
        Some("Could not reach Grandpa: connection refused")
    );
}

#[tokio::test]
async fn upload_is_named_after_negotiated_codec() {
    let rig = Rig {
        mic: MockCaptureBackend::new().with_supported_types(&["audio/ogg;codecs=opus"]),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    assert_eq!(
        session.status().mime_type.as_deref(),
        Some("audio/ogg;codecs=opus")
    );
    drive_until(&mut session, SessionState::Idle).await;

    let uploads = rig.backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].file_name(), "voice.ogg");
    assert_eq!(uploads[0].bytes, b"mock-voice".to_vec());
}

#[tokio::test]
async fn unsupported_codecs_fall_back_to_recorder_default() {
    let rig = Rig {
        mic: MockCaptureBackend::new()
            .with_supported_types(&[])
            .with_default_mime_type("audio/mp4"),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    drive_until(&mut session, SessionState::Idle).await;

    let uploads = rig.backend.uploads();
    assert_eq!(uploads[0].mime_type, "audio/mp4");
    assert_eq!(uploads[0].file_name(), "voice.webm");
}

#[tokio::test]
async fn teardown_mid_upload_leaves_no_open_tracks() {
    let rig = Rig {
        backend: MockChatBackend::new()
            .with_audio_reply("audio/mpeg", b"late")
            .with_held_uploads(),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    wait_for(|| rig.backend.upload_count() == 1).await;

    session.teardown();
    assert_eq!(rig.mic.open_tracks(), 0);
    assert!(!session.is_live());

    // The late answer lands on a closed session and is dropped.
    rig.backend.release_upload();
    tokio::task::yield_now().await;
    assert!(!session.process_next().await);
    assert!(rig.player.played().is_empty());
    assert!(session.playback_path().is_none());

    session.teardown();
}

#[tokio::test]
async fn teardown_while_listening_stops_the_recorder() {
    let rig = Rig::new();
    let mut session = rig.session();

    session.toggle_mic();
    step(&mut session).await;
    assert_eq!(rig.mic.open_tracks(), 1);

    session.teardown();
    assert_eq!(rig.mic.open_tracks(), 0);
    assert_eq!(rig.mic.track_stops(), 1);
    assert_eq!(rig.backend.upload_count(), 0);
}

#[tokio::test]
async fn teardown_during_playback_stops_player_and_releases_resource() {
    let rig = Rig {
        backend: MockChatBackend::new().with_audio_reply("audio/mpeg", b"story"),
        player: MockPlayer::new().with_hold(),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;
    let path = session
        .playback_path()
        .expect("playing reply has a resource")
        .to_path_buf();
    wait_for(|| rig.player.active() == 1).await;

    session.teardown();
    session.teardown();

    assert!(!path.exists());
    wait_for(|| rig.player.active() == 0).await;
}

#[tokio::test]
async fn dropping_the_session_releases_everything() {
    let rig = Rig::new();
    let mut session = rig.session();

    session.toggle_mic();
    step(&mut session).await;
    drop(session);

    assert_eq!(rig.mic.open_tracks(), 0);
}

#[tokio::test]
async fn grant_after_teardown_is_released_immediately() {
    let rig = Rig::new();
    let mut session = rig.session();

    session.toggle_mic();
    session.teardown();

    // The pending microphone request finishes after the close.
    wait_for(|| rig.mic.streams_opened() == 1).await;
    wait_for(|| rig.mic.open_tracks() == 0).await;
    assert_eq!(rig.mic.recordings_started(), 0);
}

#[tokio::test]
async fn stale_grant_delivered_directly_is_released() {
    let rig = Rig::new();
    let mut session = rig.session();
    let stream = rig.mic.request_microphone().await.unwrap();
    assert_eq!(rig.mic.open_tracks(), 1);

    session.handle(SessionEvent::MicGranted { turn: 42, stream });

    assert_eq!(rig.mic.open_tracks(), 0);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn stale_playback_end_is_ignored() {
    let rig = Rig {
        backend: MockChatBackend::new().with_audio_reply("audio/mpeg", b"story"),
        player: MockPlayer::new().with_hold(),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;
    assert_eq!(session.state(), SessionState::Playing);

    session.handle(SessionEvent::PlaybackEnded {
        playback_id: 999,
        result: Ok(()),
    });

    assert_eq!(session.state(), SessionState::Playing);
    assert!(session.playback_path().is_some());
}

#[tokio::test]
async fn toggle_during_playback_interrupts_and_listens() {
    let rig = Rig {
        backend: MockChatBackend::new().with_audio_reply("audio/mpeg", b"long story"),
        player: MockPlayer::new().with_hold(),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;
    let path = session
        .playback_path()
        .expect("playing reply has a resource")
        .to_path_buf();

    session.toggle_mic();
    assert_eq!(session.state(), SessionState::Arming);
    assert!(!path.exists());
    assert!(session.playback_path().is_none());

    step(&mut session).await;
    assert_eq!(session.state(), SessionState::Listening);
    assert_eq!(rig.mic.peak_open_tracks(), 1);
    wait_for(|| rig.player.active() == 0).await;
}

#[tokio::test]
async fn player_failure_reports_and_releases() {
    let rig = Rig {
        backend: MockChatBackend::new().with_audio_reply("audio/mpeg", b"x"),
        player: MockPlayer::new().with_failure(),
        ..Rig::new()
    };
    let mut session = rig.session();

    record_and_send(&mut session).await;
    step(&mut session).await;
    let path = session
        .playback_path()
        .expect("playing reply has a resource")
        .to_path_buf();
    step(&mut session).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        session.status().error_text.as_deref(),
        Some("mock playback failed")
    );
    assert!(!path.exists());
}

#[tokio::test]
async fn max_recording_timer_stops_capture() {
    let rig = Rig::new();
    let mut session =
        rig.session_with(SessionOptions::default().with_max_recording(Duration::from_millis(50)));

    session.toggle_mic();
    step(&mut session).await;
    assert_eq!(session.state(), SessionState::Listening);

    step(&mut session).await;
    assert_eq!(session.state(), SessionState::Finalizing);
    assert_eq!(rig.mic.open_tracks(), 0);

    drive_until(&mut session, SessionState::Idle).await;
    assert_eq!(rig.backend.upload_count(), 1);
}

#[tokio::test]
async fn stale_timer_from_previous_turn_is_ignored() {
    let rig = Rig::new();
    let mut session = rig.session();

    session.toggle_mic();
    step(&mut session).await;
    let turn = session.turn();

    session.handle(SessionEvent::RecordingTimeout { turn: turn - 1 });
    assert_eq!(session.state(), SessionState::Listening);

    session.handle(SessionEvent::RecordingTimeout { turn });
    assert_eq!(session.state(), SessionState::Finalizing);
}

#[tokio::test]
async fn run_loop_follows_commands_and_tears_down_on_close() {
    let rig = Rig {
        backend: MockChatBackend::new().with_text_reply("Sleep well."),
        ..Rig::new()
    };
    let mut session = rig.session();
    let mut status = session.subscribe();
    let (tx, rx) = mpsc::unbounded_channel();

    let driver = tokio::spawn(async move {
        session.run(rx).await;
        session
    });

    tx.send(SessionCommand::ToggleMic).unwrap();
    status
        .wait_for(|s| s.state == SessionState::Listening)
        .await
        .unwrap();
    tx.send(SessionCommand::ToggleMic).unwrap();
    status
        .wait_for(|s| s.status_text == "Sleep well.")
        .await
        .unwrap();

    tx.send(SessionCommand::Close).unwrap();
    let session = tokio::time::timeout(Duration::from_secs(2), driver)
        .await
        .expect("run loop exits on close")
        .unwrap();

    assert!(!session.is_live());
    assert_eq!(rig.mic.open_tracks(), 0);
    assert_eq!(rig.backend.upload_count(), 1);
}

#[tokio::test]
async fn run_loop_exits_when_commands_close() {
    let rig = Rig::new();
    let mut session = rig.session();
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(SessionCommand::ToggleMic).unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(2), session.run(rx))
        .await
        .expect("run loop exits when commands close");

    assert!(!session.is_live());
    assert_eq!(rig.mic.open_tracks(), 0);
}
