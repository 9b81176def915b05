//! Terminal front end.
//!
//! Wires the real microphone, backend and player into a [`VoiceSession`] and
//! renders its status projection, plus the one-shot backend commands.

#[cfg(feature = "cpal-audio")]
use crate::audio::capture::{CpalCaptureBackend, suppress_audio_warnings};
#[cfg(feature = "cpal-audio")]
use crate::audio::playback::CommandPlayer;
use crate::backend::{ChatBackend, HttpChatBackend};
use crate::cli::TalkArgs;
use crate::config::{AudioConfig, Config};
use crate::error::Result;
use crate::history::{Turn, pair_conversation};
#[cfg(feature = "cpal-audio")]
use crate::session::{SessionCommand, VoiceSession};
use crate::session::{SessionOptions, SessionState, StatusSnapshot};
use owo_colors::OwoColorize;
#[cfg(feature = "cpal-audio")]
use std::io::BufRead;
#[cfg(feature = "cpal-audio")]
use std::sync::Arc;
#[cfg(feature = "cpal-audio")]
use tokio::sync::mpsc;

/// Run an interactive voice session until the user quits.
///
/// Enter toggles the microphone; `q`, end of input or Ctrl-C ends the session.
#[cfg(feature = "cpal-audio")]
pub async fn run_talk_command(mut config: Config, args: TalkArgs, quiet: bool) -> Result<()> {
    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    if let Some(device) = args.device.clone() {
        config.audio.device = Some(device);
    }
    config.validate()?;
    let options = talk_options(&config.audio, &args);

    let capture = CpalCaptureBackend::new(config.audio.device.clone(), config.audio.sample_rate);
    let backend = HttpChatBackend::new(&config.backend)?;
    let player = CommandPlayer::new(
        config.playback.command.clone(),
        config.playback.args.clone(),
    );
    tracing::info!(
        "backend {}, player {}",
        backend.base_url(),
        player.command()
    );

    let mut session = VoiceSession::new(
        Arc::new(capture),
        Arc::new(backend),
        Arc::new(player),
        options,
    );

    let mut status = session.subscribe();
    let renderer = tokio::spawn(async move {
        let mut last: Option<StatusSnapshot> = None;
        render(&status.borrow_and_update().clone(), &mut last, quiet);
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            render(&snapshot, &mut last, quiet);
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_stdin_reader(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tx.send(SessionCommand::Close).ok();
        }
    });

    if !quiet {
        eprintln!(
            "{}",
            "Press Enter to talk, Enter again to send. Type q to quit.".dimmed()
        );
    }

    session.run(rx).await;
    drop(session);
    if let Err(e) = renderer.await {
        tracing::debug!("status renderer ended abnormally: {e}");
    }
    Ok(())
}

/// Session options for `talk`: the config limit, replaced by `--max-recording`.
///
/// The flag keeps sub-second precision; a zero flag means never.
pub fn talk_options(audio: &AudioConfig, args: &TalkArgs) -> SessionOptions {
    let mut options = SessionOptions::from_config(audio);
    match args.max_recording {
        Some(limit) if limit.is_zero() => options.max_recording = None,
        Some(limit) => options = options.with_max_recording(limit),
        None => {}
    }
    options
}

/// Read stdin on a plain thread so a pending read never blocks runtime shutdown.
#[cfg(feature = "cpal-audio")]
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<SessionCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let command = parse_command(&line);
            if tx.send(command).is_err() || command == SessionCommand::Close {
                return;
            }
        }
        tx.send(SessionCommand::Close).ok();
    });
}

#[cfg(feature = "cpal-audio")]
fn parse_command(line: &str) -> SessionCommand {
    match line.trim().to_ascii_lowercase().as_str() {
        "q" | "quit" | "exit" => SessionCommand::Close,
        _ => SessionCommand::ToggleMic,
    }
}

#[cfg(feature = "cpal-audio")]
fn render(snapshot: &StatusSnapshot, last: &mut Option<StatusSnapshot>, quiet: bool) {
    let changed = last.as_ref().is_none_or(|prev| {
        prev.state != snapshot.state
            || prev.status_text != snapshot.status_text
            || prev.error_text != snapshot.error_text
    });
    *last = Some(snapshot.clone());
    if !changed || !snapshot.live {
        return;
    }
    if quiet && snapshot.error_text.is_none() && snapshot.state != SessionState::Idle {
        return;
    }
    println!("{}", format_status(snapshot));
}

/// One rendered status line: the status text, then the error or hint.
pub fn format_status(snapshot: &StatusSnapshot) -> String {
    let status = match snapshot.state {
        SessionState::Listening => format!("● {}", snapshot.status_text.red()),
        SessionState::Playing => format!("♪ {}", snapshot.status_text.green()),
        SessionState::Arming | SessionState::Finalizing | SessionState::Uploading => {
            format!("… {}", snapshot.status_text.yellow())
        }
        SessionState::Idle | SessionState::Reporting | SessionState::Error => {
            format!("  {}", snapshot.status_text.bold())
        }
    };
    let secondary = match &snapshot.error_text {
        Some(error) => error.red().to_string(),
        None => snapshot.secondary_text().dimmed().to_string(),
    };
    format!("{status}  {secondary}")
}

/// Print the conversation so far, paired into turns.
pub async fn run_history_command(config: &Config, json: bool) -> Result<()> {
    let backend = HttpChatBackend::new(&config.backend)?;
    let records = backend.conversation_history().await?;
    let turns = pair_conversation(&records);
    tracing::debug!("{} records paired into {} turns", records.len(), turns.len());

    if json {
        let rendered = serde_json::to_string_pretty(&turns)
            .map_err(|e| crate::error::HugError::Other(e.to_string()))?;
        println!("{rendered}");
    } else {
        print!("{}", format_turns(&turns));
    }
    Ok(())
}

/// Human-readable transcript of paired turns.
pub fn format_turns(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "No conversation yet.\n".to_string();
    }

    let mut out = String::new();
    for turn in turns {
        if !turn.child.trim().is_empty() {
            out.push_str(&format!("{} {}\n", "You:".cyan(), turn.child));
        }
        if let Some(reply) = &turn.grandpa {
            out.push_str(&format!("{} {}\n", "Grandpa:".green(), reply));
        }
        out.push('\n');
    }
    out
}

/// Ask the backend to forget the conversation.
pub async fn run_reset_command(config: &Config) -> Result<()> {
    let backend = HttpChatBackend::new(&config.backend)?;
    let message = backend.reset_conversation().await?;
    println!("{}", message.green());
    Ok(())
}

/// Print the backend's health report.
pub async fn run_health_command(config: &Config) -> Result<()> {
    let backend = HttpChatBackend::new(&config.backend)?;
    let health = backend.health().await?;

    println!("{} {}", "Client:".dimmed(), crate::version_string());
    println!("{} {}", "Backend:".dimmed(), backend.base_url());
    for (key, value) in health_lines(&health) {
        println!("  {} {}", format!("{key}:").dimmed(), value);
    }
    Ok(())
}

/// Flatten a health report into key/value pairs for display.
pub fn health_lines(health: &serde_json::Value) -> Vec<(String, String)> {
    match health {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let shown = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), shown)
            })
            .collect(),
        other => vec![("status".to_string(), other.to_string())],
    }
}
