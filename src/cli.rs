//! Command-line interface for grandpa-hug
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Talk to Grandpa from your terminal
#[derive(Parser, Debug)]
#[command(
    name = "grandpa-hug",
    version,
    about = "Talk to Grandpa from your terminal"
)]
pub struct Cli {
    /// Subcommand to execute (default: talk)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides config and environment)
    #[arg(long, global = true, value_name = "URL")]
    pub backend_url: Option<String>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Options for an interactive voice session
#[derive(Args, Debug, Default, Clone, PartialEq)]
pub struct TalkArgs {
    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Stop recording automatically after this long (e.g. 30s, 2m; 0 = never)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub max_recording: Option<Duration>,
}

/// Parse a duration string.
///
/// Bare numbers are seconds; anything else goes through `humantime`
/// (`30s`, `2m`, `1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a voice session (press Enter to toggle the mic, q to quit)
    Talk(TalkArgs),

    /// Show the conversation so far
    History {
        /// Print turns as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget the conversation on the backend
    Reset,

    /// Check that the backend is up
    Health,

    /// List available audio input devices
    Devices,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
