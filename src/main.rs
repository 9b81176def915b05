use anyhow::Result;
use clap::{CommandFactory, Parser};
use grandpa_hug::app::{run_health_command, run_history_command, run_reset_command};
use grandpa_hug::cli::{Cli, Commands, ConfigAction, TalkArgs};
use grandpa_hug::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    grandpa_hug::logging::init(cli.quiet, cli.verbose);

    match cli.command.take() {
        None => {
            let config = load_config(&cli)?;
            run_talk(config, TalkArgs::default(), cli.quiet).await?;
        }
        Some(Commands::Talk(args)) => {
            let config = load_config(&cli)?;
            run_talk(config, args, cli.quiet).await?;
        }
        Some(Commands::History { json }) => {
            let config = load_config(&cli)?;
            run_history_command(&config, json).await?;
        }
        Some(Commands::Reset) => {
            let config = load_config(&cli)?;
            run_reset_command(&config).await?;
        }
        Some(Commands::Health) => {
            let config = load_config(&cli)?;
            run_health_command(&config).await?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(&action, &cli)?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "grandpa-hug",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. `--backend-url` flag (backend URL only)
/// 2. Environment variable overrides
/// 3. Custom config path from CLI (--config), or ~/.config/grandpa-hug/config.toml
/// 4. Built-in defaults
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(path) = cli.config.as_deref() {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    let mut config = config.with_env_overrides();
    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "cpal-audio")]
async fn run_talk(config: Config, args: TalkArgs, quiet: bool) -> Result<()> {
    grandpa_hug::app::run_talk_command(config, args, quiet).await?;
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
async fn run_talk(_config: Config, _args: TalkArgs, _quiet: bool) -> Result<()> {
    anyhow::bail!("This build has no microphone support (enable the cpal-audio feature)")
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = grandpa_hug::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("This build has no microphone support (enable the cpal-audio feature)")
}

/// Handle configuration commands.
fn handle_config_command(action: &ConfigAction, cli: &Cli) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(cli)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
