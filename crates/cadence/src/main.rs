use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cadence_audio::{default_device_name, list_audio_devices};
use cadence_core::{
    ConfigError, ConfigManager, EngineError, PatternLibrary, TimeSignature, MAX_BPM, MIN_BPM,
};

mod practice;
mod terminal;

/// Metronome, virtual piano and ear training games in the terminal.
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Cadence tone and rhythm trainer")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Audio output device, matched by substring
    #[arg(long, global = true)]
    device: Option<String>,

    /// Master volume between 0 and 1
    #[arg(long, global = true)]
    volume: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Click along at a steady tempo
    Metronome {
        /// Tempo in beats per minute (40-200)
        #[arg(long, value_parser = parse_bpm)]
        bpm: Option<f64>,

        /// Time signature such as 3/4 or 6/8
        #[arg(long, value_parser = parse_signature)]
        signature: Option<TimeSignature>,
    },
    /// Play notes from the computer keyboard
    Piano,
    /// Play a single chord
    Chord {
        /// Chord symbol: maj7, 7, dim, aug, m or empty for major
        #[arg(default_value = "")]
        symbol: String,

        /// Root note
        #[arg(long, default_value = "C")]
        root: String,
    },
    /// Tap the strong beats of a pattern
    Rhythm {
        /// Pattern id, see `cadence patterns`
        #[arg(long, default_value = "0")]
        pattern: usize,

        /// Round length in seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Build a chord progression against the clock
    Harmony {
        /// Level id (0-2)
        #[arg(long, default_value = "0")]
        level: usize,
    },
    /// List the built-in rhythm patterns
    Patterns,
    /// List audio output devices
    Devices,
    /// Show or change the saved settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum ConfigAction {
    /// Print every setting with its allowed values
    Show,
    /// Change one setting, e.g. `set default_bpm 100`
    Set { key: String, value: String },
    /// Restore the defaults
    Reset,
}

fn parse_bpm(s: &str) -> Result<f64, String> {
    let bpm: f64 = s.parse().map_err(|e| format!("Invalid BPM: {}", e))?;
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(format!("BPM must be between {} and {}", MIN_BPM, MAX_BPM));
    }
    Ok(bpm)
}

fn parse_signature(s: &str) -> Result<TimeSignature, String> {
    s.parse().map_err(|e: EngineError| e.to_string())
}

/// Apply a `config` action. Returns the lines to print.
fn run_config(
    config: &mut ConfigManager,
    action: ConfigAction,
) -> Result<Vec<String>, ConfigError> {
    match action {
        ConfigAction::Show => {
            let mut lines = vec![format!("Settings file: {}", config.config_path().display())];
            for (info, value) in config.entries() {
                let restart = if info.requires_restart { " (restart)" } else { "" };
                lines.push(format!(
                    "  {:<24} = {:<10} [{}] {}{}",
                    info.key, value, info.allowed, info.description, restart
                ));
            }
            Ok(lines)
        }
        ConfigAction::Set { key, value } => {
            config.set_value(&key, &value)?;
            Ok(vec![format!("{} = {}", key, value)])
        }
        ConfigAction::Reset => {
            config.reset_to_defaults()?;
            Ok(vec![format!(
                "Restored defaults in {}",
                config.config_path().display()
            )])
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = ConfigManager::new(args.config.clone());
    if let Command::Config { action } = &args.command {
        let action = action.clone().unwrap_or(ConfigAction::Show);
        // A broken file can still be reset
        if action != ConfigAction::Reset {
            config.load()?;
        }
        for line in run_config(&mut config, action)? {
            println!("{}", line);
        }
        return Ok(());
    }

    let mut settings = config.load()?;
    if let Some(device) = args.device {
        settings.audio_device = device;
    }
    if let Some(volume) = args.volume {
        settings.master_volume = volume.clamp(0.0, 1.0);
    }
    log::debug!("Using settings from {}", config.config_path().display());

    match args.command {
        Command::Patterns => {
            for preset in PatternLibrary::builtin().presets() {
                let flags: Vec<String> = preset.flags.iter().map(|f| f.to_string()).collect();
                println!(
                    "{:>2}  {:<16} {:>5.0} bpm  {:<5} {:<6}  {}",
                    preset.id,
                    preset.name,
                    preset.bpm,
                    preset.time_signature.to_string(),
                    preset.difficulty.as_str(),
                    flags.join(" ")
                );
            }
            Ok(())
        }
        Command::Devices => {
            let devices = list_audio_devices();
            if devices.is_empty() {
                println!("No audio output devices found");
            }
            for device in devices {
                let marker = if device.is_default { "*" } else { " " };
                println!(
                    "{} {} ({} channels)",
                    marker, device.name, device.max_channels
                );
            }
            if let Some(name) = default_device_name() {
                log::debug!("Default output device: {}", name);
            }
            Ok(())
        }
        command => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async move {
                match command {
                    Command::Metronome { bpm, signature } => {
                        if let Some(bpm) = bpm {
                            settings.default_bpm = bpm;
                        }
                        if let Some(signature) = signature {
                            settings.default_time_signature = signature.to_string();
                        }
                        practice::metronome(&settings).await
                    }
                    Command::Piano => practice::piano(&settings).await,
                    Command::Chord { symbol, root } => {
                        practice::chord(&settings, &symbol, &root).await
                    }
                    Command::Rhythm { pattern, seconds } => {
                        practice::rhythm(&settings, pattern, seconds).await
                    }
                    Command::Harmony { level } => practice::harmony(&settings, level).await,
                    Command::Patterns | Command::Devices | Command::Config { .. } => Ok(()),
                }
            })
        }
    }
}
