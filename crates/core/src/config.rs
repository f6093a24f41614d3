//! Persisted settings.
//!
//! Settings live in a JSON file (`cadence.json` in the platform config
//! directory unless a path is given). Every setting is described by a
//! [`SettingInfo`] entry; validation and the `key = value` editing used by
//! the command line are both driven by that table.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rhythm::pattern::{TimeSignature, MAX_BPM, MIN_BPM};
use crate::Settings;

const FILE_NAME: &str = "cadence.json";

/// Values a setting accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Allowed {
    Any,
    Range { min: f64, max: f64 },
    Choices(Vec<String>),
    Flag,
    TimeSignature,
}

impl std::fmt::Display for Allowed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Allowed::Any => write!(f, "any"),
            Allowed::Range { min, max } => write!(f, "{}-{}", min, max),
            Allowed::Choices(choices) => write!(f, "{}", choices.join("|")),
            Allowed::Flag => write!(f, "true|false"),
            Allowed::TimeSignature => write!(f, "N/D"),
        }
    }
}

/// One entry of the settings table.
#[derive(Debug, Clone, Serialize)]
pub struct SettingInfo {
    pub key: &'static str,
    pub description: &'static str,
    pub allowed: Allowed,
    /// Only read when the engine starts.
    pub requires_restart: bool,
}

impl SettingInfo {
    fn new(key: &'static str, description: &'static str, allowed: Allowed) -> Self {
        Self {
            key,
            description,
            allowed,
            requires_restart: false,
        }
    }

    fn restart(mut self) -> Self {
        self.requires_restart = true;
        self
    }

    fn check(&self, value: &str) -> Result<(), String> {
        match &self.allowed {
            Allowed::Any | Allowed::Flag => Ok(()),
            Allowed::Range { min, max } => {
                let number: f64 = value
                    .parse()
                    .map_err(|_| format!("{} must be a number, got {:?}", self.key, value))?;
                if (*min..=*max).contains(&number) {
                    Ok(())
                } else {
                    Err(format!("{} must be between {} and {}", self.key, min, max))
                }
            }
            Allowed::Choices(choices) => {
                if choices.iter().any(|choice| choice == value) {
                    Ok(())
                } else {
                    Err(format!("{} must be one of: {}", self.key, choices.join(", ")))
                }
            }
            Allowed::TimeSignature => value
                .parse::<TimeSignature>()
                .map(|_| ())
                .map_err(|_| format!("{} {:?} is not of the form N/D", self.key, value)),
        }
    }
}

/// On-disk layout of the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    version: String,
    settings: Settings,
    created_at: String,
    modified_at: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Config validation errors: {}", .0.join(", "))]
    ValidationError(Vec<String>),

    #[error("Unknown setting {0:?}")]
    UnknownKey(String),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
    /// Creation stamp of the file on disk, kept across saves.
    created_at: Option<String>,
}

impl ConfigManager {
    /// Manage the file at `config_path`, or at [`ConfigManager::default_path`].
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(Self::default_path),
            settings: Settings::default(),
            created_at: None,
        }
    }

    /// Platform config directory, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("cadence").join(FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(FILE_NAME))
    }

    /// Read the file, writing one with the defaults if none exists yet.
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            log::info!(
                "No settings at {}, writing defaults",
                self.config_path.display()
            );
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;
        let file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Settings written by version {}, running {}",
                file.version,
                env!("CARGO_PKG_VERSION")
            );
        }
        Self::validate_settings(&file.settings).map_err(ConfigError::ValidationError)?;

        self.settings = file.settings;
        self.created_at = Some(file.created_at);
        log::info!("Loaded settings from {}", self.config_path.display());
        Ok(self.settings.clone())
    }

    /// Write the current settings.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let created_at = self.created_at.get_or_insert_with(|| now.clone()).clone();
        let file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at,
            modified_at: now,
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        log::debug!("Saved settings to {}", self.config_path.display());
        Ok(())
    }

    /// Replace every setting at once. Nothing is written if validation fails.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::ValidationError)?;
        self.settings = settings;
        self.save()
    }

    /// Change one setting by key, as typed on the command line.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut settings = self.settings.clone();
        assign(&mut settings, key, value)?;
        self.update_settings(settings)
    }

    /// Restore and save the defaults.
    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        self.save()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Every setting in file order, paired with its current value.
    pub fn entries(&self) -> Vec<(SettingInfo, String)> {
        Self::schema()
            .into_iter()
            .map(|info| {
                let value = read(&self.settings, info.key).unwrap_or_default();
                (info, value)
            })
            .collect()
    }

    /// Description of every setting.
    pub fn schema() -> Vec<SettingInfo> {
        let choices = |values: &[u32]| Allowed::Choices(values.iter().map(u32::to_string).collect());
        vec![
            SettingInfo::new(
                "audio_device",
                "Output device, matched by substring",
                Allowed::Any,
            )
            .restart(),
            SettingInfo::new(
                "audio_buffer_size",
                "Audio buffer size in samples",
                choices(&[128, 256, 512, 1024, 2048]),
            )
            .restart(),
            SettingInfo::new(
                "audio_sample_rate",
                "Audio sample rate in Hz",
                choices(&[44100, 48000, 96000]),
            )
            .restart(),
            SettingInfo::new(
                "master_volume",
                "Output volume applied to every voice",
                Allowed::Range { min: 0.0, max: 1.0 },
            ),
            SettingInfo::new(
                "default_bpm",
                "Tempo used when none is given",
                Allowed::Range {
                    min: MIN_BPM,
                    max: MAX_BPM,
                },
            ),
            SettingInfo::new(
                "default_time_signature",
                "Time signature used when none is given",
                Allowed::TimeSignature,
            ),
            SettingInfo::new("click_enabled", "Play a click on every beat", Allowed::Flag),
            SettingInfo::new(
                "tolerance_fraction",
                "Tap window as a fraction of the beat interval",
                Allowed::Range {
                    min: 0.05,
                    max: 0.5,
                },
            ),
            SettingInfo::new(
                "round_length_secs",
                "Length of a rhythm round in seconds",
                Allowed::Range {
                    min: 5.0,
                    max: 600.0,
                },
            ),
            SettingInfo::new(
                "harmony_time_limit_secs",
                "Time limit of a harmony level in seconds",
                Allowed::Range {
                    min: 10.0,
                    max: 600.0,
                },
            ),
        ]
    }

    /// Check every setting against [`ConfigManager::schema`].
    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let errors: Vec<String> = Self::schema()
            .iter()
            .filter_map(|info| {
                let value = read(settings, info.key)?;
                info.check(&value).err()
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Current value of `key` in its command-line form.
fn read(settings: &Settings, key: &str) -> Option<String> {
    let value = match key {
        "audio_device" => settings.audio_device.clone(),
        "audio_buffer_size" => settings.audio_buffer_size.to_string(),
        "audio_sample_rate" => settings.audio_sample_rate.to_string(),
        "master_volume" => settings.master_volume.to_string(),
        "default_bpm" => settings.default_bpm.to_string(),
        "default_time_signature" => settings.default_time_signature.clone(),
        "click_enabled" => settings.click_enabled.to_string(),
        "tolerance_fraction" => settings.tolerance_fraction.to_string(),
        "round_length_secs" => settings.round_length_secs.to_string(),
        "harmony_time_limit_secs" => settings.harmony_time_limit_secs.to_string(),
        _ => return None,
    };
    Some(value)
}

/// Parse `value` into the field named `key`. Range checks happen later.
fn assign(settings: &mut Settings, key: &str, value: &str) -> Result<(), ConfigError> {
    fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    match key {
        "audio_device" => settings.audio_device = value.to_string(),
        "audio_buffer_size" => settings.audio_buffer_size = parse(key, value)?,
        "audio_sample_rate" => settings.audio_sample_rate = parse(key, value)?,
        "master_volume" => settings.master_volume = parse(key, value)?,
        "default_bpm" => settings.default_bpm = parse(key, value)?,
        "default_time_signature" => settings.default_time_signature = value.trim().to_string(),
        "click_enabled" => settings.click_enabled = parse(key, value)?,
        "tolerance_fraction" => settings.tolerance_fraction = parse(key, value)?,
        "round_length_secs" => settings.round_length_secs = parse(key, value)?,
        "harmony_time_limit_secs" => settings.harmony_time_limit_secs = parse(key, value)?,
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}
