//! Configuration management for the batch miner
//!
//! Supports configuration via command line arguments, environment variables
//! and configuration files (YAML/JSON) with validation and defaults.

use crate::device::{BatchDevice, DeviceFactory};
use crate::miner::{MinerConfig, DEFAULT_BATCH_WIDTH, DEFAULT_POWER_WATTS};
use crate::types::{parse_bits, BlockHeader, DIFFICULTY_ONE_BITS};
use crate::{Error, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark length when none is configured
pub const DEFAULT_BENCHMARK_DURATION: Duration = Duration::from_secs(30);

/// What the binary does once configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Mine until a block is found or the process is interrupted
    Solo,
    /// Mine the test header for a fixed duration and print a summary
    Benchmark,
    /// Print system information and exit
    Info,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Solo => write!(f, "solo"),
            Mode::Benchmark => write!(f, "benchmark"),
            Mode::Info => write!(f, "info"),
        }
    }
}

/// Batch hashing device kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// Multi-threaded software hashing
    Cpu,
    /// External hashing command run once per batch (e.g. a GPU kernel host)
    External,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::External => write!(f, "external"),
        }
    }
}

/// Named difficulty levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DifficultyPreset {
    VeryEasy,
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyPreset {
    /// Compact bits for this preset
    pub fn bits(&self) -> u32 {
        match self {
            DifficultyPreset::VeryEasy => DIFFICULTY_ONE_BITS,
            DifficultyPreset::Easy => 0x1d0f_ffff,
            DifficultyPreset::Medium => 0x1d00_0fff,
            DifficultyPreset::Hard => 0x1d00_00ff,
            DifficultyPreset::VeryHard => 0x1d00_000f,
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Complete configuration for the miner
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "batch-pow-miner",
    version = env!("CARGO_PKG_VERSION"),
    about = "Batch proof-of-work miner",
    long_about = "Searches for a nonce that brings the double SHA-256 of an 80-byte block header below its target, dispatching nonce batches to a hashing device"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// What to run
    #[arg(short = 'm', long, value_enum, default_value = "solo")]
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Log session details and every mining round
    #[arg(short = 'd', long)]
    #[serde(default)]
    pub debug: bool,

    /// Difficulty preset for the mined header
    #[arg(long, value_enum, default_value = "very-easy")]
    #[serde(default = "default_difficulty")]
    pub difficulty: DifficultyPreset,

    /// Explicit compact difficulty bits in hex, overrides --difficulty
    #[arg(short = 'b', long, value_name = "HEX")]
    pub bits: Option<String>,

    /// Batch hashing device
    #[arg(long, value_enum, default_value = "cpu")]
    #[serde(default = "default_device")]
    pub device: DeviceKind,

    /// Threads used by the CPU device (0 = one per logical CPU)
    #[arg(long, default_value = "0")]
    #[serde(default)]
    pub device_threads: usize,

    /// Command run per batch by the external device
    #[arg(long, env = "BATCH_MINER_EXTERNAL_CMD")]
    pub external_device_cmd: Option<String>,

    /// Nonces scanned per device call
    #[arg(long, default_value_t = DEFAULT_BATCH_WIDTH)]
    #[serde(default = "default_batch_width")]
    pub batch_width: u32,

    /// Seconds between progress reports
    #[arg(long, default_value = "3")]
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,

    /// Run duration, e.g. "30s" or "2m" (benchmark default: 30s)
    #[arg(short = 't', long)]
    pub duration: Option<String>,

    /// Device power draw in watts, for efficiency figures
    #[arg(long, default_value_t = DEFAULT_POWER_WATTS)]
    #[serde(default = "default_power_watts")]
    pub power_watts: f64,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Emit logs and the final result as JSON
    #[arg(long)]
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Parse the command line and merge the configuration file if specified
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config.
    ///
    /// Values given on the command line win; a CLI value still equal to its
    /// default is replaced by the file's value.
    fn merge_with_file(mut self, file_config: Self) -> Self {
        let defaults = Self::parse_from([crate::APP_NAME]);

        macro_rules! take_if_default {
            ($($field:ident),*) => {
                $(
                    if self.$field == defaults.$field {
                        self.$field = file_config.$field;
                    }
                )*
            };
        }

        take_if_default!(
            mode,
            debug,
            difficulty,
            device,
            device_threads,
            batch_width,
            report_interval,
            power_watts,
            log_level,
            json
        );

        if self.bits.is_none() {
            self.bits = file_config.bits;
        }

        if self.external_device_cmd.is_none() {
            self.external_device_cmd = file_config.external_device_cmd;
        }

        if self.duration.is_none() {
            self.duration = file_config.duration;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_width == 0 {
            return Err(Error::config("Batch width must be greater than 0"));
        }

        if self.report_interval == 0 {
            return Err(Error::config("Report interval must be greater than 0"));
        }

        if self.power_watts.is_nan() || self.power_watts < 0.0 {
            return Err(Error::config("Power draw must not be negative"));
        }

        self.target_bits()?;
        self.run_duration()?;

        if self.device == DeviceKind::External {
            let has_command = self
                .external_device_cmd
                .as_deref()
                .is_some_and(|cmd| !cmd.trim().is_empty());
            if !has_command {
                return Err(Error::config(
                    "The external device requires --external-device-cmd",
                ));
            }
        }

        Ok(())
    }

    /// Compact difficulty bits for the session header
    pub fn target_bits(&self) -> Result<u32> {
        match &self.bits {
            Some(bits) => parse_bits(bits),
            None => Ok(self.difficulty.bits()),
        }
    }

    /// Header to mine: the standard test header, or a custom-difficulty one
    pub fn header(&self) -> Result<BlockHeader> {
        let bits = self.target_bits()?;
        if self.bits.is_none() && self.difficulty == DifficultyPreset::VeryEasy {
            Ok(BlockHeader::test_header())
        } else {
            Ok(BlockHeader::with_difficulty(bits))
        }
    }

    /// Configured run duration, if any
    pub fn run_duration(&self) -> Result<Option<Duration>> {
        self.duration
            .as_deref()
            .map(|s| {
                humantime::parse_duration(s)
                    .map_err(|e| Error::config(format!("Invalid duration '{}': {}", s, e)))
            })
            .transpose()
    }

    /// Benchmark length
    pub fn benchmark_duration(&self) -> Result<Duration> {
        Ok(self.run_duration()?.unwrap_or(DEFAULT_BENCHMARK_DURATION))
    }

    /// Session tunables for the miner
    pub fn miner_config(&self) -> MinerConfig {
        MinerConfig {
            batch_width: self.batch_width,
            report_interval: Duration::from_secs(self.report_interval),
            debug: self.debug,
            power_watts: self.power_watts,
        }
    }

    /// Create the configured batch hashing device
    pub fn create_device(&self) -> Result<Arc<dyn BatchDevice>> {
        match self.device {
            DeviceKind::Cpu => Ok(DeviceFactory::create_cpu_device(self.device_threads)),
            DeviceKind::External => {
                let command = self.external_device_cmd.clone().ok_or_else(|| {
                    Error::config("The external device requires --external-device-cmd")
                })?;
                Ok(DeviceFactory::create_external_device(command))
            }
        }
    }

    /// Effective log level, raised to debug in debug mode
    pub fn effective_log_level(&self) -> LogLevel {
        if self.debug && matches!(self.log_level, LogLevel::Error | LogLevel::Warn | LogLevel::Info) {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

// Default value functions for serde
fn default_mode() -> Mode { Mode::Solo }
fn default_difficulty() -> DifficultyPreset { DifficultyPreset::VeryEasy }
fn default_device() -> DeviceKind { DeviceKind::Cpu }
fn default_batch_width() -> u32 { DEFAULT_BATCH_WIDTH }
fn default_report_interval() -> u64 { 3 }
fn default_power_watts() -> f64 { DEFAULT_POWER_WATTS }
fn default_log_level() -> LogLevel { LogLevel::Info }
