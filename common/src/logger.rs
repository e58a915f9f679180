use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::{Display, EnumString};
use thiserror::Error;

// Noisy dependencies are capped at warn
const QUIET_MODULES: [&str; 5] = ["tokio_tungstenite", "tungstenite", "hyper_util", "reqwest", "rustls"];

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Cannot open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("A logger is already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub fn default_log_filename() -> String {
    "nano-saturation.log".to_string()
}

pub fn default_logs_path() -> String {
    "logs/".to_string()
}

pub fn default_logs_datetime_format() -> String {
    "[%Y-%m-%d] (%H:%M:%S%.3f)".to_string()
}

#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Set log level
    #[cfg_attr(feature = "clap", clap(long, value_enum, default_value_t))]
    #[serde(default)]
    pub log_level: LogLevel,
    /// Set file log level
    /// By default, it will be the same as log level
    #[cfg_attr(feature = "clap", clap(long, value_enum))]
    #[serde(default)]
    pub file_log_level: Option<LogLevel>,
    /// Disable the log file
    #[cfg_attr(feature = "clap", clap(long))]
    #[serde(default)]
    pub disable_file_logging: bool,
    /// Disable the usage of colors in log
    #[cfg_attr(feature = "clap", clap(long))]
    #[serde(default)]
    pub disable_log_color: bool,
    /// Log filename
    ///
    /// File will be stored in logs directory, this is only the filename, not the full path.
    #[cfg_attr(feature = "clap", clap(long, default_value_t = default_log_filename()))]
    #[serde(default = "default_log_filename")]
    pub filename_log: String,
    /// Logs directory
    ///
    /// By default it will be logs/ of the current directory.
    #[cfg_attr(feature = "clap", clap(long, default_value_t = default_logs_path()))]
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    /// Change the datetime format used by the logger
    #[cfg_attr(feature = "clap", clap(long, default_value_t = default_logs_datetime_format()))]
    #[serde(default = "default_logs_datetime_format")]
    pub datetime_format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            file_log_level: None,
            disable_file_logging: false,
            disable_log_color: false,
            filename_log: default_log_filename(),
            logs_path: default_logs_path(),
            datetime_format: default_logs_datetime_format(),
        }
    }
}

/// Install the global logger: colored stdout output plus an optional file.
pub fn init_logger(config: &LogConfig) -> Result<(), LoggerError> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Magenta)
        .trace(Color::Cyan);

    let stdout_format = config.datetime_format.clone();
    let use_colors = !config.disable_log_color;
    let stdout = fern::Dispatch::new()
        .level(config.log_level.into())
        .format(move |out, message, record| {
            let time = chrono::Local::now().format(&stdout_format);
            if use_colors {
                out.finish(format_args!(
                    "{} {:>5} [{}] {}",
                    time,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{} {:>5} [{}] {}",
                    time,
                    record.level(),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new().chain(stdout);
    for module in QUIET_MODULES {
        dispatch = dispatch.level_for(module, LevelFilter::Warn);
    }

    if !config.disable_file_logging {
        std::fs::create_dir_all(&config.logs_path)?;
        let path = Path::new(&config.logs_path).join(&config.filename_log);
        let file_format = config.datetime_format.clone();
        let file = fern::Dispatch::new()
            .level(config.file_log_level.unwrap_or(config.log_level).into())
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "{} {:>5} [{}] {}",
                    chrono::Local::now().format(&file_format),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(fern::log_file(path)?);
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}
