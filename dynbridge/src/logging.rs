//! Log setup for the command-line tool.
//!
//! `--log-level` / `--log-format` win over `DYNBRIDGE_LOG_LEVEL` /
//! `DYNBRIDGE_LOG_FORMAT`. Events go to stderr so stdout stays the report.

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FORMAT_ENV: &str = "DYNBRIDGE_LOG_FORMAT";
pub const LOG_LEVEL_ENV: &str = "DYNBRIDGE_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Logging flags as given on the command line; `None` means not given.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub format: Option<LogFormat>,
    pub level: Option<LogLevel>,
}

impl LogSettings {
    /// Fills unset flags from `lookup`, then from the defaults.
    /// Unparseable values are ignored.
    pub fn resolve(self, lookup: impl Fn(&str) -> Option<String>) -> (LogFormat, LogLevel) {
        let format = self
            .format
            .or_else(|| lookup(LOG_FORMAT_ENV).as_deref().and_then(LogFormat::parse))
            .unwrap_or_default();
        let level = self
            .level
            .or_else(|| lookup(LOG_LEVEL_ENV).as_deref().and_then(LogLevel::parse))
            .unwrap_or_default();
        (format, level)
    }
}

/// Installs the process-wide subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(settings: LogSettings) -> Result<(), SetGlobalDefaultError> {
    let (format, level) = settings.resolve(|key| std::env::var(key).ok());
    let filter =
        EnvFilter::default().add_directive(LevelFilter::from_level(level.as_tracing_level()).into());
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Text => tracing::subscriber::set_global_default(builder.compact().finish()),
    }
}
