//! Logging configuration.
//!
//! The crate emits `tracing` events at every authorization and payment
//! decision point; this module installs a `tracing-subscriber` pipeline for
//! applications that do not bring their own.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{TxGuardError, TxGuardResult};

/// Subscriber settings for applications embedding the guard.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to this crate's events when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Print the event target.
    pub include_target: bool,
    /// Print source file and line.
    pub include_file_line: bool,
}

/// Verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Every poll iteration and header decision.
    Trace,
    /// Transaction lifecycle and completion delivery.
    Debug,
    /// Authorized calls and payments.
    Info,
    /// Denials, fail-open passthroughs, dropped reports.
    Warn,
    /// Fail-closed gateway outages.
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = TxGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(TxGuardError::configuration(format!(
                "Unknown log level: {}",
                other
            ))),
        }
    }
}

/// Output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored.
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single line per event.
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = TxGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(TxGuardError::configuration(format!(
                "Unknown log format: {}",
                other
            ))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            include_target: true,
            include_file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Default settings: `info`, pretty output.
    ///
    /// ```
    /// use txguard_client::observability::{LogFormat, LogLevel, LoggingConfig};
    ///
    /// let config = LoggingConfig::new();
    /// assert_eq!(config.level, LogLevel::Info);
    /// assert_eq!(config.format, LogFormat::Pretty);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `TXGUARD_LOG_LEVEL` and `TXGUARD_LOG_FORMAT`, keeping defaults
    /// for unset variables.
    pub fn from_env() -> TxGuardResult<Self> {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("TXGUARD_LOG_LEVEL") {
            config.level = level.parse()?;
        }
        if let Ok(format) = std::env::var("TXGUARD_LOG_FORMAT") {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    /// Sets the level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggles the event target.
    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    /// Toggles source file and line.
    pub fn with_file_line(mut self, include: bool) -> Self {
        self.include_file_line = include;
        self
    }

    /// Filter directive used when `RUST_LOG` is unset. Only this crate's
    /// events pass; everything else is held at `warn`.
    pub fn default_directive(&self) -> String {
        format!("warn,txguard_client={}", self.level.as_str())
    }

    /// Installs a global subscriber.
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber is already installed or `RUST_LOG` does
    /// not parse.
    ///
    /// ```no_run
    /// use txguard_client::observability::{LogFormat, LoggingConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// LoggingConfig::new().with_format(LogFormat::Json).init()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn init(self) -> TxGuardResult<()> {
        let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) => EnvFilter::try_new(directives),
            Err(_) => EnvFilter::try_new(self.default_directive()),
        }
        .map_err(|e| TxGuardError::configuration(format!("Invalid log filter: {}", e)))?;

        let registry = tracing_subscriber::registry().with(filter);
        let result = match self.format {
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(self.include_target)
                        .with_file(self.include_file_line)
                        .with_line_number(self.include_file_line),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(self.include_target),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_target(self.include_target))
                .try_init(),
        };

        result.map_err(|e| {
            TxGuardError::configuration(format!("Failed to initialize logging: {}", e))
        })
    }
}
