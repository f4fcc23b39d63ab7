//! Rivulet Logging
//!
//! Structured logging for the Rivulet messaging framework, built on `tracing`.
//!
//! Two concerns live here:
//!
//! - **Process logging**: [`LogConfig`] reads `RIVULET_*` environment
//!   variables and installs a `tracing-subscriber` registry in the
//!   configured [`Format`].
//! - **Broker logging**: [`LoggerState`] is the logger collaborator a broker
//!   shares with its subscribers. Subscribers register their log context in
//!   the [`ParamsStorage`] once before start, and every event is emitted
//!   through a [`BrokerLogger`].
//!
//! # Usage
//!
//! ```rust
//! use rivulet_log::{info, LogConfig, LogContext, Level, LoggerState};
//!
//! let _installed = LogConfig::default().init();
//! info!("broker module loaded");
//!
//! let state = LoggerState::default();
//! let context = LogContext::new().with("subject", "orders.created");
//! state.params().register_subscriber(&context);
//! state.log(Level::Info, "`on_order` waiting for messages", &context);
//! ```
//!
//! # Environment Variables
//!
//! - `RIVULET_DEBUG=1` - Enable debug logging
//! - `RIVULET_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `RIVULET_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `RIVULET_LOG_COLOR=1|0` - Enable/disable colors

mod context;
mod logger;

pub use context::LogContext;
pub use logger::{BrokerLogger, LoggerState, NullLogger, ParamsStorage, TracingLogger};

pub use tracing::{debug, error, info, trace, warn};

use once_cell::sync::Lazy;
use std::env;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level for Rivulet logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Directive string understood by `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }

    /// Convert to a `tracing` level. `Off` has no counterpart.
    pub fn to_tracing_level(&self) -> Option<tracing::Level> {
        match self {
            Level::Trace => Some(tracing::Level::TRACE),
            Level::Debug => Some(tracing::Level::DEBUG),
            Level::Info => Some(tracing::Level::INFO),
            Level::Warn => Some(tracing::Level::WARN),
            Level::Error => Some(tracing::Level::ERROR),
            Level::Off => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Global Configuration
// ============================================================================

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            module_path: true,
        }
    }
}

impl LogConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let debug = env_flag("RIVULET_DEBUG").unwrap_or(false);

        let level = env::var("RIVULET_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("RIVULET_LOG_FORMAT")
            .ok()
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = env_flag("RIVULET_LOG_COLOR")
            .unwrap_or_else(|| env::var("NO_COLOR").is_err() && env::var("TERM").is_ok());

        let module_path = env_flag("RIVULET_LOG_MODULE").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color,
            module_path,
        }
    }

    /// Set the minimum level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable colored output.
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Install a global `tracing` subscriber for this configuration.
    ///
    /// `RUST_LOG` takes precedence over the configured level when set.
    /// Returns `false` if a global subscriber was already installed.
    pub fn init(&self) -> bool {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_filter()));

        let layer = match self.format {
            Format::Pretty => fmt::layer()
                .pretty()
                .with_ansi(self.color)
                .with_target(self.module_path)
                .boxed(),
            Format::Compact => fmt::layer()
                .compact()
                .with_ansi(self.color)
                .with_target(self.module_path)
                .boxed(),
            #[cfg(feature = "json")]
            Format::Json => fmt::layer()
                .json()
                .with_target(self.module_path)
                .boxed(),
            #[cfg(not(feature = "json"))]
            Format::Json => fmt::layer()
                .with_ansi(false)
                .with_target(self.module_path)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_ok()
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Install the global subscriber from the environment configuration.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() -> bool {
    CONFIG.init()
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("none"), Some(Level::Off));
        assert_eq!(Level::parse("invalid"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("Compact"), Some(Format::Compact));
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_tracing_level_mapping() {
        assert_eq!(Level::Warn.to_tracing_level(), Some(tracing::Level::WARN));
        assert_eq!(Level::Off.to_tracing_level(), None);
        assert_eq!(Level::Error.as_filter(), "error");
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .level(Level::Debug)
            .format(Format::Compact)
            .color(false);

        assert_eq!(config.level, Level::Debug);
        assert_eq!(config.format, Format::Compact);
        assert!(!config.color);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::new().format(Format::Compact);
        let _ = config.init();
        assert!(!config.init());
    }
}
