//! Flagpole Logging
//!
//! Installs a `tracing` subscriber for processes embedding Flagpole. The
//! library crates only emit `tracing` events; this crate decides where they
//! go and how they look.
//!
//! # Usage
//!
//! ```rust
//! // Reads FLAGPOLE_* variables and installs the global subscriber once.
//! let config = flagpole_log::init();
//! tracing::info!(level = %config.level, "Logging ready");
//! ```
//!
//! # Environment Variables
//!
//! - `FLAGPOLE_DEBUG=1` - Enable debug logging
//! - `FLAGPOLE_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `FLAGPOLE_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `FLAGPOLE_LOG_COLOR=1|0` - Enable/disable colors
//!
//! `RUST_LOG`, when set, takes precedence over the level.

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
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
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Single line
    Compact,
    /// JSON objects, one per line
    Json,
}

impl Format {
    /// Parse a format name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
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
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false, // JSON output doesn't use colors
            target: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| {
            lookup(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        };

        let debug = flag("FLAGPOLE_DEBUG").unwrap_or(false);

        let level = lookup("FLAGPOLE_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("FLAGPOLE_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = flag("FLAGPOLE_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let target = flag("FLAGPOLE_LOG_TARGET").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color,
            target,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_filter()))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer().with_target(self.target);
        match self.format {
            Format::Pretty => layer.pretty().with_ansi(self.color).boxed(),
            Format::Compact => layer.compact().with_ansi(self.color).boxed(),
            #[cfg(feature = "json")]
            Format::Json => layer.json().boxed(),
            #[cfg(not(feature = "json"))]
            Format::Json => layer.compact().with_ansi(false).boxed(),
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

static CONFIG: OnceCell<LogConfig> = OnceCell::new();

/// Initialize logging from the environment.
///
/// Only the first call installs a subscriber; later calls return the
/// configuration that won.
pub fn init() -> &'static LogConfig {
    init_with(LogConfig::from_env())
}

/// Initialize logging with an explicit configuration.
pub fn init_with(config: LogConfig) -> &'static LogConfig {
    CONFIG.get_or_init(|| {
        // Another subscriber may already be installed (tests, host application)
        let installed = tracing_subscriber::registry()
            .with(config.layer())
            .with(config.filter())
            .try_init()
            .is_ok();

        tracing::debug!(
            installed = installed,
            level = %config.level,
            format = ?config.format,
            "Flagpole logging initialized"
        );
        config
    })
}

/// Configuration installed by [`init`], if any.
pub fn config() -> Option<&'static LogConfig> {
    CONFIG.get()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("none"), Some(Level::Off));
        assert_eq!(Level::parse("loud"), None);
        assert_eq!(Level::Warn.to_string(), "warn");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("Compact"), Some(Format::Compact));
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_defaults_without_env() {
        let config = LogConfig::from_lookup(lookup(&[]));
        assert!(!config.debug);
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
        assert!(!config.color);
        assert!(config.target);
    }

    #[test]
    fn test_debug_flag_lowers_level() {
        let config = LogConfig::from_lookup(lookup(&[("FLAGPOLE_DEBUG", "true")]));
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);

        // An explicit level still wins
        let config = LogConfig::from_lookup(lookup(&[
            ("FLAGPOLE_DEBUG", "1"),
            ("FLAGPOLE_LOG_LEVEL", "warn"),
        ]));
        assert_eq!(config.level, Level::Warn);
    }

    #[test]
    fn test_color_detection() {
        let config = LogConfig::from_lookup(lookup(&[("TERM", "xterm")]));
        assert!(config.color);

        let config = LogConfig::from_lookup(lookup(&[("TERM", "xterm"), ("NO_COLOR", "1")]));
        assert!(!config.color);

        let config = LogConfig::from_lookup(lookup(&[("FLAGPOLE_LOG_COLOR", "0"), ("TERM", "xterm")]));
        assert!(!config.color);
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = init_with(LogConfig {
            level: Level::Warn,
            format: Format::Compact,
            ..LogConfig::default()
        });
        let second = init_with(LogConfig::default());
        assert!(std::ptr::eq(first, second));
        assert_eq!(config(), Some(first));
    }
}
