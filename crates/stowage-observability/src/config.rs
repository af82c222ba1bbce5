//! Logging configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Variable consulted first for the log filter
pub const LEVEL_ENV: &str = "STOWAGE_LOG";

/// Fallback variable for the log filter
pub const RUST_LOG_ENV: &str = "RUST_LOG";

const DEFAULT_LEVEL: &str = "info";

/// Errors raised while setting up logging
#[derive(Error, Debug)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// The output format name is unknown
    #[error("Unknown log format \"{0}\", expected one of: pretty, compact, json")]
    UnknownFormat(String),

    /// A global subscriber is already installed
    #[error("Tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LogError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Where log lines are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    /// Standard error
    #[default]
    Stderr,
    /// Standard output
    Stdout,
    /// The libtest capture, so output only shows for failing tests
    Test,
}

/// Logging configuration, built with the `with_*` methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Line format
    pub format: LogFormat,
    /// Explicit filter directive; overrides the environment when set
    pub level: Option<String>,
    /// Emit ANSI colors
    pub use_color: bool,
    /// Prefix events with a timestamp
    pub use_timestamps: bool,
    /// Include the event target (module path)
    pub include_targets: bool,
    /// Log span closings with their duration
    pub span_timings: bool,
    /// Destination
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: None,
            use_color: true,
            use_timestamps: true,
            include_targets: true,
            span_timings: false,
            output: LogOutput::default(),
        }
    }
}

impl LogConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration suited to test binaries: compact, uncolored, captured
    pub fn for_tests(level: impl Into<String>) -> Self {
        Self::new()
            .with_format(LogFormat::Compact)
            .with_level(level)
            .with_color(false)
            .with_timestamps(false)
            .with_output(LogOutput::Test)
    }

    /// Set the line format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set an explicit filter directive such as `debug` or `stowage_storage=trace`
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Enable or disable timestamps
    pub fn with_timestamps(mut self, use_timestamps: bool) -> Self {
        self.use_timestamps = use_timestamps;
        self
    }

    /// Enable or disable event targets
    pub fn with_targets(mut self, include_targets: bool) -> Self {
        self.include_targets = include_targets;
        self
    }

    /// Log span closings with their duration
    pub fn with_span_timings(mut self, span_timings: bool) -> Self {
        self.span_timings = span_timings;
        self
    }

    /// Set the destination
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Filter directive actually applied
    ///
    /// Explicit level, then `STOWAGE_LOG`, then `RUST_LOG`, then `info`.
    /// Empty values are skipped.
    pub fn effective_level(&self) -> String {
        self.effective_level_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn effective_level_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.level
            .clone()
            .into_iter()
            .chain([LEVEL_ENV, RUST_LOG_ENV].into_iter().filter_map(&lookup))
            .find(|level| !level.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
    }
}
