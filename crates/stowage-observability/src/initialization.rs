//! Subscriber installation.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{MakeWriter, TestWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type FormatLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync + 'static>;

/// Install a global subscriber with the given format
///
/// `level` is a filter directive; when `None` the environment decides
/// (see [`LogConfig::effective_level`]).
///
/// # Example
///
/// ```no_run
/// use stowage_observability::{init_tracing, LogFormat};
///
/// init_tracing(LogFormat::Json, None).unwrap();
/// ```
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let config = LogConfig::new().with_format(format);
    let config = match level {
        Some(level) => config.with_level(level),
        None => config,
    };
    init_tracing_with_config(&config)
}

/// Install a global subscriber built from `config`
///
/// Fails with [`LogError::AlreadyInitialized`] when another subscriber is
/// already installed.
pub fn init_tracing_with_config(config: &LogConfig) -> Result<(), LogError> {
    let filter = build_env_filter(config)?;
    let layer = match config.output {
        LogOutput::Stderr => format_layer(config, std::io::stderr),
        LogOutput::Stdout => format_layer(config, std::io::stdout),
        LogOutput::Test => format_layer(config, TestWriter::new()),
    };

    Registry::default()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}

/// Install a compact, uncolored subscriber writing to the test capture
///
/// Returns `false` when nothing was installed, typically because an earlier
/// test in the same binary already did. Safe to call from every test.
pub fn try_init_tracing(level: &str) -> bool {
    init_tracing_with_config(&LogConfig::for_tests(level)).is_ok()
}

fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let level = config.effective_level();
    EnvFilter::try_new(&level).map_err(|e| LogError::InvalidLogLevel(format!("{}: {}", level, e)))
}

fn format_layer<W>(config: &LogConfig, writer: W) -> FormatLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.use_color)
        .with_target(config.include_targets)
        .with_span_events(span_events);

    match (config.format, config.use_timestamps) {
        (LogFormat::Pretty, true) => base.pretty().boxed(),
        (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Json, true) => base.json().with_current_span(true).boxed(),
        (LogFormat::Json, false) => base.json().with_current_span(true).without_time().boxed(),
    }
}
