//! Structured logging for Stowage.
//!
//! Wraps `tracing-subscriber` with a small configuration type so binaries and
//! test suites set up logging the same way.
//!
//! # Example
//!
//! ```no_run
//! use stowage_observability::{init_tracing, LogFormat};
//!
//! init_tracing(LogFormat::Compact, Some("debug")).unwrap();
//! tracing::info!(container = "media", "Uploading");
//! ```
//!
//! The level is taken from, in order: the explicit level, `STOWAGE_LOG`,
//! `RUST_LOG`, and finally `info`.

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput, LEVEL_ENV, RUST_LOG_ENV};
pub use initialization::{init_tracing, init_tracing_with_config, try_init_tracing};

// Re-export tracing macros so callers need a single dependency
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level};
