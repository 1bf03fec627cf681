#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Logging primitives for the pebbles command-line client.
//!
//! The CLI writes everything user-facing to stdout/stderr directly; this crate only
//! owns the diagnostic `tracing` pipeline so that debug output stays on stderr and
//! never mixes with command output.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level used when neither the filter variable nor debug mode is set.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Log level used when the client runs in debug mode.
pub const DEBUG_LOG_LEVEL: &str = "debug";

/// Environment variable holding an explicit `tracing` filter directive.
pub const LOG_FILTER_ENV: &str = "PEBBLES_LOG";

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for example,
/// because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_env_filter(config.level);
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()
            .map_err(|err| anyhow!("failed to install tracing subscriber: {err}")),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time(),
            )
            .try_init()
            .map_err(|err| anyhow!("failed to install tracing subscriber: {err}")),
    };
    installed?;
    tracing::debug!(trace_id = config.trace_id, "logging initialised");
    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Fallback level directive (e.g. `warn`, `debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
    /// Per-process identifier, also sent to the API as a request id.
    pub trace_id: &'a str,
}

impl<'a> LoggingConfig<'a> {
    /// Build the configuration for a CLI invocation.
    #[must_use]
    pub const fn for_cli(debug: bool, trace_id: &'a str) -> Self {
        Self {
            level: if debug {
                DEBUG_LOG_LEVEL
            } else {
                DEFAULT_LOG_LEVEL
            },
            format: LogFormat::Compact,
            trace_id,
        }
    }

    /// Replace the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::Compact,
            trace_id: "unset",
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit terse single-line logs.
    Compact,
}

impl LogFormat {
    /// Parse a format name, falling back to `Compact` for anything unrecognised.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_config_selects_level_from_debug_flag() {
        let quiet = LoggingConfig::for_cli(false, "trace-1");
        assert_eq!(quiet.level, DEFAULT_LOG_LEVEL);
        assert_eq!(quiet.format, LogFormat::Compact);

        let verbose = LoggingConfig::for_cli(true, "trace-1").with_format(LogFormat::Json);
        assert_eq!(verbose.format, LogFormat::Json);
        assert_eq!(verbose.level, DEBUG_LOG_LEVEL);
        assert_eq!(verbose.trace_id, "trace-1");
    }

    #[test]
    fn log_format_parses_names() {
        assert_eq!(LogFormat::from_name("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_name("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from_name("other"), LogFormat::Compact);
    }

    #[test]
    fn init_logging_installs_subscriber_once() {
        let config = LoggingConfig::for_cli(false, "trace-test");
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
