//! Structured logging utilities for hotbuild components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use hotbuild_config::{log_coord_info, log_cli_debug};
//!
//! log_coord_info!("Build slot acquired", pid = 1234);
//! log_cli_debug!("Parsed trigger", build = true);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const COORD: &'static str = "COORD";
    pub const LOCK: &'static str = "LOCK";
    pub const PIPELINE: &'static str = "PIPELINE";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === COORD logging macros ===

#[macro_export]
macro_rules! log_coord_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "COORD", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_coord_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "COORD", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_coord_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "COORD", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_coord_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "COORD", $($key = $value,)* $msg)
    };
}

// === LOCK logging macros ===

#[macro_export]
macro_rules! log_lock_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "LOCK", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_lock_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "LOCK", $($key = $value,)* $msg)
    };
}

// === PIPELINE logging macros ===

#[macro_export]
macro_rules! log_pipeline_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "PIPELINE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_pipeline_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "PIPELINE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_pipeline_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "PIPELINE", $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CLI", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `HOTBUILD_LOG` takes precedence, then `RUST_LOG`, then `level`.
/// Output goes to stderr so stdout stays free for command output.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("HOTBUILD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::COORD, "COORD");
        assert_eq!(Component::PIPELINE, "PIPELINE");
        assert_eq!(Component::CLI, "CLI");
    }

    #[test]
    fn test_level_filters() {
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(LogLevel::Warn);
        init_logging(LogLevel::Debug);
        log_coord_debug!("still alive", attempt = 2u32);
    }
}
