//! Logging setup for applications using the SDK
//!
//! The library itself only emits `tracing` events. Applications that want
//! to see them call one of the init functions here once at startup.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// How, if at all, the SDK's tracing events are written out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    Silent,
    /// Compact stderr lines, `info` by default
    Development,
    /// Multi-line output with thread and source location, `debug` by default
    Debug,
    /// One JSON object per event, `info` by default
    Json,
}

impl LoggingMode {
    fn default_level(self) -> &'static str {
        match self {
            LoggingMode::Debug => "debug",
            _ => "info",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Install a global subscriber for `mode`
///
/// Fails if a global subscriber is already installed.
///
/// ```rust,ignore
/// ble_state::logging::init_logging(LoggingMode::Development)?;
/// ```
///
/// Filter directives come from `BLE_LOG_LEVEL` (e.g.
/// `ble_state=debug,event_bus=trace`), then `RUST_LOG`.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let layer = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .compact()
            .boxed(),
        LoggingMode::Debug => fmt::layer()
            .pretty()
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LoggingMode::Json => fmt::layer().json().with_current_span(false).boxed(),
    };

    Registry::default()
        .with(layer.with_filter(env_filter(mode.default_level())))
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// `init_logging` with the mode named by `BLE_LOG_MODE`
///
/// Unset or unknown values mean `Silent`.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(mode_from_str(std::env::var("BLE_LOG_MODE").ok().as_deref()))
}

fn mode_from_str(value: Option<&str>) -> LoggingMode {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("development" | "dev") => LoggingMode::Development,
        Some("debug") => LoggingMode::Debug,
        Some("json") => LoggingMode::Json,
        _ => LoggingMode::Silent,
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    ["BLE_LOG_LEVEL", "RUST_LOG"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
