//! pg-sandbox Logging System
//!
//! Structured logging for sandbox lifecycle events (container start,
//! readiness probes, database create/drop, schema loads). Uses the tracing
//! crate; test suites usually call [`init_test_logging`] once.

use std::io;
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Enable colored output
    pub color: bool,
    /// Show timestamps
    pub show_timestamps: bool,
    /// Show target/module name
    pub show_target: bool,
    /// Enable JSON format for machine parsing
    pub json_format: bool,
    /// Emit span close events (shows how long each lifecycle step took)
    pub enable_spans: bool,
    /// Write to this file instead of the test writer
    pub file_output: Option<std::path::PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            color: false,
            show_timestamps: true,
            show_target: false,
            json_format: false,
            enable_spans: false,
            file_output: None,
        }
    }
}

impl LoggingConfig {
    pub fn for_mode(mode: HarnessMode) -> Self {
        match mode {
            HarnessMode::Local => Self {
                level: Level::INFO,
                color: true,
                show_timestamps: false,
                show_target: false,
                json_format: false,
                enable_spans: false,
                file_output: None,
            },
            HarnessMode::Ci => Self {
                level: Level::DEBUG,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: true, // CI log collectors parse JSON lines
                enable_spans: true,
                file_output: None,
            },
        }
    }

    /// Read `PG_SANDBOX_LOG_*` variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mode = if lookup("CI").is_some() {
            HarnessMode::Ci
        } else {
            HarnessMode::Local
        };
        let mut config = Self::for_mode(mode);

        config.level = match lookup("PG_SANDBOX_LOG_LEVEL").as_deref() {
            Some("error") => Level::ERROR,
            Some("warn") => Level::WARN,
            Some("info") => Level::INFO,
            Some("debug") => Level::DEBUG,
            Some("trace") => Level::TRACE,
            _ => config.level,
        };
        if let Some(json) = lookup("PG_SANDBOX_LOG_JSON") {
            config.json_format = json == "true";
        }
        if let Some(file) = lookup("PG_SANDBOX_LOG_FILE") {
            config.file_output = Some(file.into());
        }
        config
    }
}

/// Where the harness is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessMode {
    /// Developer machine - readable, colored output
    Local,
    /// CI runner - verbose, machine-readable
    Ci,
}

/// Initialize the logging system.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pg_sandbox={}", config.level)));

    let registry = Registry::default().with(env_filter);

    let result = if let Some(log_file) = config.file_output {
        let file_appender = tracing_appender::rolling::never(
            log_file.parent().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file path")
            })?,
            log_file.file_name().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name")
            })?,
        );

        if config.json_format {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(config.enable_spans)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
        } else {
            fmt::layer()
                .with_target(config.show_target)
                .with_level(true)
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
        }
    } else if config.json_format {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .with_subscriber(registry)
            .try_init()
    } else {
        let span_events = if config.enable_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color)
            .with_span_events(span_events)
            .with_test_writer();

        if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .try_init()
        } else {
            fmt_layer.without_time().with_subscriber(registry).try_init()
        }
    };

    result.map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))
}

/// Initialize logging from environment variables
pub fn init_from_env() -> io::Result<()> {
    init_logging(LoggingConfig::from_env())
}

/// Install logging for a test binary. Safe to call from every test; only
/// the first call has an effect.
pub fn init_test_logging() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        if let Err(e) = init_from_env() {
            // Another subscriber won the race; keep it.
            tracing::debug!("Logging already initialized: {}", e);
        }
    });
}

/// Log a lifecycle step for one sandbox database
#[macro_export]
macro_rules! log_sandbox_operation {
    ($operation:expr, $database:expr) => {
        tracing::info!(
            operation = $operation,
            database = %$database,
            "Sandbox operation"
        );
    };
    ($operation:expr, $database:expr, $details:expr) => {
        tracing::info!(
            operation = $operation,
            database = %$database,
            details = %$details,
            "Sandbox operation"
        );
    };
}
