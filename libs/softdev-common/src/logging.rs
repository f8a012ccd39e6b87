//! Logging setup for softdev binaries
//!
//! Console output uses a compact `timestamp [LEVEL] message fields` format,
//! or JSON lines. An optional daily log file gets the same events. The
//! filter honours `RUST_LOG` and can be replaced at runtime.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging section of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `info,softdev_ioc=debug`
    pub level: String,
    /// Emit JSON lines instead of the bracketed text format
    pub json: bool,
    /// Directory for daily log files; console only when unset
    pub dir: Option<PathBuf>,
    /// File name prefix for daily log files
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
            file_prefix: "softdev".to_string(),
        }
    }
}

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// `2026-03-02T10:15:01.123456Z [INFO] Model started device=SIM1`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();
static CURRENT_FILTER: OnceLock<Mutex<String>> = OnceLock::new();
// Dropping the guard would stop the background file writer
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Filter string in effect at startup: `RUST_LOG` wins over the config
fn initial_filter(config: &LogConfig) -> String {
    match std::env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => config.level.clone(),
    }
}

/// Install the global subscriber
///
/// Fails if the filter does not parse or a subscriber is already set.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter_text = initial_filter(config);
    let filter = EnvFilter::try_new(&filter_text)
        .map_err(|e| CommonError::logging(format!("invalid filter '{}': {}", filter_text, e)))?;
    let (filter_layer, handle) = reload::Layer::new(filter);

    let console = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_ansi(true)
            .event_format(BracketedLevelFormat)
            .boxed()
    };

    let file = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", config.file_prefix));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let layer = if config.json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed()
            };
            Some(layer)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| CommonError::logging(e.to_string()))?;

    let _ = FILTER_HANDLE.set(handle);
    let _ = CURRENT_FILTER.set(Mutex::new(filter_text.clone()));
    tracing::debug!(filter = %filter_text, dir = ?config.dir, "Logging initialized");
    Ok(())
}

/// Replace the active filter, e.g. `debug` or `info,softdev_ioc=trace`
pub fn set_log_level(level: &str) -> Result<()> {
    let handle = FILTER_HANDLE
        .get()
        .ok_or_else(|| CommonError::logging("logging not initialized"))?;
    let filter = EnvFilter::try_new(level)
        .map_err(|e| CommonError::logging(format!("invalid filter '{}': {}", level, e)))?;
    handle
        .reload(filter)
        .map_err(|e| CommonError::logging(e.to_string()))?;

    if let Some(current) = CURRENT_FILTER.get() {
        match current.lock() {
            Ok(mut guard) => *guard = level.to_string(),
            Err(poisoned) => *poisoned.into_inner() = level.to_string(),
        }
    }
    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

/// Active filter string, `None` before [`init`]
pub fn get_log_level() -> Option<String> {
    CURRENT_FILTER
        .get()
        .and_then(|m| m.lock().ok().map(|guard| guard.clone()))
}
