//! Logging setup on tracing + tracing-subscriber
//!
//! Console events go to stderr so `supreme-chat chat` owns stdout, colored
//! only when stderr is a terminal. An
//! optional rolling file receives the same events with thread ids attached.
//! `RUST_LOG` still wins over the configured level for ad hoc filtering.

use std::fs;
use std::io::IsTerminal;
use std::path::Path;

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Dependencies that are chatty at info level
const NOISY_TARGETS: &[&str] = &["hyper", "reqwest", "rustls", "tokio_tungstenite", "tungstenite"];

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Keeps the non-blocking file writer alive; drop it last.
pub struct LogGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Where a layer writes, which decides its formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Console,
    File,
}

/// Install the global subscriber for this process
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let level = effective_level(settings, verbose, quiet);

    let mut file_guard = None;
    let file_layer = match settings.file.as_deref() {
        Some(path) => {
            let (writer, guard) = file_writer(path, rotation(&settings.rotation), settings.max_files)?;
            file_guard = Some(guard);
            Some(event_layer(writer, Sink::File, settings.json_format))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(level)?)
        .with(event_layer(std::io::stderr, Sink::Console, settings.json_format))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(%level, file = ?settings.file, json = settings.json_format, "Logging initialized");

    Ok(LogGuards {
        _file_guard: file_guard,
    })
}

/// `--quiet` beats `-v`; otherwise each `-v` lowers the floor one step
fn effective_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => settings.level.parse().unwrap_or(Level::INFO),
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

fn rotation(name: &str) -> Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn directive(text: &str) -> Result<Directive> {
    text.parse()
        .map_err(|e| Error::Internal(format!("Invalid log directive '{}': {}", text, e)))
}

fn env_filter(level: Level) -> Result<EnvFilter> {
    let base = level.to_string().to_lowercase();

    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&base))
        .add_directive(directive(&format!("supreme_chat={}", base))?);

    if level < Level::TRACE {
        for target in NOISY_TARGETS {
            filter = filter.add_directive(directive(&format!("{}=warn", target))?);
        }
    }

    Ok(filter)
}

/// Formatting layer for one sink
fn event_layer<S, W>(writer: W, sink: Sink, json: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let to_file = sink == Sink::File;

    if json {
        return Box::new(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(to_file)
                .with_current_span(true)
                .with_span_events(FmtSpan::CLOSE),
        );
    }

    match sink {
        Sink::Console => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal())
                .compact(),
        ),
        Sink::File => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false),
        ),
    }
}

/// Rolling appender named after the configured file's stem
fn file_writer(
    log_file: &str,
    rotation: Rotation,
    max_files: u32,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let path = Path::new(log_file);
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    fs::create_dir_all(directory).map_err(|e| Error::IoWrite {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let prefix = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("supreme-chat");

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files.max(1) as usize)
        .build(directory)
        .map_err(|e| Error::Internal(format!("Failed to create log file appender: {}", e)))?;

    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(level: &str) -> LoggingSettings {
        LoggingSettings {
            level: level.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_flags_override_configured_level() {
        let info = settings("info");
        assert_eq!(effective_level(&info, 0, true), Level::ERROR);
        assert_eq!(effective_level(&info, 3, true), Level::ERROR);
        assert_eq!(effective_level(&info, 0, false), Level::INFO);
        assert_eq!(effective_level(&info, 1, false), Level::DEBUG);
        assert_eq!(effective_level(&info, 2, false), Level::TRACE);
    }

    #[test]
    fn test_configured_level_is_case_insensitive() {
        assert_eq!(effective_level(&settings("WARN"), 0, false), Level::WARN);
        assert_eq!(effective_level(&settings("trace"), 0, false), Level::TRACE);
        assert_eq!(effective_level(&settings("bogus"), 0, false), Level::INFO);
    }

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("hourly"), Rotation::HOURLY);
        assert_eq!(rotation("NEVER"), Rotation::NEVER);
        assert_eq!(rotation("daily"), Rotation::DAILY);
        assert_eq!(rotation("fortnightly"), Rotation::DAILY);
    }

    #[test]
    fn test_env_filter_builds_at_every_level() {
        for level in [Level::ERROR, Level::INFO, Level::TRACE] {
            assert!(env_filter(level).is_ok());
        }
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("chat.log");

        let result = file_writer(&log_path.to_string_lossy(), Rotation::NEVER, 3);

        assert!(result.is_ok());
        assert!(temp_dir.path().join("logs").is_dir());
    }
}
