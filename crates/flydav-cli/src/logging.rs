//! Tracing subscriber setup.

use std::io::{self, IsTerminal};
use std::path::Path;

use anyhow::{Context, Result};
use flydav_webdav::{LogFormat, LogSection};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for the given flags, falling back to the config level.
pub fn filter_directive(verbose: u8, quiet: bool, configured: &str) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `-v`/`-q`, which take precedence over
/// `[log] level`. The returned guard flushes the file writer on drop and
/// must live as long as the process logs.
pub fn setup_tracing(verbose: u8, quiet: bool, log: &LogSection) -> Result<Option<WorkerGuard>> {
    let directive = filter_directive(verbose, quiet, &log.level);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid log level: {directive}"))?,
    };

    let (writer, guard, ansi) = match &log.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Log file has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(io::stderr), None, io::stderr().is_terminal()),
    };

    let fmt_layer = match log.format {
        LogFormat::Text => fmt::layer().with_writer(writer).with_ansi(ansi).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    };

    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(filter));

    #[cfg(feature = "tokio-console")]
    let registry = registry.with(
        console_subscriber::ConsoleLayer::builder()
            .with_default_env()
            .spawn(),
    );

    registry
        .try_init()
        .context("Failed to install tracing subscriber")?;

    #[cfg(feature = "tokio-console")]
    tracing::info!("tokio-console enabled, connect with: tokio-console");

    Ok(guard)
}
