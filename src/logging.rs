//! Log output for the bot and dashboard processes.
//!
//! Each long-running service writes its own rotating JSON file under the
//! configured logs directory, mirrored to stderr in compact form. One-shot
//! CLI commands only print to stderr. `RUST_LOG` overrides the default
//! directives everywhere.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is unset. Database and HTTP internals
/// are kept to warnings so task events stay readable.
pub const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,hyper=warn,reqwest=warn";

/// Days of rotated files kept per service.
pub const LOG_RETENTION_DAYS: usize = 14;

/// A long-running process with its own log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Telegram polling and reminders.
    Bot,
    /// The read-only web dashboard.
    Dashboard,
}

impl Service {
    /// File name prefix, e.g. `taskdesk-bot.2026-01-15.log`.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Service::Bot => "taskdesk-bot",
            Service::Dashboard => "taskdesk-dashboard",
        }
    }
}

/// Flushes the service log file when dropped. Hold it for the life of
/// the process.
pub struct LoggingGuard {
    _flush: WorkerGuard,
}

fn directives() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

fn service_appender(service: Service, logs_dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("cannot create logs directory {}", logs_dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(service.file_prefix())
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION_DAYS)
        .build(logs_dir)
        .with_context(|| format!("cannot open log file in {}", logs_dir.display()))
}

/// Start logging for a service.
///
/// # Errors
///
/// Fails when the logs directory cannot be created or written, or when a
/// global subscriber is already installed.
pub fn init_service(service: Service, logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    let (writer, flush) = tracing_appender::non_blocking(service_appender(service, logs_dir)?);

    tracing_subscriber::registry()
        .with(directives())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(writer),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("a log subscriber is already installed")?;

    tracing::info!(service = service.file_prefix(), dir = %logs_dir.display(), "logging started");
    Ok(LoggingGuard { _flush: flush })
}

/// Stderr logging for one-shot commands. Later calls do nothing.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_env_filter(directives())
        .with_writer(std::io::stderr)
        .try_init();
}
