//! Tracing setup for the engine.
//!
//! Events go to systemd's journal on Linux when it is reachable, otherwise
//! to a daily rolling `memories.log`. The filter targets the crate's own
//! modules (`memories::days`, `memories::selection`, ...) and keeps
//! dependencies at `warn`.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Overrides the configured filter, e.g. `MEMORIES_LOG=memories::selection=debug`.
pub const LOG_ENV: &str = "MEMORIES_LOG";

const CRATE_TARGET: &str = "memories";

/// Filter directives derived from the logging config.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = vec!["warn".to_string(), format!("{}={}", CRATE_TARGET, config.level)];
    directives.extend(config.directives.iter().map(|d| d.trim().to_string()).filter(|d| !d.is_empty()));
    directives.join(",")
}

pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(filter_directives(config)))?;

    #[cfg(target_os = "linux")]
    {
        if config.journald {
            if let Ok(journald_layer) = tracing_journald::layer() {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(journald_layer.with_syslog_identifier(CRATE_TARGET.to_string()))
                    .try_init()?;

                tracing::info!(backend = "journald", "Engine logging ready");
                return Ok(());
            }
        }
    }

    let log_dir = config.log_dir.clone().unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "memories.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer flushes on drop; keep the guard for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::info!(backend = "file", dir = %log_dir.display(), "Engine logging ready");
    Ok(())
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memories")
        .join("logs")
}
