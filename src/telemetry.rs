use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Install the global subscriber, logging to a daily file under `dir`.
///
/// Stdout is left to command output. `RUST_LOG` overrides the configured
/// level. Keep the returned guard alive until exit so buffered lines flush.
pub fn init(log: &LogConfig, dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "storefront-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let env_filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&log.level))
    .map_err(|e| eyre!("Invalid log level {}: {}", log.level, e))?;

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
