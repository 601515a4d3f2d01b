use std::result::Result;

use snafu::ResultExt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{registry, EnvFilter};

use crate::config::Config;
use crate::error::{InitializeLoggerSnafu, LauncherError};

/// Wires the console and optional file layers into the global subscriber.
///
/// Operator output owns stdout, so diagnostics go to stderr. The returned
/// guard owns the file writer's background thread; `main` holds it until
/// exit so the last events are flushed.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>, LauncherError> {
    let filter = EnvFilter::try_from_env("HELIOCAST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "heliocast.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = layer().with_ansi(false).json().with_writer(non_blocking);

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = layer().with_target(false).with_writer(std::io::stderr);

    let subscriber = registry().with(filter).with(console_layer).with(file_layer);
    tracing::subscriber::set_global_default(subscriber).context(InitializeLoggerSnafu)?;

    Ok(guard)
}
