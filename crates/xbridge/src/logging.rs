//! Tracing setup.
//!
//! Console output always; when [`LogConfig::error_log`] is set, WARN and
//! above are also appended to that file without ANSI colors.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::{BridgeError, LogConfig};

/// First line of a freshly created error log.
pub const ERROR_LOG_HEADER: &str =
    "xbridge error log. Attach this file when reporting a problem.\n----------------------------------------\n";

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<(), BridgeError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let error_layer = match &config.error_log {
        Some(path) => Some(error_file_layer(open_error_log(path)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(error_layer)
        .try_init()
        .map_err(|e| BridgeError::Logging(e.to_string()))
}

/// Opens `path` for appending, writing [`ERROR_LOG_HEADER`] first if the
/// file is new or empty.
pub fn open_error_log(path: &Path) -> std::io::Result<File> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        file.write_all(ERROR_LOG_HEADER.as_bytes())?;
    }
    Ok(file)
}

/// A `fmt` layer that writes WARN and above to `file`.
pub fn error_file_layer<S>(file: File) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::WARN)
}
