//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` registry from a [`LoggingConfig`]:
//! console and/or file output, plain or JSON lines. `RUST_LOG`, when set,
//! takes precedence over the configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer<W>(writer: W, json: bool) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    if json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_writer(writer).boxed()
    }
}

/// Install the global subscriber described by `config`.
///
/// Returns `Ok(false)` if a global subscriber was already installed, which
/// lets tests and embedding applications call this unconditionally.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.log_to_console {
        layers.push(output_layer(std::io::stdout, config.json_format));
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be set to log to a file".to_string())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?;
        layers.push(output_layer(Mutex::new(file), config.json_format));
    }

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialised");
    }
    Ok(installed)
}
