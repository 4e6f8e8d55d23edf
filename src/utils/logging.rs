// src/utils/logging.rs
//! tracing subscriber setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{CoreError, CoreResult};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` overrides `config.filter`. A subscriber installed earlier, e.g.
/// by the application or another test, is kept and not reported as an error.
pub fn init_tracing(config: &LoggingConfig) -> CoreResult<()> {
    let filter = build_filter(config)?;

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().with_thread_names(true).with_filter(filter).boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_thread_names(true).with_filter(filter).boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        // Global dispatcher or `log` bridge installed earlier
        Err(e) if e.to_string().contains("already") => Ok(()),
        Err(e) => Err(CoreError::Logging(e.to_string())),
    }
}

fn build_filter(config: &LoggingConfig) -> CoreResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| CoreError::Logging(format!("invalid filter {:?}: {}", config.filter, e))),
    }
}
