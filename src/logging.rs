//! Tracing subscriber setup for binaries built with the `logging` feature.

use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install color-eyre hooks and a global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_level` when set.
pub fn init_logging(default_level: &str, format: LogFormat) -> anyhow::Result<()> {
    color_eyre::install().map_err(|e| anyhow::anyhow!(e))?;

    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}
