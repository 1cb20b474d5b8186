//! Logging initialization for the command-line binary

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{Error, Result};

/// Install a compact stderr subscriber.
///
/// `GPM_LOG` takes precedence over the `verbose` flag when set.
pub fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    let env_filter = EnvFilter::try_from_env("GPM_LOG")
        .or_else(|_| EnvFilter::try_new(format!("gpm={}", level)))
        .map_err(|e| Error::Other(format!("Failed to create log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time()
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
