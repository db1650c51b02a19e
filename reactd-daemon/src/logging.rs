//! Logging initialization for reactd.
//!
//! Logging comes up in two steps. While the configuration is loaded a
//! bootstrap subscriber writes to stderr, so warnings from config validation
//! are not lost. Once `[general]` is known, [`init_tracing`] installs the
//! global subscriber. `RUST_LOG`, when set, wins over either level.

use anyhow::Result;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use reactd_core::config::GeneralConfig;

/// Level used before the configuration is loaded.
pub const BOOTSTRAP_LEVEL: &str = "warn";

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once. Events emitted earlier are only seen by the
/// [`bootstrap_dispatch`] they ran under.
///
/// # Formats
///
/// * `"json"` - one JSON object per line (for journald/log shippers)
/// * `"pretty"` - human-readable output (for running in a terminal)
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    build_dispatch(filter, &config.log_format, std::io::stdout)?
        .try_init()
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to initialize {} tracing subscriber: {}",
                config.log_format,
                e
            )
        })
}

/// Subscriber for the config loading phase.
///
/// Only the command-line overrides are known at this point. The level falls
/// back to [`BOOTSTRAP_LEVEL`]; an unknown format falls back to pretty.
pub fn bootstrap_dispatch(level: Option<&str>, format: Option<&str>) -> Dispatch {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(BOOTSTRAP_LEVEL)));
    let format = match format {
        Some("json") => "json",
        _ => "pretty",
    };
    build_dispatch(filter, format, std::io::stderr).unwrap_or_else(|_| Dispatch::none())
}

fn build_dispatch<W>(filter: EnvFilter, format: &str, writer: W) -> Result<Dispatch>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    let dispatch = match format {
        "json" => Dispatch::new(registry.with(fmt::layer().json().with_writer(writer))),
        "pretty" => Dispatch::new(registry.with(fmt::layer().pretty().with_writer(writer))),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };
    Ok(dispatch)
}
