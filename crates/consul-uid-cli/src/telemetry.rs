//! Log output for the binary.
//!
//! Everything goes to stderr so stdout carries nothing but the command's
//! result. The filter comes from `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=consul_uid=debug consul-uid --name web
//! ```

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LogFormat;

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(ChronoLocal::rfc_3339())
        .with_file(true);

    let registry = tracing_subscriber::registry().with(filter());
    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Compact => registry.with(layer.compact()).try_init()?,
        LogFormat::Json => registry.with(layer.json()).try_init()?,
    }

    Ok(())
}
