//! Structured logging setup for the session engine.
//!
//! Initializes a `tracing` subscriber with an `EnvFilter` (respecting
//! `RUST_LOG`, falling back to a CLI-supplied level) and a console `fmt`
//! layer. There is no span-export backend here: the engine is embedded
//! inside a host application, and shipping spans to a collector is the
//! host's concern, not the library's.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber for console logging.
///
/// # Arguments
/// * `log_level` – minimum tracing level for the fmt layer, used only when
///   `RUST_LOG` is not set.
pub fn init_telemetry(log_level: Level) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(level = %log_level, "logging initialized");

    Ok(())
}
