//! Logging setup for the Voxflow binaries.
//!
//! Every process calls [`install`] exactly once at startup. Output format is
//! plain fmt by default and single-line JSON when `LOG_FORMAT=json`, which
//! is what the container deployments set. Filtering follows `RUST_LOG`,
//! defaulting to `info`.

use std::sync::OnceLock;

use anyhow::Result;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

pub fn install(service_name: &str) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    INIT.set(()).ok();
    tracing::info!(service = service_name, "telemetry installed");
    Ok(())
}
