//! Console entry point for the `coldfleet` engine.
//!
//! Performs one full refresh cycle against the configured telemetry API and
//! logs a fleet summary: roster counts, per-device temperature status, and
//! a reconstructed route for the first device with telemetry. Useful for
//! smoke-testing an environment without the dashboard in front of it.
//!
//! # Environment Variables
//! - `FLEET_API_URL` (**required**) – telemetry API base URL
//! - `FLEET_API_TIMEOUT_SECS` (optional) – per-request timeout (default: 10)
//! - `FLEET_HISTORY_HOURS` (optional) – route lookback hours (default: 24)
//! - `FLEET_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `FLEET_SPAN_EVENTS` (optional) – span event mode for tracing

use std::{env, io::IsTerminal, sync::Arc, time::Duration};

use anyhow::Result;
use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use coldfleet::derive::{device_temp_status, is_live};
use coldfleet::{config, reconstruct_route, FleetStore, HttpFleetApi, RouteOutcome};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let api = Arc::new(HttpFleetApi::new(
        cfg.api_url.clone(),
        Duration::from_secs(cfg.api_timeout_secs as u64),
    )?);
    let store = FleetStore::new(api.clone());

    tracing::info!("Refreshing fleet state from {}", cfg.api_url);
    store.refresh_all().await;

    let state = store.snapshot();
    if let Some(error) = &state.error {
        tracing::warn!("Last fetch error: {}", error);
    }
    tracing::info!(
        "Fleet: {} devices, {} active, {} alerting",
        state.devices.len(),
        state.active_count(),
        state.alert_count()
    );

    for device in state.devices.iter() {
        let live = is_live(
            device
                .current_location
                .as_ref()
                .and_then(|loc| loc.last_updated),
        );
        tracing::info!(
            "  {} [{}] {} — {}{}",
            device.device_id,
            device.cargo_type,
            device.driver_name,
            device_temp_status(device),
            if live { " (live)" } else { "" }
        );
    }

    // Route summary for the first device, exercising the fallback path
    if let Some(device) = state.devices.first() {
        store
            .fetch_telemetry(&device.device_id, None)
            .await
            .ok();
        let snapshot = store.snapshot();
        let history = snapshot
            .telemetry_for(&device.device_id)
            .map(|t| t.history.clone())
            .unwrap_or_default();
        match reconstruct_route(api.as_ref(), &device.device_id, cfg.history_hours, &history).await
        {
            RouteOutcome::Route(summary) => tracing::info!(
                "Route for {}: {} points, {} km, avg {} km/h, max {} km/h ({:?})",
                device.device_id,
                summary.stats.total_points,
                summary.stats.distance_km,
                summary.stats.avg_speed_kmh,
                summary.stats.max_speed_kmh,
                summary.provenance
            ),
            RouteOutcome::NoData => {
                tracing::info!("Route for {}: no route data available", device.device_id)
            }
            RouteOutcome::Failed(message) => {
                tracing::warn!("Route for {}: {}", device.device_id, message)
            }
        }
    }

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// Configures [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `FLEET_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `FLEET_LOG_LEVEL` env var
///
/// Call once at startup before any logging macros are invoked; installs the
/// subscriber globally for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("FLEET_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to FLEET_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("FLEET_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
