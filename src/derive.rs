//! Pure derivation rules over raw telemetry values.
//!
//! Every function here is total: bad or missing input yields a neutral
//! default (`Stable`, all-`None` stats, `false`), never an error. A single
//! bad feed must not be able to blank the whole dashboard, so only the
//! store's fetch actions are allowed to surface errors.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Device, TelemetryPoint};

// ---

/// Degrees below the max threshold at which a warning starts.
pub const WARNING_OFFSET_C: f64 = 2.0;

/// Speed floor (km/h) above which an open door counts as theft risk.
pub const THEFT_SPEED_FLOOR_KMH: f64 = 10.0;

/// A reading older than this is no longer considered live.
pub const LIVE_WINDOW_MINUTES: i64 = 5;

/// Per-device temperature badge, also the sort key for urgency ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempStatus {
    Ok,
    Warning,
    Critical,
    Offline,
}

impl TempStatus {
    /// Sort priority, ascending = most urgent first.
    pub fn priority(&self) -> u8 {
        match self {
            TempStatus::Critical => 0,
            TempStatus::Warning => 1,
            TempStatus::Offline => 2,
            TempStatus::Ok => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TempStatus::Ok => "OK",
            TempStatus::Warning => "WARNING",
            TempStatus::Critical => "CRITICAL",
            TempStatus::Offline => "OFFLINE",
        }
    }
}

impl std::fmt::Display for TempStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a temperature against a device's max threshold.
///
/// No reading at all means the sensor is offline, which ranks above OK but
/// below an actual breach.
pub fn temp_status(temp: Option<f64>, max_threshold: f64, warning_offset: f64) -> TempStatus {
    match temp {
        None => TempStatus::Offline,
        Some(t) if t > max_threshold => TempStatus::Critical,
        Some(t) if t > max_threshold - warning_offset => TempStatus::Warning,
        Some(_) => TempStatus::Ok,
    }
}

/// Status of a roster device, judged on its merged live location.
pub fn device_temp_status(device: &Device) -> TempStatus {
    let temp = device
        .current_location
        .as_ref()
        .and_then(|loc| loc.temperature);
    temp_status(temp, device.alert_threshold, WARNING_OFFSET_C)
}

/// Devices sorted most urgent first; ties keep roster order.
pub fn sort_by_priority(devices: &[Device]) -> Vec<Device> {
    let mut sorted = devices.to_vec();
    sorted.sort_by_key(|d| device_temp_status(d).priority());
    sorted
}

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Direction of change between two consecutive readings, with a 0.1 degree
/// deadband so sensor jitter reads as stable.
pub fn trend(current: f64, previous: Option<f64>) -> Trend {
    let Some(previous) = previous else {
        return Trend::Stable;
    };
    let diff = current - previous;
    if diff.abs() < 0.1 {
        Trend::Stable
    } else if diff > 0.0 {
        Trend::Up
    } else {
        Trend::Down
    }
}

/// Instantaneous rate of temperature change.
///
/// A live value from the backend wins verbatim, even when zero. Otherwise
/// the rate is the difference of the last two history temperatures, rounded
/// to 2 decimals. That diff is per sampling interval, not normalized to
/// elapsed time between the samples.
pub fn thermal_rate(live: Option<f64>, history: &[TelemetryPoint]) -> f64 {
    if let Some(rate) = live {
        return rate;
    }
    if history.len() < 2 {
        return 0.0;
    }
    let latest = &history[history.len() - 1];
    let previous = &history[history.len() - 2];
    match (latest.temperature, previous.temperature) {
        (Some(a), Some(b)) => round2(a - b),
        _ => 0.0,
    }
}

/// Heuristic theft flag: cargo door open while the vehicle moves above the
/// speed floor.
pub fn theft_risk(door_open: bool, speed_kmh: f64) -> bool {
    door_open && speed_kmh > THEFT_SPEED_FLOOR_KMH
}

pub fn is_temperature_breached(temp: f64, max_threshold: f64) -> bool {
    temp > max_threshold
}

// ---

/// Temperature aggregates over a telemetry history, 1-decimal rounded for
/// display. All fields are `None` when no defined readings exist.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryStats {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

pub fn history_stats(history: &[TelemetryPoint]) -> HistoryStats {
    let temps: Vec<f64> = history.iter().filter_map(|p| p.temperature).collect();
    if temps.is_empty() {
        return HistoryStats::default();
    }
    let sum: f64 = temps.iter().sum();
    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    HistoryStats {
        avg: Some(round1(sum / temps.len() as f64)),
        min: Some(round1(min)),
        max: Some(round1(max)),
    }
}

// ---

/// True when the reading is fresher than the live window. An absent
/// timestamp is simply not live, never an error.
pub fn is_live(last_updated: Option<DateTime<Utc>>) -> bool {
    is_live_at(last_updated, Utc::now())
}

pub fn is_live_at(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_updated {
        Some(ts) => now - ts < Duration::minutes(LIVE_WINDOW_MINUTES),
        None => false,
    }
}

/// Humanized age of a timestamp, for alert rows and badges.
pub fn time_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - ts).num_seconds().max(0);
    if seconds < 60 {
        return "Just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{} min{} ago", minutes, if minutes > 1 { "s" } else { "" });
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} hour{} ago", hours, if hours > 1 { "s" } else { "" });
    }
    let days = hours / 24;
    format!("{} day{} ago", days, if days > 1 { "s" } else { "" })
}

/// Render-bound temperature display, `--` when absent.
pub fn format_temperature(temp: Option<f64>) -> String {
    match temp {
        Some(t) => format!("{t:.1}°C"),
        None => "--".to_string(),
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
