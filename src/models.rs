//! Data model for the fleet telemetry engine.
//!
//! Everything here mirrors the wire shapes served by the remote telemetry
//! API. Fields that the backend is known to omit or null out are `Option`s;
//! deserialization must never fail just because a record is sparse, so most
//! collections and booleans carry `#[serde(default)]`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Telemetry query window. The API only understands these two ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
        }
    }

    /// Lookback window in hours, used by the alert search and route history
    /// endpoints which take hours rather than a range label.
    pub fn hours(&self) -> u32 {
        match self {
            TimeRange::Day => 24,
            TimeRange::Week => 168,
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five cargo categories the fleet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CargoType {
    #[serde(rename = "Frozen Seafood")]
    FrozenSeafood,
    #[serde(rename = "Fresh Produce")]
    FreshProduce,
    #[serde(rename = "Pharmaceuticals")]
    Pharmaceuticals,
    #[serde(rename = "Dairy")]
    Dairy,
    #[serde(rename = "Meat")]
    Meat,
}

impl CargoType {
    pub const ALL: [CargoType; 5] = [
        CargoType::FrozenSeafood,
        CargoType::FreshProduce,
        CargoType::Pharmaceuticals,
        CargoType::Dairy,
        CargoType::Meat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CargoType::FrozenSeafood => "Frozen Seafood",
            CargoType::FreshProduce => "Fresh Produce",
            CargoType::Pharmaceuticals => "Pharmaceuticals",
            CargoType::Dairy => "Dairy",
            CargoType::Meat => "Meat",
        }
    }
}

impl std::fmt::Display for CargoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative risk tier of the cargo, independent of numeric thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CargoSensitivity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Active,
    Disabled,
    Offline,
    Maintenance,
}

/// Backend-computed risk score attached to a telemetry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskScore {
    Low,
    Medium,
    High,
    Elevated,
    #[default]
    Unknown,
}

// ---

/// Live position merged into a [`Device`] from the fleet location feed.
///
/// Absent on a device until at least one location merge has occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub speed: Option<f64>,
    pub temperature: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One monitored vehicle in the fleet roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub driver_name: String,
    pub vehicle_reg: String,
    pub cargo_type: CargoType,
    pub cargo_sensitivity: CargoSensitivity,
    pub alert_threshold: f64,
    /// Server-reported count of active alerts, when the roster carries it.
    #[serde(default)]
    pub alerts: Option<u32>,
    pub status: DeviceStatus,
    #[serde(default)]
    pub current_location: Option<CurrentLocation>,
}

// ---

/// GPS fix embedded in a telemetry point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gps {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// One time-series sensor sample for a device.
///
/// The source delivers these oldest to newest, but isolated out-of-order
/// points do occur and consumers must tolerate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub door_open: bool,
    #[serde(default)]
    pub gps: Option<Gps>,
    #[serde(default)]
    pub thermal_rate: Option<f64>,
}

/// Most recent reading in a telemetry payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentReading {
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub door_open: bool,
    #[serde(default)]
    pub gps_speed: Option<f64>,
    #[serde(default)]
    pub thermal_rate: Option<f64>,
    #[serde(default)]
    pub location: Option<Gps>,
}

/// Alerting thresholds resolved from payload metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempThresholds {
    pub min: f64,
    pub max: f64,
}

impl Default for TempThresholds {
    fn default() -> Self {
        TempThresholds {
            min: -25.0,
            max: 8.0,
        }
    }
}

/// Device metadata attached to a telemetry payload. The backend sends cargo
/// type as a free string here, unlike the roster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryMetadata {
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub vehicle_reg: Option<String>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub cargo_sensitivity: Option<String>,
    #[serde(default)]
    pub temp_threshold_min: Option<f64>,
    #[serde(default)]
    pub temp_threshold_max: Option<f64>,
}

impl TelemetryMetadata {
    /// Thresholds with the fleet-wide defaults filled in for absent values.
    pub fn thresholds(&self) -> TempThresholds {
        let defaults = TempThresholds::default();
        TempThresholds {
            min: self.temp_threshold_min.unwrap_or(defaults.min),
            max: self.temp_threshold_max.unwrap_or(defaults.max),
        }
    }
}

/// Full telemetry payload cached per device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryData {
    #[serde(rename = "deviceId", default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub current: Option<CurrentReading>,
    #[serde(default)]
    pub history: Vec<TelemetryPoint>,
    #[serde(default)]
    pub metadata: Option<TelemetryMetadata>,
    #[serde(default)]
    pub risk_score: RiskScore,
    /// Label identifying which backend path served the data.
    #[serde(rename = "querySource", default)]
    pub query_source: Option<String>,
}

impl TelemetryData {
    pub fn thresholds(&self) -> TempThresholds {
        self.metadata
            .as_ref()
            .map(TelemetryMetadata::thresholds)
            .unwrap_or_default()
    }
}

// ---

/// One alert detail inside a server alert group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    #[serde(rename = "type", default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// One timestamped group of alerts from the alert search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroup {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub alert_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub alerts: Vec<AlertItem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertsSummary {
    #[serde(default)]
    pub total_records: Option<u32>,
    #[serde(default)]
    pub severity_breakdown: HashMap<String, u32>,
}

/// Response envelope of the alert search endpoint, cached per device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertSearchResult {
    #[serde(rename = "querySource", default)]
    pub query_source: Option<String>,
    #[serde(default)]
    pub summary: Option<AlertsSummary>,
    #[serde(default)]
    pub alerts: Vec<AlertGroup>,
    #[serde(default)]
    pub count: Option<u32>,
}

// ---

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleStatus {
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub door_open: Option<bool>,
}

/// One entry from the live fleet location feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetLocation {
    pub device_id: String,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub vehicle_reg: Option<String>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub location: Option<LatLng>,
    #[serde(default)]
    pub current_status: Option<VehicleStatus>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl FleetLocation {
    /// Shape this feed entry as the `current_location` sub-record merged
    /// into the matching roster device.
    pub fn as_current_location(&self) -> CurrentLocation {
        CurrentLocation {
            lat: self.location.and_then(|l| l.lat),
            lng: self.location.and_then(|l| l.lng),
            speed: self.current_status.and_then(|s| s.speed_kmh),
            temperature: self.current_status.and_then(|s| s.temperature),
            last_updated: self.last_updated,
        }
    }
}

// ---

/// Per-cargo aggregate row from the fleet analytics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoAnalytics {
    pub cargo_type: String,
    #[serde(default)]
    pub avg_temperature: Option<f64>,
    #[serde(default)]
    pub alert_violations: Option<u32>,
    #[serde(default)]
    pub avg_speed: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One row of the cargo comparison time series, one optional series per
/// cargo category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: String,
    #[serde(default)]
    pub frozen: Option<f64>,
    #[serde(default)]
    pub fresh: Option<f64>,
    #[serde(default)]
    pub pharma: Option<f64>,
    #[serde(default)]
    pub dairy: Option<f64>,
    #[serde(default)]
    pub meat: Option<f64>,
}

/// Both analytics datasets, stored together or not at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyticsSnapshot {
    pub cargo_breakdown: Vec<CargoAnalytics>,
    pub time_series: Vec<TimeSeriesPoint>,
}

// ---

/// One positional sample of a reconstructed route.
///
/// The location history endpoint names the coordinates `gps_lat`/`gps_lng`;
/// points derived from telemetry are transformed into the same shape. Speed
/// has shipped under several field names over time, so all of them are
/// modeled and resolved in priority order by [`RoutePoint::resolved_speed`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutePoint {
    #[serde(default)]
    pub gps_lat: Option<f64>,
    #[serde(default)]
    pub gps_lng: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub gps_speed: Option<f64>,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub gps: Option<Gps>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub door_open: bool,
}

impl RoutePoint {
    /// True when both coordinates are present and finite.
    pub fn has_valid_gps(&self) -> bool {
        matches!(
            (self.gps_lat, self.gps_lng),
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite()
        )
    }

    /// Resolve a speed value, trying `speed`, `gps_speed`, `speed_kmh`, then
    /// the nested `gps.speed`, defaulting to 0.
    pub fn resolved_speed(&self) -> f64 {
        self.speed
            .or(self.gps_speed)
            .or(self.speed_kmh)
            .or(self.gps.and_then(|g| g.speed))
            .unwrap_or(0.0)
    }

    /// Build a route point from a telemetry sample, or `None` when the
    /// sample carries no usable GPS fix.
    pub fn from_telemetry(point: &TelemetryPoint) -> Option<RoutePoint> {
        let gps = point.gps.as_ref()?;
        let (lat, lng) = (gps.lat?, gps.lng?);
        Some(RoutePoint {
            gps_lat: Some(lat),
            gps_lng: Some(lng),
            timestamp: Some(point.timestamp),
            speed: Some(gps.speed.unwrap_or(0.0)),
            temperature: point.temperature,
            door_open: point.door_open,
            ..RoutePoint::default()
        })
    }
}

// ---

/// Payload submitted when registering a new device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationData {
    pub device_id: String,
    pub driver_name: String,
    pub vehicle_reg: String,
    pub cargo_type: String,
    #[serde(default)]
    pub cargo_sensitivity: Option<CargoSensitivity>,
    pub alert_threshold: f64,
}

/// A single client-side validation failure, keyed by the offending field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl RegistrationData {
    /// Validate what can be checked without contacting the server: required
    /// fields, the `SCCIM_` device id convention, and the threshold range.
    /// Duplicate ids are only caught server-side via the 409 path.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        let required: [(&'static str, &str); 4] = [
            ("device_id", &self.device_id),
            ("driver_name", &self.driver_name),
            ("vehicle_reg", &self.vehicle_reg),
            ("cargo_type", &self.cargo_type),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(FieldError {
                    field,
                    message: "This field is required".to_string(),
                });
            }
        }
        if !self.device_id.is_empty() && !self.device_id.starts_with("SCCIM_") {
            errors.push(FieldError {
                field: "device_id",
                message: "Device ID must start with \"SCCIM_\"".to_string(),
            });
        }
        if !self.alert_threshold.is_finite()
            || self.alert_threshold < -50.0
            || self.alert_threshold > 50.0
        {
            errors.push(FieldError {
                field: "alert_threshold",
                message: "Must be a valid temperature between -50 and 50".to_string(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ---

/// Display configuration for one cargo category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CargoConfig {
    pub color: &'static str,
    pub default_threshold: f64,
}

const CARGO_CONFIGS: [(&str, CargoConfig); 5] = [
    (
        "Frozen Seafood",
        CargoConfig {
            color: "#2196F3",
            default_threshold: -18.0,
        },
    ),
    (
        "Fresh Produce",
        CargoConfig {
            color: "#4CAF50",
            default_threshold: 4.0,
        },
    ),
    (
        "Pharmaceuticals",
        CargoConfig {
            color: "#FF9800",
            default_threshold: 2.0,
        },
    ),
    (
        "Dairy",
        CargoConfig {
            color: "#9C27B0",
            default_threshold: 4.0,
        },
    ),
    (
        "Meat",
        CargoConfig {
            color: "#F44336",
            default_threshold: -15.0,
        },
    ),
];

/// Fallback entry for cargo labels not in the table.
pub const DEFAULT_CARGO_CONFIG: CargoConfig = CargoConfig {
    color: "#607D8B",
    default_threshold: 5.0,
};

/// Look up the display configuration for a cargo label. Unknown labels get
/// the default entry rather than an error.
pub fn cargo_config(cargo_type: &str) -> &'static CargoConfig {
    CARGO_CONFIGS
        .iter()
        .find(|(name, _)| *name == cargo_type)
        .map(|(_, config)| config)
        .unwrap_or(&DEFAULT_CARGO_CONFIG)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn time_range_labels_and_hours() {
        // ---
        assert_eq!(TimeRange::Day.as_str(), "24h");
        assert_eq!(TimeRange::Week.as_str(), "7d");
        assert_eq!(TimeRange::Day.hours(), 24);
        assert_eq!(TimeRange::Week.hours(), 168);
    }

    #[test]
    fn cargo_config_lookup_falls_back_to_default() {
        // ---
        assert_eq!(cargo_config("Frozen Seafood").color, "#2196F3");
        assert_eq!(cargo_config("Dairy").default_threshold, 4.0);
        assert_eq!(cargo_config("Livestock"), &DEFAULT_CARGO_CONFIG);
        assert_eq!(cargo_config(""), &DEFAULT_CARGO_CONFIG);
    }

    #[test]
    fn telemetry_payload_parses_with_sparse_fields() {
        // ---
        let payload = r#"{
            "deviceId": "SCCIM_001",
            "current": { "temperature": 3.2, "door_open": true },
            "history": [
                { "timestamp": "2025-03-26T18:45:00Z", "temperature": 3.0 }
            ],
            "querySource": "DynamoDB (SCCIM_Telemetry)"
        }"#;
        let data: TelemetryData = serde_json::from_str(payload).unwrap();
        assert_eq!(data.device_id.as_deref(), Some("SCCIM_001"));
        assert_eq!(data.risk_score, RiskScore::Unknown);
        assert_eq!(data.history.len(), 1);
        assert!(data.history[0].gps.is_none());
        // Absent metadata falls back to the fleet-wide thresholds
        assert_eq!(
            data.thresholds(),
            TempThresholds {
                min: -25.0,
                max: 8.0
            }
        );
    }

    #[test]
    fn route_point_speed_resolution_order() {
        // ---
        let mut point = RoutePoint {
            gps_speed: Some(40.0),
            speed_kmh: Some(50.0),
            gps: Some(Gps {
                lat: Some(1.3),
                lng: Some(103.8),
                speed: Some(60.0),
            }),
            ..RoutePoint::default()
        };
        assert_eq!(point.resolved_speed(), 40.0);
        point.speed = Some(30.0);
        assert_eq!(point.resolved_speed(), 30.0);
        point.speed = None;
        point.gps_speed = None;
        point.speed_kmh = None;
        assert_eq!(point.resolved_speed(), 60.0);
        point.gps = None;
        assert_eq!(point.resolved_speed(), 0.0);
    }

    #[test]
    fn registration_validation_rules() {
        // ---
        let valid = RegistrationData {
            device_id: "SCCIM_042".to_string(),
            driver_name: "Tan Wei Ming".to_string(),
            vehicle_reg: "SKV1234X".to_string(),
            cargo_type: "Dairy".to_string(),
            cargo_sensitivity: Some(CargoSensitivity::High),
            alert_threshold: 5.0,
        };
        assert!(valid.validate().is_ok());

        let bad_prefix = RegistrationData {
            device_id: "TRUCK_042".to_string(),
            ..valid.clone()
        };
        let errors = bad_prefix.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.field == "device_id"));

        let bad_threshold = RegistrationData {
            alert_threshold: 99.0,
            ..valid.clone()
        };
        let errors = bad_threshold.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.field == "alert_threshold"));

        let missing = RegistrationData {
            driver_name: "  ".to_string(),
            ..valid
        };
        let errors = missing.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.field == "driver_name"));
    }
}
