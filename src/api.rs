//! External collaborators: the remote telemetry API behind a trait.
//!
//! The store and route reconstructor only see [`FleetApi`], so tests can
//! inject scripted implementations. [`HttpFleetApi`] is the production
//! implementation over reqwest, mapping each endpoint's failure statuses to
//! the distinct human-readable messages the UI shows. Callers branch only
//! on the not-registered case; everything else surfaces as a generic
//! error banner.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{
    AlertSearchResult, CargoAnalytics, Device, FleetLocation, RegistrationData, RoutePoint,
    TelemetryData, TimeRange, TimeSeriesPoint,
};

// ---

#[derive(Debug, Error)]
pub enum ApiError {
    /// The referenced device does not exist server-side; the current view
    /// is invalid and should redirect.
    #[error("Device not registered")]
    NotRegistered,
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Fleet data not found")]
    FleetNotFound,
    #[error("Device ID already exists")]
    DuplicateDevice,
    /// Client- or server-side registration validation failure.
    #[error("{0}")]
    Validation(String),
    #[error("Server error, retrying...")]
    ServerError,
    #[error("Analytics offline (using cached data)")]
    AnalyticsOffline,
    #[error("API error: {0}")]
    Unexpected(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ApiError {
    /// The one error callers branch on for the boundary redirect.
    pub fn is_not_registered(&self) -> bool {
        matches!(self, ApiError::NotRegistered)
    }
}

// ---

/// The fixed set of remote collaborator calls the engine consumes.
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// `GET /devices` — the fleet roster.
    async fn fetch_fleet(&self) -> Result<Vec<Device>, ApiError>;

    /// `GET /telemetry/{deviceId}?range=` — one device's telemetry payload.
    async fn fetch_telemetry(
        &self,
        device_id: &str,
        range: TimeRange,
    ) -> Result<TelemetryData, ApiError>;

    /// `GET /locations/fleet` — live per-device location snapshot.
    async fn fleet_locations(&self) -> Result<Vec<FleetLocation>, ApiError>;

    /// `GET /locations/{deviceId}/history?hours=` — ordered route points.
    async fn location_history(
        &self,
        device_id: &str,
        hours: u32,
    ) -> Result<Vec<RoutePoint>, ApiError>;

    /// `GET /analytics/fleet-overview` — per-cargo aggregate rows.
    async fn fleet_analytics(&self) -> Result<Vec<CargoAnalytics>, ApiError>;

    /// `GET /analytics/cargo-comparison` — time-series chart rows.
    async fn cargo_comparison(&self) -> Result<Vec<TimeSeriesPoint>, ApiError>;

    /// `GET /search/alerts` — historical alert groups for one device.
    async fn search_alerts(
        &self,
        device_id: &str,
        hours: u32,
        cargo_type: Option<&str>,
        limit: u32,
    ) -> Result<AlertSearchResult, ApiError>;

    /// `POST /devices` — register a new device.
    async fn register_device(&self, data: &RegistrationData) -> Result<Device, ApiError>;
}

// ---

// Response envelopes; all payload fields default so sparse responses parse.

#[derive(Debug, Default, Deserialize)]
struct FleetEnvelope {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Default, Deserialize)]
struct LocationsEnvelope {
    #[serde(default)]
    trucks: Vec<FleetLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct RouteEnvelope {
    #[serde(default)]
    route: Vec<RoutePoint>,
}

#[derive(Debug, Default, Deserialize)]
struct OverviewEnvelope {
    #[serde(default)]
    cargo_breakdown: Vec<CargoAnalytics>,
}

#[derive(Debug, Default, Deserialize)]
struct ComparisonEnvelope {
    #[serde(default)]
    chart_data: Vec<TimeSeriesPoint>,
}

/// Production [`FleetApi`] over HTTP.
pub struct HttpFleetApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFleetApi {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpFleetApi {
            client,
            base_url: base_url.into(),
        })
    }

    /// GET a JSON payload, translating failure statuses through the
    /// endpoint's own mapping first.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        map_status: fn(StatusCode) -> Option<ApiError>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            if let Some(mapped) = map_status(status) {
                return Err(mapped);
            }
            return Err(ApiError::Unexpected(status.to_string()));
        }
        Ok(response.json().await?)
    }
}

fn server_error_only(status: StatusCode) -> Option<ApiError> {
    (status == StatusCode::INTERNAL_SERVER_ERROR).then_some(ApiError::ServerError)
}

fn not_registered_or_server(status: StatusCode) -> Option<ApiError> {
    match status {
        StatusCode::NOT_FOUND => Some(ApiError::NotRegistered),
        StatusCode::INTERNAL_SERVER_ERROR => Some(ApiError::ServerError),
        _ => None,
    }
}

fn fleet_status(status: StatusCode) -> Option<ApiError> {
    match status {
        StatusCode::NOT_FOUND => Some(ApiError::FleetNotFound),
        StatusCode::INTERNAL_SERVER_ERROR => Some(ApiError::ServerError),
        _ => None,
    }
}

fn analytics_status(status: StatusCode) -> Option<ApiError> {
    match status {
        StatusCode::SERVICE_UNAVAILABLE => Some(ApiError::AnalyticsOffline),
        StatusCode::INTERNAL_SERVER_ERROR => Some(ApiError::ServerError),
        _ => None,
    }
}

fn alerts_status(status: StatusCode) -> Option<ApiError> {
    match status {
        StatusCode::NOT_FOUND => Some(ApiError::DeviceNotFound),
        StatusCode::INTERNAL_SERVER_ERROR => Some(ApiError::ServerError),
        _ => None,
    }
}

#[async_trait]
impl FleetApi for HttpFleetApi {
    async fn fetch_fleet(&self) -> Result<Vec<Device>, ApiError> {
        let envelope: FleetEnvelope = self.get_json("/devices", fleet_status).await?;
        Ok(envelope.devices)
    }

    async fn fetch_telemetry(
        &self,
        device_id: &str,
        range: TimeRange,
    ) -> Result<TelemetryData, ApiError> {
        let path = format!("/telemetry/{device_id}?range={range}");
        self.get_json(&path, not_registered_or_server).await
    }

    async fn fleet_locations(&self) -> Result<Vec<FleetLocation>, ApiError> {
        let envelope: LocationsEnvelope =
            self.get_json("/locations/fleet", server_error_only).await?;
        Ok(envelope.trucks)
    }

    async fn location_history(
        &self,
        device_id: &str,
        hours: u32,
    ) -> Result<Vec<RoutePoint>, ApiError> {
        let path = format!("/locations/{device_id}/history?hours={hours}");
        let envelope: RouteEnvelope = self.get_json(&path, not_registered_or_server).await?;
        Ok(envelope.route)
    }

    async fn fleet_analytics(&self) -> Result<Vec<CargoAnalytics>, ApiError> {
        let envelope: OverviewEnvelope = self
            .get_json("/analytics/fleet-overview", analytics_status)
            .await?;
        Ok(envelope.cargo_breakdown)
    }

    async fn cargo_comparison(&self) -> Result<Vec<TimeSeriesPoint>, ApiError> {
        let envelope: ComparisonEnvelope = self
            .get_json("/analytics/cargo-comparison", analytics_status)
            .await?;
        Ok(envelope.chart_data)
    }

    async fn search_alerts(
        &self,
        device_id: &str,
        hours: u32,
        cargo_type: Option<&str>,
        limit: u32,
    ) -> Result<AlertSearchResult, ApiError> {
        let mut path = format!("/search/alerts?deviceId={device_id}&hours={hours}");
        if let Some(cargo) = cargo_type {
            // Cargo labels contain spaces
            path.push_str("&cargo_type=");
            path.push_str(&cargo.replace(' ', "%20"));
        }
        path.push_str(&format!("&limit={limit}"));
        self.get_json(&path, alerts_status).await
    }

    async fn register_device(&self, data: &RegistrationData) -> Result<Device, ApiError> {
        let url = format!("{}/devices", self.base_url);
        tracing::debug!("POST {}", url);
        let response = self.client.post(&url).json(data).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::CONFLICT => ApiError::DuplicateDevice,
                StatusCode::BAD_REQUEST => {
                    // The backend puts the reason under `message` or `error`
                    let body: serde_json::Value = response.json().await.unwrap_or_default();
                    let message = body
                        .get("message")
                        .or_else(|| body.get("error"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("Invalid device data");
                    ApiError::Validation(message.to_string())
                }
                StatusCode::INTERNAL_SERVER_ERROR => ApiError::ServerError,
                other => ApiError::Unexpected(other.to_string()),
            });
        }
        Ok(response.json().await?)
    }
}
