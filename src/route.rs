//! Route history reconstruction and geospatial summarization.
//!
//! The authoritative source is the location history endpoint. When it
//! returns nothing or fails, the device's already-fetched telemetry history
//! is transformed into the same shape instead; only one provenance is ever
//! active per request. A primary failure is surfaced to the caller only
//! when no fallback data exists at all.

use crate::api::{ApiError, FleetApi};
use crate::derive::round1;
use crate::models::{RoutePoint, TelemetryPoint};

// ---

/// Up to this many evenly-spaced waypoints are annotated along a route.
pub const MAX_WAYPOINTS: usize = 10;

/// Earth radius used by the haversine distance, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Which source produced a reconstructed route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteProvenance {
    LocationHistory,
    TelemetryFallback,
}

/// Aggregate statistics over the valid points of a route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStats {
    pub total_points: usize,
    /// Cumulative great-circle distance, 1-decimal rounded.
    pub distance_km: f64,
    /// Average over positive resolvable speeds; 0 when none exist.
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub avg_temperature: Option<f64>,
}

impl RouteStats {
    /// Render-bound average temperature, `--` when no point carried one.
    pub fn avg_temperature_display(&self) -> String {
        match self.avg_temperature {
            Some(t) => format!("{t:.1}"),
            None => "--".to_string(),
        }
    }
}

/// A validated route plus its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSummary {
    pub points: Vec<RoutePoint>,
    pub provenance: RouteProvenance,
    pub stats: RouteStats,
}

impl RouteSummary {
    /// First and last point of the route, rendered distinctly as endpoints.
    pub fn endpoints(&self) -> Option<(&RoutePoint, &RoutePoint)> {
        match (self.points.first(), self.points.last()) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Evenly-spaced annotated waypoints, stride = ceil(n / MAX_WAYPOINTS).
    pub fn waypoints(&self) -> Vec<&RoutePoint> {
        let n = self.points.len();
        if n == 0 {
            return Vec::new();
        }
        let stride = n.div_ceil(MAX_WAYPOINTS);
        self.points
            .iter()
            .enumerate()
            .filter(|(i, _)| i % stride == 0)
            .map(|(_, p)| p)
            .collect()
    }
}

/// Result of a reconstruction request. Having no data from any source is a
/// normal empty state, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Route(RouteSummary),
    NoData,
    Failed(String),
}

// ---

/// Reconstruct a device's route over the lookback window.
pub async fn reconstruct_route(
    api: &dyn FleetApi,
    device_id: &str,
    hours: u32,
    fallback_history: &[TelemetryPoint],
) -> RouteOutcome {
    let (candidate, provenance) = match api.location_history(device_id, hours).await {
        Ok(points) if !points.is_empty() => {
            tracing::debug!(device_id, count = points.len(), "using location history");
            (points, RouteProvenance::LocationHistory)
        }
        Ok(_) => {
            tracing::debug!(device_id, "location history empty, trying telemetry fallback");
            (
                telemetry_fallback(fallback_history),
                RouteProvenance::TelemetryFallback,
            )
        }
        Err(err) => {
            if fallback_history.is_empty() {
                tracing::warn!(device_id, %err, "route history failed with no fallback");
                return RouteOutcome::Failed(err.to_string());
            }
            tracing::debug!(device_id, %err, "route history failed, using telemetry fallback");
            (
                telemetry_fallback(fallback_history),
                RouteProvenance::TelemetryFallback,
            )
        }
    };

    let valid: Vec<RoutePoint> = candidate
        .into_iter()
        .filter(RoutePoint::has_valid_gps)
        .collect();
    if valid.is_empty() {
        return RouteOutcome::NoData;
    }

    let stats = route_stats(&valid);
    RouteOutcome::Route(RouteSummary {
        points: valid,
        provenance,
        stats,
    })
}

/// Transform telemetry samples into route points, dropping any without a
/// usable GPS fix.
pub fn telemetry_fallback(history: &[TelemetryPoint]) -> Vec<RoutePoint> {
    history.iter().filter_map(RoutePoint::from_telemetry).collect()
}

/// Great-circle distance between two coordinates via the haversine formula.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

fn route_distance_km(points: &[RoutePoint]) -> f64 {
    let mut total = 0.0;
    for pair in points.windows(2) {
        if let (Some(lat1), Some(lng1), Some(lat2), Some(lng2)) = (
            pair[0].gps_lat,
            pair[0].gps_lng,
            pair[1].gps_lat,
            pair[1].gps_lng,
        ) {
            total += haversine_km(lat1, lng1, lat2, lng2);
        }
    }
    round1(total)
}

fn route_stats(points: &[RoutePoint]) -> RouteStats {
    // Stopped samples would drag the average toward zero
    let speeds: Vec<f64> = points
        .iter()
        .map(RoutePoint::resolved_speed)
        .filter(|s| *s > 0.0)
        .collect();
    let (avg_speed, max_speed) = if speeds.is_empty() {
        (0.0, 0.0)
    } else {
        let sum: f64 = speeds.iter().sum();
        let max = speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (round1(sum / speeds.len() as f64), round1(max))
    };

    let temps: Vec<f64> = points.iter().filter_map(|p| p.temperature).collect();
    let avg_temperature = if temps.is_empty() {
        None
    } else {
        Some(round1(temps.iter().sum::<f64>() / temps.len() as f64))
    };

    RouteStats {
        total_points: points.len(),
        distance_km: route_distance_km(points),
        avg_speed_kmh: avg_speed,
        max_speed_kmh: max_speed,
        avg_temperature,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    use crate::models::{
        AlertSearchResult, CargoAnalytics, Device, FleetLocation, Gps, RegistrationData,
        TelemetryData, TimeRange, TimeSeriesPoint,
    };

    /// Scripted location-history collaborator; the other endpoints are
    /// never called by the reconstructor.
    struct RouteApi {
        history: Mutex<Option<Result<Vec<RoutePoint>, ApiError>>>,
    }

    impl RouteApi {
        fn returning(result: Result<Vec<RoutePoint>, ApiError>) -> Self {
            RouteApi {
                history: Mutex::new(Some(result)),
            }
        }
    }

    #[async_trait]
    impl FleetApi for RouteApi {
        async fn fetch_fleet(&self) -> Result<Vec<Device>, ApiError> {
            Ok(Vec::new())
        }
        async fn fetch_telemetry(
            &self,
            _device_id: &str,
            _range: TimeRange,
        ) -> Result<TelemetryData, ApiError> {
            Ok(TelemetryData::default())
        }
        async fn fleet_locations(&self) -> Result<Vec<FleetLocation>, ApiError> {
            Ok(Vec::new())
        }
        async fn location_history(
            &self,
            _device_id: &str,
            _hours: u32,
        ) -> Result<Vec<RoutePoint>, ApiError> {
            self.history.lock().unwrap().take().unwrap()
        }
        async fn fleet_analytics(&self) -> Result<Vec<CargoAnalytics>, ApiError> {
            Ok(Vec::new())
        }
        async fn cargo_comparison(&self) -> Result<Vec<TimeSeriesPoint>, ApiError> {
            Ok(Vec::new())
        }
        async fn search_alerts(
            &self,
            _device_id: &str,
            _hours: u32,
            _cargo_type: Option<&str>,
            _limit: u32,
        ) -> Result<AlertSearchResult, ApiError> {
            Ok(AlertSearchResult::default())
        }
        async fn register_device(&self, _data: &RegistrationData) -> Result<Device, ApiError> {
            Err(ApiError::ServerError)
        }
    }

    fn telemetry_point(lat: Option<f64>, lng: Option<f64>, speed: f64) -> TelemetryPoint {
        // ---
        TelemetryPoint {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 26, 9, 0, 0).unwrap(),
            temperature: Some(4.0),
            humidity: None,
            door_open: false,
            gps: Some(Gps {
                lat,
                lng,
                speed: Some(speed),
            }),
            thermal_rate: None,
        }
    }

    fn route_point(lat: f64, lng: f64, speed: f64) -> RoutePoint {
        // ---
        RoutePoint {
            gps_lat: Some(lat),
            gps_lng: Some(lng),
            speed: Some(speed),
            temperature: Some(3.0),
            ..RoutePoint::default()
        }
    }

    #[test]
    fn haversine_known_segment() {
        // ---
        let d = haversine_km(1.30, 103.80, 1.31, 103.81);
        assert!((d - 1.5723).abs() < 0.05, "got {d}");
        assert_eq!(haversine_km(1.30, 103.80, 1.30, 103.80), 0.0);
    }

    #[tokio::test]
    async fn empty_primary_falls_back_to_telemetry() {
        // ---
        let api = RouteApi::returning(Ok(Vec::new()));
        let fallback = vec![
            telemetry_point(Some(1.30), Some(103.80), 20.0),
            telemetry_point(Some(1.31), Some(103.81), 30.0),
            telemetry_point(Some(1.32), Some(103.82), 40.0),
        ];
        let outcome = reconstruct_route(&api, "SCCIM_001", 24, &fallback).await;
        let RouteOutcome::Route(summary) = outcome else {
            panic!("expected a route, got {outcome:?}");
        };
        assert_eq!(summary.provenance, RouteProvenance::TelemetryFallback);
        assert_eq!(summary.points.len(), 3);
        assert_eq!(summary.stats.total_points, 3);
    }

    #[tokio::test]
    async fn fallback_drops_points_without_gps() {
        // ---
        let api = RouteApi::returning(Ok(Vec::new()));
        let fallback = vec![
            telemetry_point(Some(1.30), Some(103.80), 20.0),
            telemetry_point(None, Some(103.81), 30.0),
            telemetry_point(Some(1.32), None, 40.0),
        ];
        let outcome = reconstruct_route(&api, "SCCIM_001", 24, &fallback).await;
        let RouteOutcome::Route(summary) = outcome else {
            panic!("expected a route, got {outcome:?}");
        };
        assert_eq!(summary.points.len(), 1);
    }

    #[tokio::test]
    async fn primary_wins_when_non_empty() {
        // ---
        let api = RouteApi::returning(Ok(vec![
            route_point(1.30, 103.80, 35.0),
            route_point(1.31, 103.81, 45.0),
        ]));
        let fallback = vec![telemetry_point(Some(9.9), Some(9.9), 1.0)];
        let outcome = reconstruct_route(&api, "SCCIM_001", 24, &fallback).await;
        let RouteOutcome::Route(summary) = outcome else {
            panic!("expected a route, got {outcome:?}");
        };
        assert_eq!(summary.provenance, RouteProvenance::LocationHistory);
        assert_eq!(summary.stats.distance_km, 1.6);
        assert_eq!(summary.stats.avg_speed_kmh, 40.0);
        assert_eq!(summary.stats.max_speed_kmh, 45.0);
        assert_eq!(summary.stats.avg_temperature, Some(3.0));
    }

    #[tokio::test]
    async fn primary_failure_recovers_via_fallback() {
        // ---
        let api = RouteApi::returning(Err(ApiError::ServerError));
        let fallback = vec![
            telemetry_point(Some(1.30), Some(103.80), 20.0),
            telemetry_point(Some(1.31), Some(103.81), 30.0),
        ];
        let outcome = reconstruct_route(&api, "SCCIM_001", 24, &fallback).await;
        let RouteOutcome::Route(summary) = outcome else {
            panic!("expected a route, got {outcome:?}");
        };
        assert_eq!(summary.provenance, RouteProvenance::TelemetryFallback);
    }

    #[tokio::test]
    async fn primary_failure_without_fallback_is_reported() {
        // ---
        let api = RouteApi::returning(Err(ApiError::ServerError));
        let outcome = reconstruct_route(&api, "SCCIM_001", 24, &[]).await;
        assert_eq!(
            outcome,
            RouteOutcome::Failed("Server error, retrying...".to_string())
        );
    }

    #[tokio::test]
    async fn both_sources_empty_is_no_data_not_error() {
        // ---
        let api = RouteApi::returning(Ok(Vec::new()));
        let outcome = reconstruct_route(&api, "SCCIM_001", 24, &[]).await;
        assert_eq!(outcome, RouteOutcome::NoData);
    }

    #[tokio::test]
    async fn nan_coordinates_are_filtered() {
        // ---
        let api = RouteApi::returning(Ok(vec![
            route_point(1.30, 103.80, 35.0),
            route_point(f64::NAN, 103.81, 45.0),
            route_point(1.32, 103.82, 55.0),
        ]));
        let outcome = reconstruct_route(&api, "SCCIM_001", 24, &[]).await;
        let RouteOutcome::Route(summary) = outcome else {
            panic!("expected a route, got {outcome:?}");
        };
        assert_eq!(summary.points.len(), 2);
    }

    #[test]
    fn speed_stats_exclude_stopped_samples() {
        // ---
        let points = vec![
            route_point(1.30, 103.80, 0.0),
            route_point(1.31, 103.81, 30.0),
            route_point(1.32, 103.82, 50.0),
        ];
        let stats = route_stats(&points);
        assert_eq!(stats.avg_speed_kmh, 40.0);
        assert_eq!(stats.max_speed_kmh, 50.0);
    }

    #[test]
    fn stats_with_no_speeds_or_temperatures() {
        // ---
        let mut points = vec![route_point(1.30, 103.80, 0.0)];
        points[0].temperature = None;
        let stats = route_stats(&points);
        assert_eq!(stats.avg_speed_kmh, 0.0);
        assert_eq!(stats.max_speed_kmh, 0.0);
        assert_eq!(stats.avg_temperature, None);
        assert_eq!(stats.avg_temperature_display(), "--");
    }

    #[test]
    fn waypoint_sampling_stride() {
        // ---
        let points: Vec<RoutePoint> = (0..25)
            .map(|i| route_point(1.30 + i as f64 * 0.001, 103.80, 20.0))
            .collect();
        let summary = RouteSummary {
            stats: route_stats(&points),
            points,
            provenance: RouteProvenance::LocationHistory,
        };
        // stride = ceil(25 / 10) = 3, indices 0, 3, ..., 24
        let waypoints = summary.waypoints();
        assert_eq!(waypoints.len(), 9);
        let (start, end) = summary.endpoints().unwrap();
        assert_eq!(start.gps_lat, Some(1.30));
        assert_eq!(end.gps_lat, Some(1.30 + 24.0 * 0.001));
        // Short routes annotate every point
        let short = RouteSummary {
            points: vec![route_point(1.3, 103.8, 1.0), route_point(1.31, 103.81, 1.0)],
            provenance: RouteProvenance::LocationHistory,
            stats: route_stats(&[]),
        };
        assert_eq!(short.waypoints().len(), 2);
    }
}
