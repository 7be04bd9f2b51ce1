//! The process-wide fleet state container.
//!
//! One [`FleetStore`] owns every cache: the device roster, per-device
//! telemetry and alert caches, the raw location feed, the analytics
//! snapshot, and the UI filter state. All mutation goes through the store's
//! own actions; each write replaces the relevant `Arc` wholesale so
//! observers can detect change by pointer identity instead of diffing.
//!
//! Collaborators are injected behind [`FleetApi`], never reached through a
//! global. The state lock is only ever held for a synchronous read or
//! write, never across an await; concurrent actions therefore interleave
//! freely but each writes a disjoint part of state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::api::{ApiError, FleetApi};
use crate::models::{
    AlertSearchResult, AnalyticsSnapshot, CargoType, Device, DeviceStatus, FleetLocation,
    RegistrationData, RoutePoint, TelemetryData, TimeRange,
};

// ---

/// Default record limit for alert searches.
const ALERT_SEARCH_LIMIT: u32 = 50;

/// Per-category loading flags. A consumer seeing a flag go low, high, low
/// should re-read the data rather than trust intermediate reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingFlags {
    pub devices: bool,
    pub telemetry: bool,
    pub locations: bool,
    pub analytics: bool,
    pub alerts: bool,
}

/// Immutable snapshot of the store's observable state.
///
/// Cloning is cheap: every collection is behind an `Arc` that is replaced,
/// never mutated in place.
#[derive(Clone, Default)]
pub struct FleetState {
    pub devices: Arc<Vec<Device>>,
    pub selected_device_id: Option<String>,
    pub telemetry_cache: Arc<HashMap<String, Arc<TelemetryData>>>,
    pub alerts_cache: Arc<HashMap<String, Arc<AlertSearchResult>>>,
    pub fleet_locations: Arc<Vec<FleetLocation>>,
    pub analytics: Option<Arc<AnalyticsSnapshot>>,
    pub time_range: TimeRange,
    pub selected_cargo_types: Vec<CargoType>,
    pub loading: LoadingFlags,
    pub error: Option<String>,
}

/// The one predicate deciding whether a device is "alerting", shared by the
/// badge counter and the alerts listing so the rule cannot drift.
pub fn device_has_alert(device: &Device) -> bool {
    let reported = device.alerts.is_some_and(|count| count > 0);
    let breaching = device
        .current_location
        .as_ref()
        .and_then(|loc| loc.temperature)
        .is_some_and(|temp| temp > device.alert_threshold);
    reported || breaching
}

impl FleetState {
    // Selectors: pure reads over a snapshot, no side effects.

    pub fn selected_device(&self) -> Option<&Device> {
        let id = self.selected_device_id.as_deref()?;
        self.devices.iter().find(|d| d.device_id == id)
    }

    pub fn selected_telemetry(&self) -> Option<&Arc<TelemetryData>> {
        let id = self.selected_device_id.as_deref()?;
        self.telemetry_cache.get(id)
    }

    pub fn telemetry_for(&self, device_id: &str) -> Option<&Arc<TelemetryData>> {
        self.telemetry_cache.get(device_id)
    }

    pub fn alerts_for(&self, device_id: &str) -> Option<&Arc<AlertSearchResult>> {
        self.alerts_cache.get(device_id)
    }

    /// Roster filtered by the active cargo-type filter set; an empty set
    /// means no filtering.
    pub fn filtered_devices(&self) -> Vec<&Device> {
        if self.selected_cargo_types.is_empty() {
            return self.devices.iter().collect();
        }
        self.devices
            .iter()
            .filter(|d| self.selected_cargo_types.contains(&d.cargo_type))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| d.status == DeviceStatus::Active)
            .count()
    }

    pub fn alert_count(&self) -> usize {
        self.devices.iter().filter(|d| device_has_alert(d)).count()
    }

    /// Devices currently alerting, for the Alerts view. Must use the same
    /// predicate as [`FleetState::alert_count`].
    pub fn alerting_devices(&self) -> Vec<&Device> {
        self.devices.iter().filter(|d| device_has_alert(d)).collect()
    }

    /// Hours of lookback matching the active time range.
    pub fn lookback_hours(&self) -> u32 {
        self.time_range.hours()
    }
}

// ---

/// Latest issued request generation per cache key. A response is applied
/// only while its generation is still current; anything older lost the
/// race and is discarded.
#[derive(Debug, Default)]
struct Generations {
    telemetry: HashMap<String, u64>,
    alerts: HashMap<String, u64>,
}

/// The reactive fleet state container.
pub struct FleetStore {
    api: Arc<dyn FleetApi>,
    state: RwLock<FleetState>,
    generations: Mutex<Generations>,
    changed: watch::Sender<u64>,
}

impl FleetStore {
    pub fn new(api: Arc<dyn FleetApi>) -> Self {
        let (changed, _) = watch::channel(0);
        FleetStore {
            api,
            state: RwLock::new(FleetState::default()),
            generations: Mutex::new(Generations::default()),
            changed,
        }
    }

    /// Current state snapshot. Cheap to clone; see [`FleetState`].
    pub fn snapshot(&self) -> FleetState {
        self.state.read().clone()
    }

    /// Subscribe to change notifications. The value is a bump counter;
    /// receivers should re-read a snapshot when it moves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    fn mutate(&self, apply: impl FnOnce(&mut FleetState)) {
        {
            let mut state = self.state.write();
            apply(&mut state);
        }
        self.changed.send_modify(|n| *n += 1);
    }

    // --- Actions ---

    /// Replace the device roster. On failure the previous roster is left
    /// untouched and only the error message is set.
    pub async fn fetch_devices(&self) -> Result<(), ApiError> {
        self.mutate(|s| {
            s.loading.devices = true;
            s.error = None;
        });
        match self.api.fetch_fleet().await {
            Ok(devices) => {
                tracing::info!(count = devices.len(), "fleet roster updated");
                self.mutate(|s| {
                    s.devices = Arc::new(devices);
                    s.loading.devices = false;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "fleet roster fetch failed");
                self.mutate(|s| {
                    s.error = Some(err.to_string());
                    s.loading.devices = false;
                });
                Err(err)
            }
        }
    }

    /// Fetch and cache one device's telemetry, replacing any prior entry
    /// for that key.
    ///
    /// Returns the not-registered error distinctly so the caller can
    /// navigate away; every other failure only sets the error message.
    /// A per-key generation guard drops responses that lost a race to a
    /// newer request for the same device.
    pub async fn fetch_telemetry(
        &self,
        device_id: &str,
        range: Option<TimeRange>,
    ) -> Result<(), ApiError> {
        let range = range.unwrap_or(self.state.read().time_range);
        let generation = {
            let mut generations = self.generations.lock();
            let slot = generations.telemetry.entry(device_id.to_string()).or_insert(0);
            *slot += 1;
            *slot
        };
        self.mutate(|s| {
            s.loading.telemetry = true;
            s.error = None;
        });

        let result = self.api.fetch_telemetry(device_id, range).await;

        let current = self
            .generations
            .lock()
            .telemetry
            .get(device_id)
            .copied()
            .unwrap_or(0);
        if current != generation {
            tracing::debug!(device_id, generation, current, "discarding stale telemetry response");
            return Ok(());
        }

        match result {
            Ok(data) => {
                self.mutate(|s| {
                    let mut cache = (*s.telemetry_cache).clone();
                    cache.insert(device_id.to_string(), Arc::new(data));
                    s.telemetry_cache = Arc::new(cache);
                    s.loading.telemetry = false;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(device_id, %err, "telemetry fetch failed");
                self.mutate(|s| {
                    s.error = Some(err.to_string());
                    s.loading.telemetry = false;
                });
                Err(err)
            }
        }
    }

    /// Fetch and cache one device's alert search results. Hours default to
    /// the active time range's window.
    pub async fn fetch_search_alerts(
        &self,
        device_id: &str,
        hours: Option<u32>,
    ) -> Result<(), ApiError> {
        let hours = hours.unwrap_or(self.state.read().time_range.hours());
        let generation = {
            let mut generations = self.generations.lock();
            let slot = generations.alerts.entry(device_id.to_string()).or_insert(0);
            *slot += 1;
            *slot
        };
        self.mutate(|s| {
            s.loading.alerts = true;
            s.error = None;
        });

        let result = self
            .api
            .search_alerts(device_id, hours, None, ALERT_SEARCH_LIMIT)
            .await;

        let current = self
            .generations
            .lock()
            .alerts
            .get(device_id)
            .copied()
            .unwrap_or(0);
        if current != generation {
            tracing::debug!(device_id, "discarding stale alert search response");
            return Ok(());
        }

        match result {
            Ok(data) => {
                self.mutate(|s| {
                    let mut cache = (*s.alerts_cache).clone();
                    cache.insert(device_id.to_string(), Arc::new(data));
                    s.alerts_cache = Arc::new(cache);
                    s.loading.alerts = false;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(device_id, %err, "alert search failed");
                self.mutate(|s| {
                    s.error = Some(err.to_string());
                    s.loading.alerts = false;
                });
                Err(err)
            }
        }
    }

    /// Fetch the live location feed and merge it into the roster by device
    /// id. Devices missing from the feed keep whatever location they had.
    pub async fn fetch_fleet_locations(&self) -> Result<(), ApiError> {
        self.mutate(|s| {
            s.loading.locations = true;
            s.error = None;
        });
        match self.api.fleet_locations().await {
            Ok(locations) => {
                self.mutate(|s| {
                    let merged: Vec<Device> = s
                        .devices
                        .iter()
                        .map(|device| {
                            let feed = locations
                                .iter()
                                .find(|l| l.device_id == device.device_id);
                            match feed {
                                Some(entry) => {
                                    let mut updated = device.clone();
                                    updated.current_location = Some(entry.as_current_location());
                                    updated
                                }
                                None => device.clone(),
                            }
                        })
                        .collect();
                    s.devices = Arc::new(merged);
                    s.fleet_locations = Arc::new(locations);
                    s.loading.locations = false;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "fleet locations fetch failed");
                self.mutate(|s| {
                    s.error = Some(err.to_string());
                    s.loading.locations = false;
                });
                Err(err)
            }
        }
    }

    /// Thin wrapper over the location history collaborator for callers that
    /// sequence their own fallback (see [`crate::route::reconstruct_route`]
    /// for the full reconstruction). Failure sets the error message and
    /// yields an empty route.
    pub async fn fetch_location_history(&self, device_id: &str, hours: u32) -> Vec<RoutePoint> {
        match self.api.location_history(device_id, hours).await {
            Ok(route) => route,
            Err(err) => {
                tracing::warn!(device_id, %err, "location history fetch failed");
                self.mutate(|s| s.error = Some(err.to_string()));
                Vec::new()
            }
        }
    }

    /// Fetch both analytics datasets concurrently and store them together.
    /// A failure in either aborts the combined update.
    pub async fn fetch_analytics(&self) -> Result<(), ApiError> {
        self.mutate(|s| {
            s.loading.analytics = true;
            s.error = None;
        });
        let combined = tokio::try_join!(self.api.fleet_analytics(), self.api.cargo_comparison());
        match combined {
            Ok((cargo_breakdown, time_series)) => {
                self.mutate(|s| {
                    s.analytics = Some(Arc::new(AnalyticsSnapshot {
                        cargo_breakdown,
                        time_series,
                    }));
                    s.loading.analytics = false;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "analytics fetch failed");
                self.mutate(|s| {
                    s.error = Some(err.to_string());
                    s.loading.analytics = false;
                });
                Err(err)
            }
        }
    }

    /// Submit a new device, then refresh the roster. The new device only
    /// becomes visible once the refetch resolves; there is no optimistic
    /// local insert.
    pub async fn register_device(&self, data: &RegistrationData) -> Result<Device, ApiError> {
        self.mutate(|s| s.error = None);
        if let Err(field_errors) = data.validate() {
            let message = field_errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            let err = ApiError::Validation(message);
            self.mutate(|s| s.error = Some(err.to_string()));
            return Err(err);
        }
        match self.api.register_device(data).await {
            Ok(created) => {
                tracing::info!(device_id = %created.device_id, "device registered");
                // Roster refresh failures surface through the store's own
                // error field; the registration itself succeeded.
                let _ = self.fetch_devices().await;
                Ok(created)
            }
            Err(err) => {
                self.mutate(|s| s.error = Some(err.to_string()));
                Err(err)
            }
        }
    }

    pub fn set_selected_device(&self, device_id: Option<&str>) {
        self.mutate(|s| s.selected_device_id = device_id.map(String::from));
    }

    /// Switch the active time range and, when a device is selected,
    /// immediately refetch its telemetry with the new range.
    pub async fn set_time_range(&self, range: TimeRange) {
        let selected = {
            let mut state = self.state.write();
            state.time_range = range;
            state.selected_device_id.clone()
        };
        self.changed.send_modify(|n| *n += 1);
        if let Some(device_id) = selected {
            // Failures already land in the error field
            let _ = self.fetch_telemetry(&device_id, Some(range)).await;
        }
    }

    /// Toggle one cargo type in the filter set; last write wins.
    pub fn toggle_cargo_filter(&self, cargo_type: CargoType) {
        self.mutate(|s| {
            if let Some(pos) = s.selected_cargo_types.iter().position(|c| *c == cargo_type) {
                s.selected_cargo_types.remove(pos);
            } else {
                s.selected_cargo_types.push(cargo_type);
            }
        });
    }

    pub fn clear_error(&self) {
        self.mutate(|s| s.error = None);
    }

    /// Drop the telemetry and alert caches. Entries repopulate on the next
    /// fetch; nothing expires on its own.
    pub fn clear_caches(&self) {
        tracing::debug!("clearing telemetry and alert caches");
        self.mutate(|s| {
            s.telemetry_cache = Arc::new(HashMap::new());
            s.alerts_cache = Arc::new(HashMap::new());
        });
    }

    /// Full refresh: roster first, then locations and analytics together,
    /// then the selected device's telemetry if any.
    pub async fn refresh_all(&self) {
        let _ = self.fetch_devices().await;
        let _ = tokio::join!(self.fetch_fleet_locations(), self.fetch_analytics());
        let selected = self.state.read().selected_device_id.clone();
        if let Some(device_id) = selected {
            let _ = self.fetch_telemetry(&device_id, None).await;
        }
    }
}
