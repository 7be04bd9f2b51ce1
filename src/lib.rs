//! Client-side telemetry state and derivation engine for a cold-chain
//! vehicle fleet.
//!
//! The crate caches per-device telemetry and alert data fetched from a
//! remote telemetry API, merges the asynchronous feeds (fleet roster, live
//! locations, historical telemetry, alert search results) into a consistent
//! view model, and reconstructs route history with geodesic statistics.
//! Rendering is someone else's job: everything here produces plain data.
//!
//! Layout:
//! - [`models`] – wire shapes and enums shared by every module
//! - [`derive`] – pure derivation rules (status, trend, theft risk, stats)
//! - [`alerts`] – merges system and server alerts into one bounded list
//! - [`route`]  – route reconstruction with source fallback and haversine
//!   distance/speed summarization
//! - [`api`]    – the remote collaborators behind an injectable trait
//! - [`store`]  – the reactive state container orchestrating the fetches
//! - [`config`] – environment-driven configuration

pub mod alerts;
pub mod api;
pub mod config;
pub mod derive;
pub mod models;
pub mod route;
pub mod store;

pub use api::{ApiError, FleetApi, HttpFleetApi};
pub use config::Config;
pub use models::{
    AlertSearchResult, AnalyticsSnapshot, CargoSensitivity, CargoType, Device, DeviceStatus,
    RegistrationData, RiskScore, RoutePoint, TelemetryData, TelemetryPoint, TimeRange,
};
pub use route::{reconstruct_route, RouteOutcome, RouteProvenance, RouteSummary};
pub use store::{device_has_alert, FleetState, FleetStore, LoadingFlags};
