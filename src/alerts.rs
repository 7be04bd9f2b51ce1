//! Alert aggregation for a device's dashboard view.
//!
//! Two feeds merge into one bounded list: system alerts synthesized from
//! the live reading (temperature breach, theft risk) and server alert
//! records from the alert search endpoint. System alerts always come first
//! regardless of timestamp, then the list is capped. No de-duplication or
//! chronological re-sort is performed.

use chrono::{DateTime, Utc};

use crate::derive::{is_temperature_breached, theft_risk};
use crate::models::{AlertGroup, CurrentReading, TempThresholds};

// ---

/// Maximum number of alerts shown on a dashboard.
pub const MAX_DASHBOARD_ALERTS: usize = 10;

/// Render category of a dashboard alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Critical,
    Warning,
    Security,
    Info,
}

/// Map a server severity label to a render category. Unknown and missing
/// severities degrade to info rather than failing.
pub fn alert_kind(severity: Option<&str>) -> AlertKind {
    match severity {
        Some("CRITICAL") => AlertKind::Critical,
        Some("WARNING") => AlertKind::Warning,
        Some("SECURITY") => AlertKind::Security,
        _ => AlertKind::Info,
    }
}

/// One alert row bound for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardAlert {
    pub id: String,
    pub kind: AlertKind,
    pub message: String,
    /// Absent recommendations simply omit that line from the rendered row.
    pub recommendation: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ---

/// Synthesize system alerts from the live reading, timestamped now.
pub fn system_alerts(
    current: &CurrentReading,
    thresholds: &TempThresholds,
    now: DateTime<Utc>,
) -> Vec<DashboardAlert> {
    let mut alerts = Vec::new();
    if let Some(temp) = current.temperature {
        if is_temperature_breached(temp, thresholds.max) {
            alerts.push(DashboardAlert {
                id: "temp-breach".to_string(),
                kind: AlertKind::Critical,
                message: format!(
                    "TEMP BREACH: Current {}°C exceeds max {}°C",
                    temp, thresholds.max
                ),
                recommendation: None,
                timestamp: Some(now),
            });
        }
    }
    let speed = current.gps_speed.unwrap_or(0.0);
    if theft_risk(current.door_open, speed) {
        alerts.push(DashboardAlert {
            id: "theft-risk".to_string(),
            kind: AlertKind::Security,
            message: format!("THEFT RISK: Door open while vehicle moving at {speed} km/h"),
            recommendation: None,
            timestamp: Some(now),
        });
    }
    alerts
}

/// Merge system alerts with expanded server alert groups into one bounded
/// list, system alerts first.
pub fn aggregate(
    system: Vec<DashboardAlert>,
    server_groups: &[AlertGroup],
    cap: usize,
) -> Vec<DashboardAlert> {
    let mut merged = system;
    for group in server_groups {
        for (idx, item) in group.alerts.iter().enumerate() {
            let id = match group.alert_timestamp {
                Some(ts) => format!("{}-{idx}", ts.to_rfc3339()),
                None => format!("server-{idx}"),
            };
            merged.push(DashboardAlert {
                id,
                kind: alert_kind(item.severity.as_deref()),
                message: item.message.clone(),
                recommendation: item.recommendation.clone(),
                timestamp: group.alert_timestamp,
            });
        }
    }
    merged.truncate(cap);
    merged
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::AlertItem;
    use chrono::TimeZone;

    fn group(ts: Option<DateTime<Utc>>, items: Vec<(&str, &str)>) -> AlertGroup {
        // ---
        AlertGroup {
            device_id: Some("SCCIM_001".to_string()),
            alert_timestamp: ts,
            cargo_type: None,
            alerts: items
                .into_iter()
                .map(|(severity, message)| AlertItem {
                    alert_type: None,
                    severity: Some(severity.to_string()),
                    message: message.to_string(),
                    recommendation: None,
                })
                .collect(),
        }
    }

    #[test]
    fn severity_mapping_defaults_to_info() {
        // ---
        assert_eq!(alert_kind(Some("CRITICAL")), AlertKind::Critical);
        assert_eq!(alert_kind(Some("WARNING")), AlertKind::Warning);
        assert_eq!(alert_kind(Some("SECURITY")), AlertKind::Security);
        assert_eq!(alert_kind(Some("NOTICE")), AlertKind::Info);
        assert_eq!(alert_kind(None), AlertKind::Info);
    }

    #[test]
    fn system_alerts_for_breach_and_theft() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 3, 26, 12, 0, 0).unwrap();
        let current = CurrentReading {
            temperature: Some(9.5),
            door_open: true,
            gps_speed: Some(42.0),
            ..CurrentReading::default()
        };
        let thresholds = TempThresholds { min: -25.0, max: 8.0 };
        let alerts = system_alerts(&current, &thresholds, now);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::Critical);
        assert!(alerts[0].message.starts_with("TEMP BREACH"));
        assert_eq!(alerts[1].kind, AlertKind::Security);
        assert!(alerts[1].message.contains("42 km/h"));
    }

    #[test]
    fn nominal_reading_produces_no_system_alerts() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 3, 26, 12, 0, 0).unwrap();
        let current = CurrentReading {
            temperature: Some(3.0),
            door_open: true,
            gps_speed: Some(0.0),
            ..CurrentReading::default()
        };
        let thresholds = TempThresholds::default();
        assert!(system_alerts(&current, &thresholds, now).is_empty());
    }

    #[test]
    fn system_alerts_come_before_server_alerts() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 3, 26, 12, 0, 0).unwrap();
        let system = vec![DashboardAlert {
            id: "temp-breach".to_string(),
            kind: AlertKind::Critical,
            message: "TEMP BREACH".to_string(),
            recommendation: None,
            timestamp: Some(now),
        }];
        // 2 groups, 3 individual alerts, all older than "now" yet listed after
        let older = Utc.with_ymd_and_hms(2025, 3, 26, 8, 0, 0).unwrap();
        let groups = vec![
            group(Some(older), vec![("WARNING", "Door ajar"), ("CRITICAL", "Temp spike")]),
            group(Some(older), vec![("SECURITY", "Unexpected stop")]),
        ];
        let merged = aggregate(system, &groups, MAX_DASHBOARD_ALERTS);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[0].id, "temp-breach");
        assert_eq!(merged[1].kind, AlertKind::Warning);
        assert_eq!(merged[2].kind, AlertKind::Critical);
        assert_eq!(merged[3].kind, AlertKind::Security);
    }

    #[test]
    fn aggregate_caps_at_limit() {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 3, 26, 8, 0, 0).unwrap();
        let groups: Vec<AlertGroup> = (0..6)
            .map(|_| group(Some(ts), vec![("WARNING", "a"), ("WARNING", "b"), ("WARNING", "c")]))
            .collect();
        let merged = aggregate(Vec::new(), &groups, MAX_DASHBOARD_ALERTS);
        assert_eq!(merged.len(), MAX_DASHBOARD_ALERTS);
    }

    #[test]
    fn aggregate_tolerates_missing_fields() {
        // ---
        let bare = AlertGroup {
            device_id: None,
            alert_timestamp: None,
            cargo_type: None,
            alerts: vec![AlertItem {
                alert_type: None,
                severity: None,
                message: String::new(),
                recommendation: None,
            }],
        };
        let merged = aggregate(Vec::new(), &[bare], MAX_DASHBOARD_ALERTS);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, AlertKind::Info);
        assert!(merged[0].recommendation.is_none());
        assert!(merged[0].timestamp.is_none());
    }
}
