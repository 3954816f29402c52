//! Serializable snapshot of a measurement session.

use super::session::MeasurementSession;
use super::types::MetricEntry;
use crate::core::{Result, Timestamp, UnitId};
use crate::counters::EventSet;
use crate::topology::Topology;
use serde::{Deserialize, Serialize};

/// Readings of one unit for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReport {
    /// Event name
    pub event: String,
    /// Stored history, oldest first
    pub entries: Vec<MetricEntry>,
    /// Value at the session's latest instant
    pub latest: i64,
}

/// Readings of one participating unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Hardware thread id
    pub unit: UnitId,
    /// Name of the unit's topology component
    pub component: String,
    /// Number of series that reference the unit
    pub refs: u32,
    /// Per event readings
    pub events: Vec<EventReport>,
}

/// Everything a session recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Event set the session wraps
    pub handle: EventSet,
    /// Whether the event set was still counting
    pub running: bool,
    /// Instant of the last stored reading
    pub latest_timestamp: Timestamp,
    /// Temporary entries are dropped by the next read
    pub pending_reset: bool,
    /// Per event, the sum over all units at the latest instant
    pub totals: Vec<(String, i64)>,
    /// Participating units in id order
    pub units: Vec<UnitReport>,
}

impl SessionReport {
    /// Snapshot `session`; component names are taken from `topology`
    pub fn capture(session: &MeasurementSession, topology: &Topology) -> Self {
        let names = session.event_names();
        let units = session
            .participants()
            .map(|(unit, node)| UnitReport {
                unit,
                component: topology
                    .get(node)
                    .map(|c| c.name().to_string())
                    .unwrap_or_default(),
                refs: session.reference_count(unit).unwrap_or_default(),
                events: names
                    .iter()
                    .filter_map(|&event| {
                        let series = session.all_metrics(event, unit)?;
                        Some(EventReport {
                            event: event.to_string(),
                            entries: series.entries().to_vec(),
                            latest: session.metric(event, Some(unit), None),
                        })
                    })
                    .collect(),
            })
            .collect();

        Self {
            handle: session.handle(),
            running: session.is_running(),
            latest_timestamp: session.latest_timestamp(),
            pending_reset: session.pending_reset(),
            totals: names
                .iter()
                .map(|&event| (event.to_string(), session.metric(event, None, None)))
                .collect(),
            units,
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
