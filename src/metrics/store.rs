//! Event metric series of one measurement session.
//!
//! Series are keyed by event name, since event codes are backend specific.
//! Each series is a flat list of [`UnitMetrics`], one per unit that has
//! readings for the event.

use super::types::UnitMetrics;
use crate::core::{Timestamp, UnitId};
use ahash::AHashMap;

/// Event name to per-unit readings.
#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    series: AHashMap<String, Vec<UnitMetrics>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readings of `event` for every unit
    pub fn series(&self, event: &str) -> Option<&[UnitMetrics]> {
        self.series.get(event).map(Vec::as_slice)
    }

    pub(crate) fn series_mut(&mut self, event: &str) -> Option<&mut Vec<UnitMetrics>> {
        self.series.get_mut(event)
    }

    pub(crate) fn insert(&mut self, event: &str, metrics: UnitMetrics) {
        self.series.entry(event.to_string()).or_default().push(metrics);
    }

    /// Readings of `event` on `unit`
    pub fn unit_series(&self, event: &str, unit: UnitId) -> Option<&UnitMetrics> {
        self.series(event)?.iter().find(|metrics| metrics.unit() == unit)
    }

    /// Sum of the readings stored for `timestamp`, over every unit or only
    /// `unit`. Units without a reading at that instant count as zero.
    pub fn total(&self, event: &str, unit: Option<UnitId>, timestamp: Timestamp) -> i64 {
        let Some(series) = self.series(event) else {
            return 0;
        };

        let mut value = 0i64;
        for metrics in series {
            if unit.map_or(false, |unit| unit != metrics.unit()) {
                continue;
            }
            if let Some(entry) = metrics.at(timestamp) {
                value = value.saturating_add(entry.value);
            }
            if unit == Some(metrics.unit()) {
                break;
            }
        }
        value
    }

    /// Drop every temporary reading. Series left empty are removed and their
    /// unit returned, once per removed series.
    pub(crate) fn purge_temporary(&mut self) -> Vec<UnitId> {
        let mut emptied = Vec::new();
        self.series.retain(|_, series| {
            series.retain_mut(|metrics| {
                if metrics.purge_temporary() {
                    emptied.push(metrics.unit());
                    false
                } else {
                    true
                }
            });
            !series.is_empty()
        });
        emptied
    }

    /// Event names, sorted
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.series.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of events with readings
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
