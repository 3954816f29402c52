//! Stored counter readings.

use crate::core::{Timestamp, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One stored reading of an event on one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Logical instant the value belongs to
    pub timestamp: Timestamp,
    /// Counts attributed to the unit
    pub value: i64,
    /// Permanent entries are never modified or purged
    pub permanent: bool,
}

impl MetricEntry {
    pub fn new(timestamp: Timestamp, value: i64, permanent: bool) -> Self {
        Self {
            timestamp,
            value,
            permanent,
        }
    }
}

impl fmt::Display for MetricEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ timestamp: {}, value: {}", self.timestamp, self.value)?;
        if self.permanent {
            write!(f, ", permanent")?;
        }
        write!(f, " }}")
    }
}

/// Readings of one event on one unit, in insertion order.
///
/// Only the last entry may be temporary, and only the last entry is ever
/// changed in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetrics {
    unit: UnitId,
    entries: Vec<MetricEntry>,
}

impl UnitMetrics {
    pub(crate) fn new(unit: UnitId, first: MetricEntry) -> Self {
        Self {
            unit,
            entries: vec![first],
        }
    }

    /// Unit the readings were taken on
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// All readings, oldest first
    pub fn entries(&self) -> &[MetricEntry] {
        &self.entries
    }

    /// Most recent reading
    pub fn last(&self) -> Option<&MetricEntry> {
        self.entries.last()
    }

    /// Reading stored for the logical instant `timestamp`
    pub fn at(&self, timestamp: Timestamp) -> Option<&MetricEntry> {
        self.entries.iter().rev().find(|entry| entry.timestamp == timestamp)
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut MetricEntry> {
        self.entries.last_mut()
    }

    pub(crate) fn push(&mut self, entry: MetricEntry) {
        self.entries.push(entry);
    }

    /// Store a plain reading: a temporary last entry is replaced, a
    /// permanent one is kept and `entry` appended after it.
    pub(crate) fn overwrite(&mut self, entry: MetricEntry) {
        match self.entries.last_mut() {
            Some(last) if !last.permanent => *last = entry,
            _ => self.entries.push(entry),
        }
    }

    /// Drop the last entry if it is temporary. Returns true if nothing is
    /// left afterwards.
    pub(crate) fn purge_temporary(&mut self) -> bool {
        if self.entries.last().map_or(false, |last| !last.permanent) {
            self.entries.pop();
        }
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
