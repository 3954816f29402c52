//! Attribution of raw counter values to execution units.
//!
//! One event set can report from different units over its lifetime (the
//! counted thread migrates, or the set is attached to a task scheduled on
//! several CPUs). Each call hands a whole set of raw values to the
//! [`Ledger`] together with the unit reporting *now*; the ledger decides how
//! much of every value belongs to that unit and how much was already
//! attributed to other units at the previous logical instant.
//!
//! Reads and stops see cumulative values. Every temporary reading that a
//! sibling unit holds at the previous instant is part of the new raw value,
//! so it is subtracted and carried forward to the new instant.
//!
//! Accumulates see deltas. Permanent sibling readings at the previous
//! instant are added to the reporting unit's value; temporary sibling
//! readings are only carried forward. The two rules are not symmetric.

use super::store::MetricStore;
use super::types::{MetricEntry, UnitMetrics};
use crate::core::{Timestamp, UnitId};
use crate::topology::NodeId;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// A unit that has contributed readings to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Participant {
    /// Topology component of the unit
    pub node: NodeId,
    /// Number of (event, unit) series still stored for the unit
    pub refs: u32,
}

/// One raw counter value, named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub event: String,
    pub value: i64,
}

impl Reading {
    pub fn new(event: impl Into<String>, value: i64) -> Self {
        Self {
            event: event.into(),
            value,
        }
    }
}

/// Accounting state of one measurement session.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    store: MetricStore,
    participants: BTreeMap<UnitId, Participant>,
    latest: Timestamp,
    pending_reset: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    pub fn participants(&self) -> &BTreeMap<UnitId, Participant> {
        &self.participants
    }

    pub fn latest(&self) -> Timestamp {
        self.latest
    }

    pub fn pending_reset(&self) -> bool {
        self.pending_reset
    }

    /// Mark stored temporary readings as stale: the next read purges them.
    pub fn request_reset(&mut self) {
        self.pending_reset = true;
    }

    /// Store cumulative values, as returned by a read or stop.
    pub fn store_read(
        &mut self,
        unit: UnitId,
        node: NodeId,
        ts: Timestamp,
        readings: &[Reading],
        permanent: bool,
    ) {
        if self.pending_reset {
            self.purge();
            self.pending_reset = false;
        }
        self.enlist(unit, node);

        let previous = self.latest;
        for reading in readings {
            let entry_for = |value| MetricEntry::new(ts, value, permanent);
            let Some(series) = self.store.series_mut(&reading.event) else {
                self.store.insert(&reading.event, UnitMetrics::new(unit, entry_for(reading.value)));
                retain(&mut self.participants, unit);
                continue;
            };

            let mut sum = 0i64;
            let mut own = None;
            for (index, metrics) in series.iter_mut().enumerate() {
                if metrics.unit() == unit {
                    own = Some(index);
                    continue;
                }
                if let Some(last) = metrics.last_mut() {
                    if last.timestamp == previous && !last.permanent {
                        sum = sum.saturating_add(last.value);
                        last.timestamp = ts;
                    }
                }
            }

            let entry = entry_for(reading.value.saturating_sub(sum));
            trace!(event = %reading.event, unit = %unit, raw = reading.value, sum, value = entry.value, "store read");
            match own {
                Some(index) => series[index].overwrite(entry),
                None => {
                    series.push(UnitMetrics::new(unit, entry));
                    retain(&mut self.participants, unit);
                }
            }
        }

        self.latest = ts;
    }

    /// Store deltas, as returned by an accumulate. The next read purges
    /// temporary readings afterwards.
    pub fn store_accumulate(
        &mut self,
        unit: UnitId,
        node: NodeId,
        ts: Timestamp,
        readings: &[Reading],
        permanent: bool,
    ) {
        self.pending_reset = true;
        self.enlist(unit, node);

        let previous = self.latest;
        for reading in readings {
            let Some(series) = self.store.series_mut(&reading.event) else {
                self.store.insert(
                    &reading.event,
                    UnitMetrics::new(unit, MetricEntry::new(ts, reading.value, permanent)),
                );
                retain(&mut self.participants, unit);
                continue;
            };

            let mut sum = 0i64;
            let mut own = None;
            for (index, metrics) in series.iter_mut().enumerate() {
                if metrics.unit() == unit {
                    own = Some(index);
                    continue;
                }
                if let Some(last) = metrics.last_mut() {
                    if last.timestamp == previous {
                        if last.permanent {
                            sum = sum.saturating_add(last.value);
                        } else {
                            last.timestamp = ts;
                        }
                    }
                }
            }

            let value = reading.value.saturating_add(sum);
            trace!(event = %reading.event, unit = %unit, raw = reading.value, sum, "store accumulate");
            let Some(own) = own.map(|index| &mut series[index]) else {
                series.push(UnitMetrics::new(unit, MetricEntry::new(ts, value, permanent)));
                retain(&mut self.participants, unit);
                continue;
            };

            let carried = match own.last_mut() {
                Some(last) if !last.permanent => {
                    last.timestamp = ts;
                    last.value = last.value.saturating_add(value);
                    last.permanent = permanent;
                    continue;
                }
                Some(last) if last.timestamp == previous => last.value,
                _ => 0,
            };
            own.push(MetricEntry::new(ts, value.saturating_add(carried), permanent));
        }

        self.latest = ts;
    }

    fn enlist(&mut self, unit: UnitId, node: NodeId) {
        self.participants.entry(unit).or_insert_with(|| {
            debug!(unit = %unit, "unit joins session");
            Participant { node, refs: 0 }
        });
    }

    fn purge(&mut self) {
        for unit in self.store.purge_temporary() {
            let Some(participant) = self.participants.get_mut(&unit) else {
                continue;
            };
            if participant.refs <= 1 {
                self.participants.remove(&unit);
                debug!(unit = %unit, "unit evicted from session");
            } else {
                participant.refs -= 1;
            }
        }
    }
}

fn retain(participants: &mut BTreeMap<UnitId, Participant>, unit: UnitId) {
    if let Some(participant) = participants.get_mut(&unit) {
        participant.refs += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ComponentKind, Topology};
    use pretty_assertions::assert_eq;

    const A: UnitId = UnitId::new(0);
    const B: UnitId = UnitId::new(1);
    const C: UnitId = UnitId::new(2);

    fn node(unit: UnitId) -> NodeId {
        let (topology, root) = Topology::uniform(1, 4, 1);
        topology.find(root, unit.get(), ComponentKind::Thread).unwrap()
    }

    fn ins(value: i64) -> Vec<Reading> {
        vec![Reading::new("TOT_INS", value)]
    }

    fn entries(ledger: &Ledger, unit: UnitId) -> Vec<MetricEntry> {
        ledger
            .store()
            .unit_series("TOT_INS", unit)
            .map(|m| m.entries().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn test_read_overwrites_temporary_entry() {
        let mut ledger = Ledger::new();
        ledger.store_read(A, node(A), 1, &ins(10), false);
        ledger.store_read(A, node(A), 2, &ins(25), false);

        assert_eq!(entries(&ledger, A), vec![MetricEntry::new(2, 25, false)]);
        assert_eq!(ledger.store().total("TOT_INS", None, 2), 25);
        assert_eq!(ledger.participants()[&A].refs, 1);
    }

    #[test]
    fn test_read_subtracts_live_siblings() {
        let mut ledger = Ledger::new();
        ledger.store_read(A, node(A), 1, &ins(10), false);
        ledger.store_read(B, node(B), 2, &ins(25), false);
        ledger.store_read(C, node(C), 3, &ins(40), false);

        assert_eq!(entries(&ledger, A), vec![MetricEntry::new(3, 10, false)]);
        assert_eq!(entries(&ledger, B), vec![MetricEntry::new(3, 15, false)]);
        assert_eq!(entries(&ledger, C), vec![MetricEntry::new(3, 15, false)]);
        assert_eq!(ledger.store().total("TOT_INS", None, 3), 40);

        // back on A: A owns everything not held by B and C
        ledger.store_read(A, node(A), 4, &ins(50), false);
        assert_eq!(entries(&ledger, A), vec![MetricEntry::new(4, 20, false)]);
        assert_eq!(ledger.store().total("TOT_INS", None, 4), 50);
        assert_eq!(ledger.participants().len(), 3);
    }

    #[test]
    fn test_read_ignores_permanent_siblings() {
        let mut ledger = Ledger::new();
        ledger.store_read(A, node(A), 1, &ins(10), true);
        ledger.store_read(B, node(B), 2, &ins(25), false);

        assert_eq!(entries(&ledger, A), vec![MetricEntry::new(1, 10, true)]);
        assert_eq!(entries(&ledger, B), vec![MetricEntry::new(2, 25, false)]);
    }

    #[test]
    fn test_permanent_entry_is_followed_not_changed() {
        let mut ledger = Ledger::new();
        ledger.store_read(A, node(A), 1, &ins(10), true);
        ledger.store_read(A, node(A), 2, &ins(12), false);
        ledger.store_read(A, node(A), 3, &ins(14), false);

        assert_eq!(
            entries(&ledger, A),
            vec![MetricEntry::new(1, 10, true), MetricEntry::new(3, 14, false)]
        );
    }

    #[test]
    fn test_accumulate_sums_deltas() {
        let mut ledger = Ledger::new();
        ledger.store_accumulate(A, node(A), 1, &ins(10), false);
        ledger.store_accumulate(A, node(A), 2, &ins(5), false);

        assert_eq!(entries(&ledger, A), vec![MetricEntry::new(2, 15, false)]);
        assert!(ledger.pending_reset());
    }

    #[test]
    fn test_accumulate_carries_temporary_siblings() {
        let mut ledger = Ledger::new();
        ledger.store_accumulate(A, node(A), 1, &ins(10), false);
        ledger.store_accumulate(B, node(B), 2, &ins(4), false);

        assert_eq!(entries(&ledger, A), vec![MetricEntry::new(2, 10, false)]);
        assert_eq!(entries(&ledger, B), vec![MetricEntry::new(2, 4, false)]);
        assert_eq!(ledger.store().total("TOT_INS", None, 2), 14);
    }

    #[test]
    fn test_accumulate_absorbs_permanent_siblings() {
        let mut ledger = Ledger::new();
        ledger.store_accumulate(A, node(A), 1, &ins(10), true);
        ledger.store_accumulate(B, node(B), 2, &ins(4), false);

        assert_eq!(entries(&ledger, A), vec![MetricEntry::new(1, 10, true)]);
        assert_eq!(entries(&ledger, B), vec![MetricEntry::new(2, 14, false)]);
        assert_eq!(ledger.store().total("TOT_INS", None, 2), 14);
    }

    #[test]
    fn test_accumulate_continues_own_permanent_total() {
        let mut ledger = Ledger::new();
        ledger.store_accumulate(A, node(A), 1, &ins(10), true);
        ledger.store_accumulate(A, node(A), 2, &ins(5), true);

        assert_eq!(
            entries(&ledger, A),
            vec![MetricEntry::new(1, 10, true), MetricEntry::new(2, 15, true)]
        );
    }

    #[test]
    fn test_reset_purges_and_evicts() {
        let mut ledger = Ledger::new();
        ledger.store_read(A, node(A), 1, &ins(10), true);
        ledger.store_read(B, node(B), 2, &ins(25), false);
        ledger.request_reset();

        ledger.store_read(A, node(A), 3, &ins(3), false);
        assert!(!ledger.pending_reset());
        assert!(ledger.participants().get(&B).is_none());
        assert!(ledger.store().unit_series("TOT_INS", B).is_none());
        assert_eq!(
            entries(&ledger, A),
            vec![MetricEntry::new(1, 10, true), MetricEntry::new(3, 3, false)]
        );
    }

    #[test]
    fn test_refs_count_series_per_event() {
        let mut ledger = Ledger::new();
        let both = vec![Reading::new("TOT_INS", 1), Reading::new("TOT_CYC", 2)];
        ledger.store_read(A, node(A), 1, &both, false);
        assert_eq!(ledger.participants()[&A].refs, 2);

        ledger.request_reset();
        ledger.store_read(B, node(B), 2, &both, false);
        assert!(ledger.participants().get(&A).is_none());
        assert_eq!(ledger.participants()[&B].refs, 2);
    }
}
