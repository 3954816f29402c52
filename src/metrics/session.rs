//! Measurement sessions.
//!
//! A [`MeasurementSession`] follows one counter event set and records every
//! reading taken through it, per event and per execution unit. Readings are
//! attributed to the `Thread` component of the topology the event set
//! reports from at the time of the call.
//!
//! Every fallible step (event names, reporting unit, topology lookup) runs
//! before the backend primitive, so a failed call leaves both the backend
//! and the session untouched. Once the backend call succeeds the values are
//! always committed.
//!
//! Sessions carry no locking. The supported pattern is one session per unit,
//! each driven from one thread; a session may move to another thread but
//! cannot be shared between threads:
//!
//! ```
//! fn assert_send<T: Send>() {}
//! assert_send::<topoperf_lib::metrics::MeasurementSession>();
//! ```
//!
//! ```compile_fail
//! fn assert_sync<T: Sync>() {}
//! assert_sync::<topoperf_lib::metrics::MeasurementSession>();
//! ```

use super::accounting::{Ledger, Participant, Reading};
use super::store::MetricStore;
use super::types::UnitMetrics;
use crate::core::clock::next_instant;
use crate::core::{Result, Timestamp, TopoError, UnitId};
use crate::counters::{status, BackendError, CounterSource, CounterValues, EventSet};
use crate::topology::{ComponentKind, NodeId, Topology};
use std::cell::Cell;
use std::io::{self, Write};
use std::marker::PhantomData;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Read,
    Accumulate,
    Stop,
}

impl Primitive {
    fn as_str(self) -> &'static str {
        match self {
            Primitive::Read => "read",
            Primitive::Accumulate => "accumulate",
            Primitive::Stop => "stop",
        }
    }
}

/// History of the readings of one event set.
#[derive(Debug)]
pub struct MeasurementSession {
    handle: EventSet,
    running: bool,
    ledger: Ledger,
    _not_sync: PhantomData<Cell<()>>,
}

impl MeasurementSession {
    fn new(handle: EventSet) -> Self {
        let mut ledger = Ledger::new();
        ledger.request_reset();
        Self {
            handle,
            running: true,
            ledger,
            _not_sync: PhantomData,
        }
    }

    /// Start counting on `handle`.
    ///
    /// An empty `slot` receives a new session. A session already in `slot`
    /// is rebound to `handle`; its temporary readings are purged on the next
    /// read since starting zeroes the counters.
    pub fn start<S>(source: &S, handle: EventSet, slot: &mut Option<Self>) -> Result<()>
    where
        S: CounterSource + ?Sized,
    {
        source.start(handle)?;
        match slot {
            Some(session) => {
                session.handle = handle;
                session.running = true;
                session.ledger.request_reset();
                debug!(handle = %handle, "measurement session restarted");
            }
            None => {
                *slot = Some(Self::new(handle));
                debug!(handle = %handle, "measurement session created");
            }
        }
        Ok(())
    }

    /// Zero the counters of the bound event set
    pub fn reset<S>(&mut self, source: &S) -> Result<()>
    where
        S: CounterSource + ?Sized,
    {
        source.reset(self.handle)?;
        self.ledger.request_reset();
        debug!(handle = %self.handle, "measurement session reset");
        Ok(())
    }

    /// Read the counters and attribute them to the reporting unit.
    ///
    /// Returns the logical instant the readings were stored under.
    pub fn read<S>(&mut self, source: &S, topology: &Topology, root: NodeId, permanent: bool) -> Result<Timestamp>
    where
        S: CounterSource + ?Sized,
    {
        self.observe(source, topology, root, Primitive::Read, permanent)
    }

    /// Accumulate the counters (which zeroes them) and attribute the deltas
    /// to the reporting unit.
    pub fn accumulate<S>(
        &mut self,
        source: &S,
        topology: &Topology,
        root: NodeId,
        permanent: bool,
    ) -> Result<Timestamp>
    where
        S: CounterSource + ?Sized,
    {
        self.observe(source, topology, root, Primitive::Accumulate, permanent)
    }

    /// Stop the event set and store its final values. Later reads fail until
    /// the session is started again.
    pub fn stop<S>(&mut self, source: &S, topology: &Topology, root: NodeId, permanent: bool) -> Result<Timestamp>
    where
        S: CounterSource + ?Sized,
    {
        self.observe(source, topology, root, Primitive::Stop, permanent)
    }

    /// Store values obtained outside the session, one per event of the bound
    /// event set, exactly like a read would.
    pub fn record<S>(
        &mut self,
        source: &S,
        topology: &Topology,
        root: NodeId,
        values: &[i64],
        permanent: bool,
    ) -> Result<Timestamp>
    where
        S: CounterSource + ?Sized,
    {
        let names = self.event_names_of(source)?;
        if names.len() != values.len() {
            return Err(TopoError::invalid_argument(format!(
                "event set {} has {} events, got {} values",
                self.handle,
                names.len(),
                values.len()
            )));
        }
        let (unit, node) = self.locate(source, topology, root)?;
        let readings = pair(names, values);
        Ok(self.commit(Primitive::Read, unit, node, &readings, permanent))
    }

    fn observe<S>(
        &mut self,
        source: &S,
        topology: &Topology,
        root: NodeId,
        primitive: Primitive,
        permanent: bool,
    ) -> Result<Timestamp>
    where
        S: CounterSource + ?Sized,
    {
        let names = self.event_names_of(source)?;
        let (unit, node) = self.locate(source, topology, root)?;

        let values: CounterValues = match primitive {
            Primitive::Read => source.read(self.handle)?,
            Primitive::Accumulate => source.accumulate(self.handle)?,
            Primitive::Stop => source.stop(self.handle)?,
        };
        if primitive == Primitive::Stop {
            self.running = false;
        }
        if values.len() != names.len() {
            return Err(BackendError::new(
                status::EMISC,
                format!("{} returned {} values for {} events", primitive.as_str(), values.len(), names.len()),
            )
            .into());
        }

        let readings = pair(names, &values);
        Ok(self.commit(primitive, unit, node, &readings, permanent))
    }

    fn event_names_of<S>(&self, source: &S) -> Result<Vec<String>>
    where
        S: CounterSource + ?Sized,
    {
        let codes = source.list_events(self.handle)?;
        if codes.is_empty() {
            return Err(TopoError::invalid_argument(format!("event set {} has no events", self.handle)));
        }
        codes
            .into_iter()
            .map(|code| {
                source.event_name(code).map_err(|e| {
                    TopoError::invalid_argument(format!("no name for event {}: {}", code, e))
                })
            })
            .collect()
    }

    fn locate<S>(&self, source: &S, topology: &Topology, root: NodeId) -> Result<(UnitId, NodeId)>
    where
        S: CounterSource + ?Sized,
    {
        let unit = source.current_unit(self.handle)?;
        let node = topology.find(root, unit.get(), ComponentKind::Thread).ok_or_else(|| {
            TopoError::invalid_argument(format!("no hardware thread {} in the topology", unit))
        })?;
        Ok((unit, node))
    }

    fn commit(
        &mut self,
        primitive: Primitive,
        unit: UnitId,
        node: NodeId,
        readings: &[Reading],
        permanent: bool,
    ) -> Timestamp {
        let ts = next_instant(self.ledger.latest());
        match primitive {
            Primitive::Accumulate => self.ledger.store_accumulate(unit, node, ts, readings, permanent),
            Primitive::Read | Primitive::Stop => self.ledger.store_read(unit, node, ts, readings, permanent),
        }
        debug!(
            handle = %self.handle,
            op = primitive.as_str(),
            unit = %unit,
            ts,
            permanent,
            events = readings.len(),
            "counters stored"
        );
        ts
    }

    /// Sum of the readings of `event` at `at` (default: the latest instant),
    /// over all units or only `unit`. Missing data reads as zero.
    pub fn metric(&self, event: &str, unit: Option<UnitId>, at: Option<Timestamp>) -> i64 {
        let at = at.unwrap_or_else(|| self.ledger.latest());
        self.ledger.store().total(event, unit, at)
    }

    /// Every reading of `event` on `unit`
    pub fn all_metrics(&self, event: &str, unit: UnitId) -> Option<&UnitMetrics> {
        self.ledger.store().unit_series(event, unit)
    }

    /// Write every reading, grouped by unit and event
    pub fn print_all<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let names = self.event_names();
        for unit in self.units() {
            writeln!(out, "metrics on unit {}:", unit)?;
            for &name in &names {
                let Some(series) = self.all_metrics(name, unit) else {
                    continue;
                };
                writeln!(out, "  {}:", name)?;
                for entry in series.entries() {
                    writeln!(out, "    {}", entry)?;
                }
            }
        }
        Ok(())
    }

    /// Units that currently hold readings, ascending
    pub fn units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.ledger.participants().keys().copied()
    }

    /// Units with their topology component
    pub fn participants(&self) -> impl Iterator<Item = (UnitId, NodeId)> + '_ {
        self.ledger.participants().iter().map(|(&unit, p)| (unit, p.node))
    }

    /// Whether the session holds readings for the component `node`
    pub fn observes(&self, node: NodeId) -> bool {
        self.ledger.participants().values().any(|p| p.node == node)
    }

    /// Number of (event, unit) series stored for `unit`
    pub fn reference_count(&self, unit: UnitId) -> Option<u32> {
        self.ledger.participants().get(&unit).map(|p: &Participant| p.refs)
    }

    /// Whether the bound event set was started and not stopped since
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn handle(&self) -> EventSet {
        self.handle
    }

    pub fn latest_timestamp(&self) -> Timestamp {
        self.ledger.latest()
    }

    pub fn pending_reset(&self) -> bool {
        self.ledger.pending_reset()
    }

    /// Names of the events with readings, sorted
    pub fn event_names(&self) -> Vec<&str> {
        self.ledger.store().event_names()
    }

    pub fn store(&self) -> &MetricStore {
        self.ledger.store()
    }

    /// Drop the session and all of its readings. The event set itself is
    /// left to its owner.
    pub fn delete(self) {
        debug!(handle = %self.handle, units = self.ledger.participants().len(), "measurement session deleted");
    }
}

fn pair(names: Vec<String>, values: &[i64]) -> Vec<Reading> {
    names
        .into_iter()
        .zip(values)
        .map(|(event, &value)| Reading { event, value })
        .collect()
}
