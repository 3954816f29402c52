//! Readings seen from one hardware thread.
//!
//! Sessions store readings per event set. [`UnitView`] answers the opposite
//! question: which event sets have readings for this thread, and what are
//! they.

use super::session::MeasurementSession;
use crate::core::{Result, Timestamp, TopoError, UnitId};
use crate::counters::EventSet;
use crate::topology::{ComponentKind, NodeId, Topology};
use std::io::{self, Write};

/// The sessions observing one `Thread` component.
#[derive(Debug)]
pub struct UnitView<'a> {
    name: &'a str,
    node: NodeId,
    unit: UnitId,
    sessions: Vec<&'a MeasurementSession>,
}

impl<'a> UnitView<'a> {
    /// Collect the sessions among `sessions` that hold readings for `node`
    pub fn new<I>(topology: &'a Topology, node: NodeId, sessions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a MeasurementSession>,
    {
        let component = topology
            .get(node)
            .ok_or_else(|| TopoError::invalid_argument(format!("{:?} is not part of the topology", node)))?;
        if component.kind() != ComponentKind::Thread {
            return Err(TopoError::invalid_argument(format!(
                "{} {} is not a hardware thread",
                component.kind(),
                component.id()
            )));
        }

        Ok(Self {
            name: component.name(),
            node,
            unit: UnitId::new(component.id()),
            sessions: sessions.into_iter().filter(|s| s.observes(node)).collect(),
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Sessions with readings for this thread
    pub fn sessions(&self) -> &[&'a MeasurementSession] {
        &self.sessions
    }

    /// Session bound to `set`, if it has readings for this thread
    pub fn session(&self, set: EventSet) -> Option<&'a MeasurementSession> {
        self.sessions.iter().copied().find(|s| s.handle() == set)
    }

    /// Event sets with readings for this thread
    pub fn event_sets(&self) -> Vec<EventSet> {
        let mut sets: Vec<EventSet> = self.sessions.iter().map(|s| s.handle()).collect();
        sets.sort_unstable();
        sets.dedup();
        sets
    }

    /// Reading of `event` from `set` on this thread at `at` (default: the
    /// session's latest instant), zero if there is none
    pub fn metric(&self, event: &str, set: EventSet, at: Option<Timestamp>) -> i64 {
        self.session(set)
            .map_or(0, |session| session.metric(event, Some(self.unit), at))
    }

    /// Write the readings of this thread, from `set` only or from every
    /// event set
    pub fn print<W: Write>(&self, set: Option<EventSet>, out: &mut W) -> io::Result<()> {
        for session in &self.sessions {
            if set.map_or(false, |set| set != session.handle()) {
                continue;
            }
            writeln!(out, "event set {} on {}:", session.handle(), self.name)?;
            for event in session.event_names() {
                let Some(series) = session.all_metrics(event, self.unit) else {
                    continue;
                };
                writeln!(out, "  {}:", event)?;
                for entry in series.entries() {
                    writeln!(out, "    {}", entry)?;
                }
            }
        }
        Ok(())
    }
}
