//! Common test utilities and fixtures.

#![allow(dead_code)]

use topoperf_lib::core::{Timestamp, UnitId};
use topoperf_lib::counters::{EventSet, SimulatedSource};
use topoperf_lib::metrics::{MeasurementSession, MetricEntry};
use topoperf_lib::topology::{NodeId, Topology};

/// How a rig takes its intermediate readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Accumulate,
    Stop,
}

/// A started session on the simulated backend with a synthetic topology.
pub struct Rig {
    pub source: SimulatedSource,
    pub set: EventSet,
    pub topology: Topology,
    pub root: NodeId,
    pub session: Option<MeasurementSession>,
}

/// Test fixture builder for [`Rig`] with sensible defaults.
pub struct RigBuilder {
    events: Vec<String>,
    cores: u32,
    threads_per_core: u32,
    start_on: u32,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self {
            events: vec!["TOT_INS".to_string()],
            cores: 4,
            threads_per_core: 1,
            start_on: 0,
        }
    }

    pub fn events(mut self, events: &[&str]) -> Self {
        self.events = events.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn cores(mut self, cores: u32) -> Self {
        self.cores = cores;
        self
    }

    pub fn start_on(mut self, cpu: u32) -> Self {
        self.start_on = cpu;
        self
    }

    /// Build the rig without starting the session
    pub fn prepare(self) -> Rig {
        let source = SimulatedSource::new();
        let set = source.create_event_set();
        for event in &self.events {
            source.add_named_event(set, event).unwrap();
        }
        source.migrate(set, self.start_on).unwrap();
        let (topology, root) = Topology::uniform(1, self.cores, self.threads_per_core);

        Rig {
            source,
            set,
            topology,
            root,
            session: None,
        }
    }

    pub fn start(self) -> Rig {
        let mut rig = self.prepare();
        MeasurementSession::start(&rig.source, rig.set, &mut rig.session).unwrap();
        rig
    }
}

impl Rig {
    pub fn session(&self) -> &MeasurementSession {
        self.session.as_ref().expect("session started")
    }

    /// Run `work` on `cpu`, then take a reading of kind `op`
    pub fn step(&mut self, cpu: u32, work: u64, op: Op, permanent: bool) -> Timestamp {
        self.source.migrate(self.set, cpu).unwrap();
        self.source.execute(self.set, work).unwrap();
        self.apply(op, permanent).unwrap()
    }

    pub fn apply(&mut self, op: Op, permanent: bool) -> topoperf_lib::Result<Timestamp> {
        let session = self.session.as_mut().expect("session started");
        match op {
            Op::Read => session.read(&self.source, &self.topology, self.root, permanent),
            Op::Accumulate => session.accumulate(&self.source, &self.topology, self.root, permanent),
            Op::Stop => session.stop(&self.source, &self.topology, self.root, permanent),
        }
    }

    /// Entries of `event` on `cpu`, empty if there are none
    pub fn entries(&self, event: &str, cpu: u32) -> Vec<MetricEntry> {
        self.session()
            .all_metrics(event, UnitId::new(cpu))
            .map(|m| m.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn units(&self) -> Vec<u32> {
        self.session().units().map(UnitId::get).collect()
    }

    /// Sum of every unit's reading of `event` at the latest instant
    pub fn total(&self, event: &str) -> i64 {
        self.session().metric(event, None, None)
    }
}

/// Macro for asserting the (value, permanent) pairs stored for one unit.
#[macro_export]
macro_rules! assert_entries {
    ($rig:expr, $event:expr, cpu $cpu:expr, [$(($value:expr, $permanent:expr)),* $(,)?]) => {
        let stored: Vec<(i64, bool)> = $rig
            .entries($event, $cpu)
            .iter()
            .map(|e| (e.value, e.permanent))
            .collect();
        assert_eq!(stored, vec![$(($value, $permanent)),*], "entries of {} on cpu {}", $event, $cpu);
    };
}
