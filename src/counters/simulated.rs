//! Deterministic in-memory counter backend.
//!
//! Behaves like a hardware counter library (same state machine, same status
//! codes) but counts synthetic work: `execute(set, work)` adds
//! `work * weight` to every event of a running set. Event sets can be moved
//! between CPUs to reproduce thread migration.

use super::{
    status, BackendError, CounterSource, CounterValues, EventCode, EventSet, UnitBinding,
    UnitResolver,
};
use crate::core::{Result, UnitId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;

type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Clone)]
struct CatalogEvent {
    code: EventCode,
    name: String,
    weight: i64,
}

#[derive(Debug)]
struct SimEventSet {
    events: Vec<EventCode>,
    counters: Vec<i64>,
    running: bool,
    binding: UnitBinding,
}

#[derive(Debug, Default)]
struct SimState {
    catalog: Vec<CatalogEvent>,
    sets: BTreeMap<i32, SimEventSet>,
    next_set: i32,
}

impl SimState {
    fn set(&self, set: EventSet) -> BackendResult<&SimEventSet> {
        self.sets
            .get(&set.0)
            .ok_or_else(|| BackendError::new(status::ENOEVST, format!("no event set {}", set)))
    }

    fn set_mut(&mut self, set: EventSet) -> BackendResult<&mut SimEventSet> {
        self.sets
            .get_mut(&set.0)
            .ok_or_else(|| BackendError::new(status::ENOEVST, format!("no event set {}", set)))
    }

    fn running_set_mut(&mut self, set: EventSet) -> BackendResult<&mut SimEventSet> {
        let entry = self.set_mut(set)?;
        if !entry.running {
            return Err(BackendError::new(status::ENOTRUN, format!("event set {} is not running", set)));
        }
        Ok(entry)
    }

    fn weight(&self, code: EventCode) -> i64 {
        self.catalog
            .iter()
            .find(|event| event.code == code)
            .map_or(1, |event| event.weight)
    }
}

/// Simulated counter backend, shareable between threads.
#[derive(Debug)]
pub struct SimulatedSource {
    state: Mutex<SimState>,
    resolver: UnitResolver,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSource {
    /// Backend with the default event catalog:
    /// `TOT_INS` (x2), `TOT_CYC` (x3), `L1_DCM` (x1), `BR_MSP` (x1).
    pub fn new() -> Self {
        let source = Self::empty();
        source.define_event(EventCode(0x8000_0032), "TOT_INS", 2);
        source.define_event(EventCode(0x8000_003b), "TOT_CYC", 3);
        source.define_event(EventCode(0x8000_0000), "L1_DCM", 1);
        source.define_event(EventCode(0x8000_002e), "BR_MSP", 1);
        source
    }

    /// Backend without any known events
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_set: 1,
                ..SimState::default()
            }),
            resolver: UnitResolver::default(),
        }
    }

    /// Resolve attached threads below `procfs_root` instead of `/proc`
    pub fn with_procfs_root(mut self, procfs_root: impl Into<PathBuf>) -> Self {
        self.resolver = UnitResolver::new(procfs_root);
        self
    }

    /// Add an event to the catalog; each unit of work counts `weight` events
    pub fn define_event(&self, code: EventCode, name: &str, weight: i64) {
        let mut state = self.state.lock();
        state.catalog.retain(|event| event.code != code);
        state.catalog.push(CatalogEvent {
            code,
            name: name.to_string(),
            weight,
        });
    }

    /// Create an empty event set counting on CPU 0
    pub fn create_event_set(&self) -> EventSet {
        let mut state = self.state.lock();
        let id = state.next_set;
        state.next_set += 1;
        state.sets.insert(
            id,
            SimEventSet {
                events: Vec::new(),
                counters: Vec::new(),
                running: false,
                binding: UnitBinding::Cpu(0),
            },
        );
        EventSet(id)
    }

    /// Add a catalog event to a stopped event set
    pub fn add_event(&self, set: EventSet, code: EventCode) -> BackendResult<()> {
        let known = self.state.lock().catalog.iter().any(|event| event.code == code);
        if !known {
            return Err(BackendError::new(status::ENOEVNT, format!("unknown event {}", code)));
        }
        self.add_raw_event(set, code)
    }

    /// Add an event by name
    pub fn add_named_event(&self, set: EventSet, name: &str) -> BackendResult<EventCode> {
        let code = self.event_code(name)?;
        self.add_event(set, code)?;
        Ok(code)
    }

    /// Add a code without checking the catalog. Such events count one per
    /// unit of work and have no name.
    pub fn add_raw_event(&self, set: EventSet, code: EventCode) -> BackendResult<()> {
        let mut state = self.state.lock();
        let entry = state.set_mut(set)?;
        if entry.running {
            return Err(BackendError::new(status::EISRUN, format!("event set {} is running", set)));
        }
        entry.events.push(code);
        entry.counters.push(0);
        Ok(())
    }

    /// Change how `set` is bound to execution units
    pub fn set_binding(&self, set: EventSet, binding: UnitBinding) -> BackendResult<()> {
        self.state.lock().set_mut(set)?.binding = binding;
        Ok(())
    }

    /// Move `set` (and the work it counts) to `cpu`
    pub fn migrate(&self, set: EventSet, cpu: u32) -> BackendResult<()> {
        self.set_binding(set, UnitBinding::Cpu(cpu))
    }

    /// Run `work` units of work under `set`. Stopped sets count nothing.
    pub fn execute(&self, set: EventSet, work: u64) -> BackendResult<()> {
        let mut state = self.state.lock();
        let work = i64::try_from(work)
            .map_err(|_| BackendError::new(status::EINVAL, "work does not fit a counter"))?;
        let weights: Vec<i64> = state
            .set(set)?
            .events
            .iter()
            .map(|&code| state.weight(code))
            .collect();

        let entry = state.set_mut(set)?;
        if entry.running {
            for (counter, weight) in entry.counters.iter_mut().zip(weights) {
                *counter = counter.saturating_add(work.saturating_mul(weight));
            }
        }
        Ok(())
    }

    /// Whether `set` is currently counting
    pub fn is_running(&self, set: EventSet) -> bool {
        self.state.lock().set(set).map_or(false, |entry| entry.running)
    }
}

impl CounterSource for SimulatedSource {
    fn start(&self, set: EventSet) -> BackendResult<()> {
        let mut state = self.state.lock();
        let entry = state.set_mut(set)?;
        if entry.running {
            return Err(BackendError::new(status::EISRUN, format!("event set {} is running", set)));
        }
        if entry.events.is_empty() {
            return Err(BackendError::new(status::EINVAL, format!("event set {} has no events", set)));
        }
        entry.counters.iter_mut().for_each(|c| *c = 0);
        entry.running = true;
        Ok(())
    }

    fn read(&self, set: EventSet) -> BackendResult<CounterValues> {
        let mut state = self.state.lock();
        let entry = state.running_set_mut(set)?;
        Ok(entry.counters.iter().copied().collect())
    }

    fn accumulate(&self, set: EventSet) -> BackendResult<CounterValues> {
        let mut state = self.state.lock();
        let entry = state.running_set_mut(set)?;
        let values = entry.counters.iter().copied().collect();
        entry.counters.iter_mut().for_each(|c| *c = 0);
        Ok(values)
    }

    fn stop(&self, set: EventSet) -> BackendResult<CounterValues> {
        let mut state = self.state.lock();
        let entry = state.running_set_mut(set)?;
        entry.running = false;
        Ok(entry.counters.iter().copied().collect())
    }

    fn reset(&self, set: EventSet) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.set_mut(set)?.counters.iter_mut().for_each(|c| *c = 0);
        Ok(())
    }

    fn list_events(&self, set: EventSet) -> BackendResult<Vec<EventCode>> {
        Ok(self.state.lock().set(set)?.events.clone())
    }

    fn event_name(&self, code: EventCode) -> BackendResult<String> {
        self.state
            .lock()
            .catalog
            .iter()
            .find(|event| event.code == code)
            .map(|event| event.name.clone())
            .ok_or_else(|| BackendError::new(status::ENOEVNT, format!("unknown event {}", code)))
    }

    fn event_code(&self, name: &str) -> BackendResult<EventCode> {
        self.state
            .lock()
            .catalog
            .iter()
            .find(|event| event.name == name)
            .map(|event| event.code)
            .ok_or_else(|| BackendError::new(status::ENOEVNT, format!("unknown event '{}'", name)))
    }

    fn binding(&self, set: EventSet) -> BackendResult<UnitBinding> {
        Ok(self.state.lock().set(set)?.binding)
    }

    fn current_unit(&self, set: EventSet) -> Result<UnitId> {
        self.resolver.resolve(self.binding(set)?)
    }
}
