//! Resolution of the execution unit a counter reading belongs to.

use super::{status, BackendError};
use crate::core::{Result, TopoError, UnitId};
use std::fs;
use std::path::PathBuf;

/// Field of `/proc/<tid>/stat` holding the CPU the task last ran on.
const PROCESSOR_FIELD: usize = 39;

/// How an event set is tied to execution units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitBinding {
    /// Counting on one fixed CPU
    Cpu(u32),
    /// Attached to another thread or process, which may migrate
    Thread(u32),
    /// Counting the calling thread
    Caller,
}

/// Maps a [`UnitBinding`] to the unit it currently reports from.
#[derive(Debug, Clone)]
pub struct UnitResolver {
    procfs_root: PathBuf,
}

impl Default for UnitResolver {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl UnitResolver {
    /// Create a resolver reading task state below `procfs_root`
    pub fn new(procfs_root: impl Into<PathBuf>) -> Self {
        Self {
            procfs_root: procfs_root.into(),
        }
    }

    /// Resolve the unit for `binding`
    pub fn resolve(&self, binding: UnitBinding) -> Result<UnitId> {
        match binding {
            UnitBinding::Cpu(cpu) => Ok(UnitId::new(cpu)),
            UnitBinding::Thread(tid) => self.cpu_of_task(tid),
            UnitBinding::Caller => current_cpu(),
        }
    }

    /// CPU `tid` last ran on, from its stat file
    pub fn cpu_of_task(&self, tid: u32) -> Result<UnitId> {
        let path = self.procfs_root.join(tid.to_string()).join("stat");
        let line = fs::read_to_string(&path).map_err(|e| {
            TopoError::invalid_argument(format!("cannot read {}: {}", path.display(), e))
        })?;

        parse_processor(&line).map(UnitId::new).ok_or_else(|| {
            TopoError::invalid_argument(format!("malformed stat line in {}", path.display()))
        })
    }
}

/// Extract the processor field from a `/proc/<tid>/stat` line.
///
/// The command name (field 2) may contain spaces and parentheses, so fields
/// are counted from the last `)`.
pub fn parse_processor(stat: &str) -> Option<u32> {
    let line = stat.lines().next()?;
    let after_comm = &line[line.rfind(')')? + 1..];
    after_comm
        .split_whitespace()
        .nth(PROCESSOR_FIELD - 3)?
        .parse()
        .ok()
}

/// CPU the calling thread is running on.
pub fn current_cpu() -> Result<UnitId> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    u32::try_from(cpu)
        .map(UnitId::new)
        .map_err(|_| BackendError::new(status::ESYS, "sched_getcpu failed").into())
}
