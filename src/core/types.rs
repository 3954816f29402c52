use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic, process-local timestamp of a counter reading in nanoseconds.
pub type Timestamp = u64;

/// Execution unit (hardware thread number) a counter reading belongs to.
///
/// This is the join key between counter readings and `Thread` components
/// of the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(u32);

impl UnitId {
    /// Creates a new unit id
    pub const fn new(id: u32) -> Self {
        UnitId(id)
    }

    /// Returns the raw unit number
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for UnitId {
    fn from(id: u32) -> Self {
        UnitId(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
