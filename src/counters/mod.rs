//! Hardware counter backends.
//!
//! A [`CounterSource`] owns event sets (opaque [`EventSet`] handles with a
//! list of events) and exposes start/read/accumulate/stop/reset on them.
//! Measurement sessions only ever talk to a backend through this trait.

pub mod simulated;
pub mod unit;

pub use simulated::SimulatedSource;
pub use unit::{UnitBinding, UnitResolver};

use crate::core::{Result, UnitId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// Native status code of a counter backend. Zero is success, failures are negative.
pub type StatusCode = i32;

/// Status codes shared by every backend.
pub mod status {
    use super::StatusCode;

    /// Success
    pub const OK: StatusCode = 0;
    /// Invalid argument
    pub const EINVAL: StatusCode = -1;
    /// Out of memory
    pub const ENOMEM: StatusCode = -2;
    /// A system or C library call failed
    pub const ESYS: StatusCode = -3;
    /// Event does not exist
    pub const ENOEVNT: StatusCode = -7;
    /// Event set is not running
    pub const ENOTRUN: StatusCode = -9;
    /// Event set is already running
    pub const EISRUN: StatusCode = -10;
    /// No such event set
    pub const ENOEVST: StatusCode = -11;
    /// Unknown error
    pub const EMISC: StatusCode = -14;
}

/// Raw counter values of one call, in event-set order.
pub type CounterValues = SmallVec<[i64; 8]>;

/// Handle of an event set inside its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSet(pub i32);

impl fmt::Display for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-specific numeric event code. Only the event *name* is stable
/// across backends and runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCode(pub u32);

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Failure reported by a counter backend, carrying its native status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (status {code})")]
pub struct BackendError {
    /// Native status code, passed through to callers unchanged
    pub code: StatusCode,
    /// Backend description of the failure
    pub message: String,
}

impl BackendError {
    /// Creates a new backend error
    pub fn new<S: Into<String>>(code: StatusCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Operations a hardware counter backend provides on its event sets.
///
/// `read` is non-destructive and returns counts since the last
/// start/reset/accumulate. `accumulate` returns the same counts and zeroes
/// the hardware counters. `stop` returns the final counts and leaves the
/// event set stopped; later reads fail until it is started again.
pub trait CounterSource {
    /// Start counting on `set`; the counters start at zero
    fn start(&self, set: EventSet) -> std::result::Result<(), BackendError>;

    /// Current counts of a running event set
    fn read(&self, set: EventSet) -> std::result::Result<CounterValues, BackendError>;

    /// Current counts of a running event set; the counters are zeroed afterwards
    fn accumulate(&self, set: EventSet) -> std::result::Result<CounterValues, BackendError>;

    /// Final counts; the event set is stopped afterwards
    fn stop(&self, set: EventSet) -> std::result::Result<CounterValues, BackendError>;

    /// Zero the counters of an event set
    fn reset(&self, set: EventSet) -> std::result::Result<(), BackendError>;

    /// Events of `set`, in the order their values are reported
    fn list_events(&self, set: EventSet) -> std::result::Result<Vec<EventCode>, BackendError>;

    /// Stable name of an event code
    fn event_name(&self, code: EventCode) -> std::result::Result<String, BackendError>;

    /// Event code of a stable name
    fn event_code(&self, name: &str) -> std::result::Result<EventCode, BackendError>;

    /// How `set` is tied to execution units
    fn binding(&self, set: EventSet) -> std::result::Result<UnitBinding, BackendError>;

    /// Execution unit the readings of `set` currently apply to.
    fn current_unit(&self, set: EventSet) -> Result<UnitId> {
        UnitResolver::default().resolve(self.binding(set)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new(status::ENOEVST, "no such event set");
        assert_eq!(err.to_string(), "no such event set (status -11)");
    }

    #[test]
    fn test_handles_display() {
        assert_eq!(EventSet(3).to_string(), "3");
        assert_eq!(EventCode(0x8000_0032).to_string(), "0x80000032");
    }
}
