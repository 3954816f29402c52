//! topoperf - hardware topology with performance counter accounting.
//!
//! topoperf models a machine as a tree of components (packages, cores,
//! hardware threads, caches, memory) and attaches hardware counter readings
//! to the hardware threads that produced them, even when the counted thread
//! migrates between CPUs while an event set is running.
//!
//! # Architecture
//!
//! - `core`: errors, configuration, clock and shared identifiers
//! - `topology`: the component tree, synthetic or read from sysfs
//! - `counters`: the counter backend trait and a simulated backend
//! - `metrics`: measurement sessions and the attribution of readings
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```
//! use topoperf_lib::counters::SimulatedSource;
//! use topoperf_lib::metrics::MeasurementSession;
//! use topoperf_lib::topology::Topology;
//!
//! # fn main() -> topoperf_lib::Result<()> {
//! let (topology, root) = Topology::uniform(1, 2, 2);
//! let source = SimulatedSource::new();
//! let set = source.create_event_set();
//! source.add_named_event(set, "TOT_INS")?;
//!
//! let mut session = None;
//! MeasurementSession::start(&source, set, &mut session)?;
//! if let Some(session) = session.as_mut() {
//!     source.execute(set, 100)?;
//!     session.read(&source, &topology, root, false)?;
//!     source.migrate(set, 1)?;
//!     source.execute(set, 50)?;
//!     session.stop(&source, &topology, root, false)?;
//!
//!     assert_eq!(session.metric("TOT_INS", None, None), 300);
//!     assert_eq!(session.units().count(), 2);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod counters;
pub mod metrics;
pub mod topology;

// Re-export core types for convenience
pub use crate::core::{Config, Result, TopoError};
