//! Attribution of hardware counter readings to topology components.
//!
//! A [`MeasurementSession`] wraps one counter event set. Every read,
//! accumulate or stop resolves the hardware thread the event set currently
//! reports from and stores the values in a [`MetricStore`] keyed by event
//! name and unit, correcting for readings that other units already hold at
//! the same logical instant.

pub mod accounting;
pub mod export;
pub mod session;
pub mod store;
pub mod types;
pub mod unit_view;

pub use accounting::{Ledger, Participant, Reading};
pub use export::SessionReport;
pub use session::MeasurementSession;
pub use store::MetricStore;
pub use types::{MetricEntry, UnitMetrics};
pub use unit_view::UnitView;
