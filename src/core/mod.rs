//! Core types, errors and configuration shared by every topoperf module.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, MeasureMode};
pub use error::{Result, TopoError};
pub use types::{Timestamp, UnitId};
