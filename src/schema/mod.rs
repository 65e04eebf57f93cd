//! Wire records for the sensor and storage collaborators
//!
//! This module defines the untrusted input shapes (activity samples, daily
//! totals, externally supplied sessions) and the adapter that validates them
//! into the engine's typed values.

mod adapter;
mod raw_event;

pub use adapter::*;
pub use raw_event::*;
