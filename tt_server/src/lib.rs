//! HTTP API server for the todo tracker.
//!
//! The binary in `main.rs` wires these modules together; they live in a
//! library so integration tests can drive the router directly.

pub mod api;
pub mod background;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod shutdown;
