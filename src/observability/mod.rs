//! Observability for the command-line front end.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary, which configures it from the `[logging]` section.

mod tracing_init;

pub use tracing_init::*;
