//! SCIM 2.0 filter language, PATCH mutation semantics and schema-driven
//! resource validation.
//!
//! The [`scim`] module holds the protocol engine. [`ScimEngine`] bundles the
//! loaded schemas with the configured limits and is the usual entry point.

pub mod config;
pub mod engine;
#[cfg(feature = "cli")]
pub mod observability;
pub mod scim;

#[cfg(test)]
mod tests;

pub use engine::{EngineError, ScimEngine};
