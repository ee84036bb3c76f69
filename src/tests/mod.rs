//! Consolidated test modules.
//!
//! End-to-end scenarios that run filters, PATCH requests and validation
//! passes through a [`ScimEngine`](crate::ScimEngine) built from configuration.

mod scim_scenarios;
