//! SCIM 2.0 Protocol Engine
//!
//! Filter language, attribute paths, PATCH semantics and schema-driven
//! validation for SCIM 2.0 (System for Cross-domain Identity Management)
//! resources.
//!
//! ## RFC References
//!
//! - RFC 7643: SCIM Core Schema
//! - RFC 7644: SCIM Protocol
//!
//! ## Module Structure
//!
//! - [`token`]: Filter tokenizer and token model
//! - [`parser`]: Shunting-yard filter parser producing an expression tree
//! - [`evaluator`]: In-memory filter evaluation
//! - [`path`]: Attribute path compiler and resolver
//! - [`patch`]: PATCH request model and executor
//! - [`traverse`]: Schema-driven resource walkers
//! - [`validate`]: Type, required and mutability validation passes
//! - [`schema`]: Attribute descriptors and schema index
//! - [`resource`]: Loosely-typed resource container
//! - [`types`]: Schema URIs and resource metadata
//! - [`error`]: Engine errors and SCIM error responses per RFC 7644

pub mod collections;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod patch;
pub mod path;
pub mod resource;
pub mod schema;
pub mod token;
pub mod traverse;
pub mod types;
pub mod validate;

pub use error::*;
pub use evaluator::{evaluate, is_assigned, matches};
pub use parser::{
    DEFAULT_MAX_FILTER_LENGTH, MAX_FILTER_DEPTH, Node, parse, parse_filter, parse_filter_with_limit,
};
pub use patch::{PatchOp, PatchOperation, PatchRequest, modify, modify_with_limit};
pub use path::{
    PathToken, compile as compile_path, compile_with_limit as compile_path_with_limit,
    resolve as resolve_path,
};
pub use resource::Resource;
pub use schema::{Attribute, AttributeType, Mutability, Schema, SchemaError};
pub use token::{Constant, Operator, Token, TokenType, tokenize};
pub use traverse::{DualVisit, DualVisitor, Flow, Visit, Visitor, traverse, traverse_dual};
pub use types::*;
pub use validate::{validate_mutability, validate_required, validate_types};
