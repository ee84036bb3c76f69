//! SCIM 2.0 PATCH Operations
//!
//! This module applies SCIM PATCH requests per RFC 7644 Section 3.5.2 to a
//! [`Resource`], guided by its [`Schema`].
//!
//! ## Operations
//!
//! - `add`: Append to a multi-valued attribute, merge into a complex
//!   attribute, or set a simple attribute
//! - `remove`: Remove an attribute or the array elements a value filter selects
//! - `replace`: Overwrite an attribute value
//!
//! ## Path Syntax
//!
//! ```text
//! path = attrPath / valuePath / subAttrPath
//! attrPath = ATTRNAME
//! subAttrPath = ATTRNAME "." ATTRNAME
//! valuePath = ATTRNAME "[" valueFilter "]" ["." ATTRNAME]
//! ```
//!
//! An `add` or `replace` without a path takes an object value and applies
//! one operation per key.
//!
//! ## Atomicity
//!
//! Operations run against a working copy that replaces the resource only
//! after every operation succeeds.
//!
//! ## Examples
//!
//! ```json
//! {
//!   "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
//!   "Operations": [
//!     { "op": "replace", "path": "displayName", "value": "New Name" },
//!     { "op": "add", "path": "emails", "value": [{"type": "home", "value": "home@example.com"}] },
//!     { "op": "remove", "path": "members[value eq \"user-123\"]" }
//!   ]
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    collections::Queue,
    error::{PatchError, PathError},
    evaluator,
    parser::DEFAULT_MAX_FILTER_LENGTH,
    path::{self, PathToken, find_key},
    resource::Resource,
    schema::{Attribute, Schema},
    types::SCHEMA_PATCH_OP,
};

/// A SCIM PATCH request containing one or more operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    /// SCIM schema URIs; must be exactly the PatchOp schema
    pub schemas: Vec<String>,

    /// List of patch operations to apply
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

impl PatchRequest {
    /// Create a new patch request with operations
    pub fn new(operations: Vec<PatchOperation>) -> Self {
        Self {
            schemas: vec![SCHEMA_PATCH_OP.to_string()],
            operations,
        }
    }

    /// Check the schema guard.
    pub fn validate(&self) -> Result<(), PatchError> {
        match self.schemas.as_slice() {
            [schema] if schema == SCHEMA_PATCH_OP => Ok(()),
            _ => Err(PatchError::InvalidSchema),
        }
    }
}

/// Operation kind. Accepts the capitalized spellings some clients send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    #[serde(alias = "Add", alias = "ADD")]
    Add,
    #[serde(alias = "Remove", alias = "REMOVE")]
    Remove,
    #[serde(alias = "Replace", alias = "REPLACE")]
    Replace,
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOp::Add => write!(f, "add"),
            PatchOp::Remove => write!(f, "remove"),
            PatchOp::Replace => write!(f, "replace"),
        }
    }
}

/// A single SCIM PATCH operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl PatchOperation {
    /// Create an add operation
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: Some(path.into()),
            value,
        }
    }

    /// Create a replace operation
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: Some(path.into()),
            value,
        }
    }

    /// Create a remove operation
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: Some(path.into()),
            value: Value::Null,
        }
    }

    /// Create a path-less operation whose object value names the attributes.
    pub fn implicit(op: PatchOp, value: Value) -> Self {
        Self {
            op,
            path: None,
            value,
        }
    }

    fn path_str(&self) -> &str {
        self.path.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Apply a PATCH request to a resource.
///
/// The resource is left untouched unless every operation succeeds. Value
/// filters in operation paths are limited to [`DEFAULT_MAX_FILTER_LENGTH`].
///
/// # Errors
///
/// Returns [`PatchError::InvalidSchema`] if the request does not declare
/// exactly the PatchOp schema, and [`PatchError::Operation`] carrying the
/// index of the first operation that failed otherwise.
pub fn modify(
    resource: &mut Resource,
    schema: &Schema,
    request: &PatchRequest,
) -> Result<(), PatchError> {
    modify_with_limit(resource, schema, request, DEFAULT_MAX_FILTER_LENGTH)
}

/// [`modify`] with an explicit length limit for value filters in paths.
pub fn modify_with_limit(
    resource: &mut Resource,
    schema: &Schema,
    request: &PatchRequest,
    max_filter_length: usize,
) -> Result<(), PatchError> {
    request.validate()?;

    let mut working = resource.attributes().clone();
    for (index, operation) in request.operations.iter().enumerate() {
        apply_operation(&mut working, schema, operation, max_filter_length).map_err(|e| {
            tracing::debug!(index, op = %operation.op, path = operation.path_str(), error = %e, "PATCH operation failed");
            PatchError::Operation {
                index,
                source: Box::new(e),
            }
        })?;
        tracing::debug!(index, op = %operation.op, path = operation.path_str(), "Applied PATCH operation");
    }
    *resource.attributes_mut() = working;
    Ok(())
}

fn apply_operation(
    target: &mut Map<String, Value>,
    schema: &Schema,
    operation: &PatchOperation,
    max_filter_length: usize,
) -> Result<(), PatchError> {
    let path = operation.path_str();
    let queue = if path.is_empty() {
        Queue::new()
    } else {
        path::compile_with_limit(path, max_filter_length)?
    };
    let ctx = Context { operation, path };
    ObjectContainer { map: target }.apply(queue, schema.root(), &ctx, &operation.value)
}

/// Per-operation state threaded through the containers.
struct Context<'a> {
    operation: &'a PatchOperation,
    /// Original path text, for error messages.
    path: &'a str,
}

impl Context<'_> {
    fn op(&self) -> PatchOp {
        self.operation.op
    }

    fn no_target(&self) -> PatchError {
        PatchError::NoTarget(self.path.to_string())
    }

    fn shape(&self, segment: &str, found: &Value) -> PatchError {
        PatchError::Path(PathError::Shape {
            path: self.path.to_string(),
            segment: segment.to_string(),
            found: path::kind_of(found),
        })
    }
}

/// A mutable JSON container an operation descends through.
trait Container {
    /// Apply the operation at the remaining `path` below `attribute`, the
    /// descriptor of this container's value.
    fn apply(
        &mut self,
        path: Queue<PathToken>,
        attribute: &Attribute,
        ctx: &Context<'_>,
        value: &Value,
    ) -> Result<(), PatchError>;
}

struct ObjectContainer<'a> {
    map: &'a mut Map<String, Value>,
}

struct ArrayContainer<'a> {
    items: &'a mut Vec<Value>,
}

impl Container for ObjectContainer<'_> {
    fn apply(
        &mut self,
        mut path: Queue<PathToken>,
        attribute: &Attribute,
        ctx: &Context<'_>,
        value: &Value,
    ) -> Result<(), PatchError> {
        if path.is_empty() {
            return self.apply_implicit(attribute, ctx, value);
        }

        let name = match path.poll() {
            Some(PathToken::Attr(name)) => name,
            Some(PathToken::Filter(_)) | None => {
                return Err(PathError::FilterOnSingleValue {
                    path: ctx.path.to_string(),
                }
                .into());
            }
        };
        let sub = attribute
            .sub_attribute(&name)
            .ok_or_else(|| PathError::missing(ctx.path, &name))?;

        if path.is_empty() {
            return self.apply_terminal(sub, ctx, value);
        }

        let key = find_key(self.map, &sub.name).unwrap_or_else(|| sub.name.clone());
        let missing = self.map.get(&key).is_none_or(Value::is_null);
        if missing {
            match ctx.op() {
                // A new array has no elements to carry the sub-attribute.
                PatchOp::Add if sub.multi_valued => return Ok(()),
                PatchOp::Add => {
                    self.map.insert(key.clone(), sub.zero_value());
                }
                PatchOp::Remove => return Ok(()),
                PatchOp::Replace => return Err(ctx.no_target()),
            }
        }

        // Simple attributes have a null zero value and cannot hold a nested path.
        if self.map.get(&key).is_some_and(Value::is_null) {
            self.map.remove(&key);
            return Err(ctx.shape(&sub.name, &Value::Null));
        }

        let Some(child) = self.map.get_mut(&key) else {
            return Err(PatchError::Failed(format!(
                "slot '{}' vanished after creation",
                key
            )));
        };
        match child {
            Value::Object(map) => ObjectContainer { map }.apply(path, sub, ctx, value),
            Value::Array(items) => ArrayContainer { items }.apply(path, sub, ctx, value),
            other => Err(ctx.shape(&sub.name, other)),
        }
    }
}

impl ObjectContainer<'_> {
    /// Path-less form: one operation per key of an object value.
    fn apply_implicit(
        &mut self,
        attribute: &Attribute,
        ctx: &Context<'_>,
        value: &Value,
    ) -> Result<(), PatchError> {
        if ctx.op() == PatchOp::Remove {
            return Err(ctx.no_target());
        }
        let Value::Object(fields) = value else {
            return Err(PatchError::invalid(format!(
                "{} without a path requires an object value",
                ctx.op()
            )));
        };
        for (key, field) in fields {
            let path: Queue<PathToken> = std::iter::once(PathToken::Attr(key.clone())).collect();
            self.apply(path, attribute, ctx, field)?;
        }
        Ok(())
    }

    fn apply_terminal(
        &mut self,
        attribute: &Attribute,
        ctx: &Context<'_>,
        value: &Value,
    ) -> Result<(), PatchError> {
        let key = find_key(self.map, &attribute.name).unwrap_or_else(|| attribute.name.clone());

        match ctx.op() {
            PatchOp::Remove => {
                self.map.remove(&key);
            }
            PatchOp::Replace => {
                if value.is_null() {
                    self.map.remove(&key);
                } else {
                    self.map.insert(key, value.clone());
                }
            }
            PatchOp::Add if attribute.multi_valued => {
                let slot = self
                    .map
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Value::Array(items) = slot {
                    append_unique(items, value);
                }
            }
            PatchOp::Add if attribute.is_complex() => {
                let Value::Object(fields) = value else {
                    return Err(PatchError::invalid(format!(
                        "complex attribute '{}' requires an object value",
                        attribute.name
                    )));
                };
                let slot = self
                    .map
                    .entry(key)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(existing) = slot {
                    for (field, v) in fields {
                        let sub = attribute
                            .sub_attribute(field)
                            .ok_or_else(|| PathError::missing(ctx.path, field))?;
                        let field_key = find_key(existing, &sub.name).unwrap_or_else(|| sub.name.clone());
                        existing.insert(field_key, v.clone());
                    }
                }
            }
            PatchOp::Add => {
                self.map.insert(key, value.clone());
            }
        }
        Ok(())
    }
}

impl Container for ArrayContainer<'_> {
    fn apply(
        &mut self,
        mut path: Queue<PathToken>,
        attribute: &Attribute,
        ctx: &Context<'_>,
        value: &Value,
    ) -> Result<(), PatchError> {
        let element = attribute.element();

        let filter = match path.peek() {
            Some(PathToken::Filter(_)) => match path.poll() {
                Some(PathToken::Filter(node)) => Some(node),
                _ => None,
            },
            _ => None,
        };
        let selected: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| {
                filter
                    .as_ref()
                    .is_none_or(|node| evaluator::matches(node, item, element))
            })
            .map(|(i, _)| i)
            .collect();
        let filtered = filter.is_some();

        tracing::trace!(
            attribute = %attribute.name,
            filtered,
            selected = selected.len(),
            total = self.items.len(),
            "Selected array elements"
        );

        match path.len() {
            0 => match ctx.op() {
                PatchOp::Add if filtered => Err(PatchError::invalid(
                    "add is not allowed on a filtered multi-valued attribute",
                )),
                PatchOp::Add => {
                    append_unique(self.items, value);
                    Ok(())
                }
                PatchOp::Replace if filtered && selected.is_empty() => Err(ctx.no_target()),
                PatchOp::Replace => {
                    for &i in &selected {
                        self.items[i] = value.clone();
                    }
                    Ok(())
                }
                PatchOp::Remove => {
                    let mut position = 0;
                    self.items.retain(|_| {
                        let keep = !selected.contains(&position);
                        position += 1;
                        keep
                    });
                    Ok(())
                }
            },
            1 => {
                if filtered && selected.is_empty() && ctx.op() == PatchOp::Replace {
                    return Err(ctx.no_target());
                }
                for &i in &selected {
                    match &mut self.items[i] {
                        Value::Object(map) => {
                            ObjectContainer { map }.apply(path.clone(), element, ctx, value)?
                        }
                        other => return Err(ctx.shape(&element.name, other)),
                    }
                }
                Ok(())
            }
            _ => Err(PathError::syntax(ctx.path, "complex array is one level only").into()),
        }
    }
}

/// Append values that are not already present. Arrays are spread.
fn append_unique(items: &mut Vec<Value>, value: &Value) {
    let incoming: &[Value] = match value {
        Value::Array(values) => values,
        Value::Null => &[],
        single => std::slice::from_ref(single),
    };
    for v in incoming {
        if !items.contains(v) {
            items.push(v.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
