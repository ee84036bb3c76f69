//! Loosely-typed SCIM resource.
//!
//! A [`Resource`] is the JSON object a client sends or a store returns. The
//! engine reads and writes it through the schema, so it keeps no typed fields
//! of its own beyond accessors for the identity and `meta` attributes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    error::ValidationError,
    path::{find_key, get_ignore_case},
    types::ScimMeta,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    attributes: Map<String, Value>,
}

impl Resource {
    /// Empty resource declaring a single schema.
    pub fn new(schema_id: &str) -> Self {
        let mut attributes = Map::new();
        attributes.insert("schemas".to_string(), Value::Array(vec![schema_id.into()]));
        Self { attributes }
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(attributes) => Ok(Self { attributes }),
            _ => Err(ValidationError::InvalidType {
                path: "(resource)".to_string(),
                expected: "a JSON object".to_string(),
            }),
        }
    }

    pub fn from_map(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attributes
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.attributes)
    }

    /// Top-level attribute by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Value> {
        get_ignore_case(&self.attributes, name)
    }

    /// Set a top-level attribute, reusing an existing key that differs only
    /// in case.
    pub fn set(&mut self, name: &str, value: Value) {
        let key = find_key(&self.attributes, name).unwrap_or_else(|| name.to_string());
        self.attributes.insert(key, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let key = find_key(&self.attributes, name)?;
        self.attributes.remove(&key)
    }

    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.set("id", Value::String(id.into()));
    }

    pub fn external_id(&self) -> Option<&str> {
        self.get("externalId").and_then(Value::as_str)
    }

    /// Schema URNs the resource declares.
    pub fn schemas(&self) -> Vec<&str> {
        self.get("schemas")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Parsed `meta` block, if present and well-formed.
    pub fn meta(&self) -> Option<ScimMeta> {
        self.get("meta")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_meta(&mut self, meta: &ScimMeta) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(meta)?;
        self.set("meta", value);
        Ok(())
    }
}
