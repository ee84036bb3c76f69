//! Schema-driven resource traversal.
//!
//! Depth-first walkers that visit every attribute of a resource in schema
//! order and hand each node to a pluggable visitor. Validation passes are
//! written as visitors.
//!
//! ## Single traversal
//!
//! [`traverse`] walks one resource read-only. Attributes absent from the
//! resource are visited with a `null` value, so visitors see the full schema.
//!
//! ## Dual traversal
//!
//! [`traverse_dual`] walks a resource mutably in lock-step with a read-only
//! reference version of it (typically the stored resource during a replace).
//! Elements of multi-valued complex attributes are cross-joined: every new
//! element is offered to the visitor's [`DualVisitor::pair`] against every
//! reference element, and descends once per accepted pair.
//!
//! Absent attributes are visited through a temporary `null` slot that is
//! inserted into the resource if the visitor fills it. Slots the visitor sets
//! to `null` are removed.
//!
//! Multi-valued attributes are visited twice: once as a whole, with their
//! multi-valued descriptor, and once per element with the single-valued
//! twin from [`Attribute::element`].

use serde_json::{Map, Value};

use super::{
    collections::Stack,
    path::{find_key, get_ignore_case},
    schema::{Attribute, Schema},
};

static NULL: Value = Value::Null;

/// Whether to descend below the node just visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Skip,
}

/// An enclosing container on the way down to a visited node.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub attribute: &'a Attribute,
    pub value: &'a Value,
    /// Whether this frame is one element of a multi-valued attribute.
    pub element: bool,
}

/// A node handed to a [`Visitor`].
pub struct Visit<'v, 'a> {
    pub attribute: &'a Attribute,
    pub value: &'a Value,
    pub ancestors: &'v Stack<Frame<'a>>,
    pub element: Option<usize>,
}

impl Visit<'_, '_> {
    /// Dotted path of the node, rebuilt from its ancestors.
    pub fn path(&self) -> String {
        dotted_path(
            self.ancestors.iter().map(|f| (f.attribute, f.element)),
            self.attribute,
            self.element.is_some(),
        )
    }
}

/// Callback interface of [`traverse`].
pub trait Visitor {
    type Error;

    fn visit(&mut self, visit: &Visit<'_, '_>) -> Result<Flow, Self::Error>;
}

/// Walk `resource` in schema order.
///
/// # Errors
///
/// Stops at and returns the first error raised by the visitor.
pub fn traverse<V: Visitor>(
    schema: &Schema,
    resource: &Map<String, Value>,
    visitor: &mut V,
) -> Result<(), V::Error> {
    let mut walker = Walker {
        ancestors: Stack::new(),
        visitor,
    };
    walker.walk_members(schema.root(), resource)
}

struct Walker<'a, 'w, V> {
    ancestors: Stack<Frame<'a>>,
    visitor: &'w mut V,
}

impl<'a, V: Visitor> Walker<'a, '_, V> {
    fn walk_members(&mut self, attribute: &'a Attribute, map: &'a Map<String, Value>) -> Result<(), V::Error> {
        for sub in &attribute.sub_attributes {
            let child = get_ignore_case(map, &sub.name).unwrap_or(&NULL);
            self.walk(sub, child, None)?;
        }
        Ok(())
    }

    fn walk(
        &mut self,
        attribute: &'a Attribute,
        value: &'a Value,
        element: Option<usize>,
    ) -> Result<(), V::Error> {
        let flow = self.visitor.visit(&Visit {
            attribute,
            value,
            ancestors: &self.ancestors,
            element,
        })?;
        if flow == Flow::Skip {
            return Ok(());
        }

        let frame = Frame {
            attribute,
            value,
            element: element.is_some(),
        };
        match value {
            Value::Array(items) if attribute.multi_valued && element.is_none() => {
                self.ancestors.push(frame);
                let result = items
                    .iter()
                    .enumerate()
                    .try_for_each(|(i, item)| self.walk(attribute.element(), item, Some(i)));
                self.ancestors.pop();
                result
            }
            Value::Object(map) if attribute.is_complex() && !attribute.multi_valued => {
                self.ancestors.push(frame);
                let result = self.walk_members(attribute, map);
                self.ancestors.pop();
                result
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Dual traversal
// =============================================================================

/// An enclosing container during [`traverse_dual`]. Only the reference side
/// is recorded; the new side is being mutated.
#[derive(Debug, Clone, Copy)]
pub struct DualFrame<'a> {
    pub attribute: &'a Attribute,
    pub reference: Option<&'a Value>,
    pub element: bool,
}

/// A node handed to a [`DualVisitor`].
pub struct DualVisit<'v, 'a> {
    pub attribute: &'a Attribute,
    /// Counterpart in the reference resource, if any.
    pub reference: Option<&'a Value>,
    pub ancestors: &'v Stack<DualFrame<'a>>,
    pub element: Option<usize>,
}

impl DualVisit<'_, '_> {
    pub fn path(&self) -> String {
        dotted_path(
            self.ancestors.iter().map(|f| (f.attribute, f.element)),
            self.attribute,
            self.element.is_some(),
        )
    }
}

/// Callback interface of [`traverse_dual`].
pub trait DualVisitor {
    type Error;

    /// Visit one node. `value` may be modified in place.
    fn visit(&mut self, visit: &DualVisit<'_, '_>, value: &mut Value) -> Result<Flow, Self::Error>;

    /// Decide whether a new element and a reference element of the
    /// multi-valued complex `attribute` are the same element.
    ///
    /// Defaults to comparing the attribute's array index key.
    fn pair(&mut self, attribute: &Attribute, candidate: &Value, reference: &Value) -> bool {
        let Some(key) = attribute.array_index_key() else {
            return false;
        };
        let (Value::Object(c), Value::Object(r)) = (candidate, reference) else {
            return false;
        };
        match (get_ignore_case(c, key), get_ignore_case(r, key)) {
            (Some(a), Some(b)) if !a.is_null() => a == b,
            _ => false,
        }
    }
}

/// Walk `resource` mutably alongside `reference`.
///
/// # Errors
///
/// Stops at and returns the first error raised by the visitor.
pub fn traverse_dual<V: DualVisitor>(
    schema: &Schema,
    resource: &mut Map<String, Value>,
    reference: Option<&Map<String, Value>>,
    visitor: &mut V,
) -> Result<(), V::Error> {
    let mut walker = DualWalker {
        ancestors: Stack::new(),
        visitor,
    };
    walker.walk_members(schema.root(), resource, reference)
}

struct DualWalker<'a, 'w, V> {
    ancestors: Stack<DualFrame<'a>>,
    visitor: &'w mut V,
}

impl<'a, V: DualVisitor> DualWalker<'a, '_, V> {
    fn walk_members(
        &mut self,
        attribute: &'a Attribute,
        map: &mut Map<String, Value>,
        reference: Option<&'a Map<String, Value>>,
    ) -> Result<(), V::Error> {
        for sub in &attribute.sub_attributes {
            let counterpart = reference.and_then(|r| get_ignore_case(r, &sub.name));
            match find_key(map, &sub.name) {
                Some(key) => {
                    let mut emptied = false;
                    if let Some(child) = map.get_mut(&key) {
                        self.walk(sub, child, counterpart, None)?;
                        emptied = child.is_null();
                    }
                    if emptied {
                        map.remove(&key);
                    }
                }
                None => {
                    let mut slot = Value::Null;
                    self.walk(sub, &mut slot, counterpart, None)?;
                    if !slot.is_null() {
                        map.insert(sub.name.clone(), slot);
                    }
                }
            }
        }
        Ok(())
    }

    fn walk(
        &mut self,
        attribute: &'a Attribute,
        value: &mut Value,
        reference: Option<&'a Value>,
        element: Option<usize>,
    ) -> Result<(), V::Error> {
        let flow = self.visitor.visit(
            &DualVisit {
                attribute,
                reference,
                ancestors: &self.ancestors,
                element,
            },
            value,
        )?;
        if flow == Flow::Skip {
            return Ok(());
        }

        let frame = DualFrame {
            attribute,
            reference,
            element: element.is_some(),
        };
        match value {
            Value::Array(items) if attribute.multi_valued && element.is_none() => {
                self.ancestors.push(frame);
                let result = self.walk_elements(attribute, items, reference);
                self.ancestors.pop();
                result
            }
            Value::Object(map) if attribute.is_complex() && !attribute.multi_valued => {
                let reference_map = reference.and_then(Value::as_object);
                self.ancestors.push(frame);
                let result = self.walk_members(attribute, map, reference_map);
                self.ancestors.pop();
                result
            }
            _ => Ok(()),
        }
    }

    fn walk_elements(
        &mut self,
        attribute: &'a Attribute,
        items: &mut [Value],
        reference: Option<&'a Value>,
    ) -> Result<(), V::Error> {
        let element = attribute.element();
        let reference_items: &'a [Value] = reference
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for (i, item) in items.iter_mut().enumerate() {
            if !attribute.is_complex() {
                self.walk(element, item, None, Some(i))?;
                continue;
            }

            let partners: Vec<&'a Value> = reference_items
                .iter()
                .filter(|r| self.visitor.pair(attribute, &*item, r))
                .collect();
            if partners.is_empty() {
                self.walk(element, item, None, Some(i))?;
            }
            for partner in partners {
                self.walk(element, item, Some(partner), Some(i))?;
            }
        }
        Ok(())
    }
}

fn dotted_path<'a>(
    ancestors: impl Iterator<Item = (&'a Attribute, bool)>,
    attribute: &Attribute,
    element: bool,
) -> String {
    // An element frame repeats its array's name.
    let mut names: Vec<&str> = ancestors
        .filter(|(_, is_element)| !is_element)
        .map(|(a, _)| a.name.as_str())
        .collect();
    if !element {
        names.push(&attribute.name);
    }
    names.join(".")
}
