//! SCIM 2.0 Filter Evaluation
//!
//! Evaluates a parsed filter tree against resource data. Values are looked up
//! through a resolver callback that maps an attribute path to its current
//! value and schema descriptor, so the same evaluator serves whole-resource
//! filtering and per-element selection inside PATCH.
//!
//! ## Semantics
//!
//! - String, reference and dateTime comparisons honor `caseExact`
//! - Numeric comparisons require the constant's kind to match the attribute
//!   type (`integer` vs `decimal`); a mismatch evaluates to false
//! - Booleans support `eq` and `ne` only
//! - Complex and multi-valued attributes never match a relational operator;
//!   callers evaluate per element instead
//! - A single-valued attribute reached through a multi-valued parent
//!   (`emails.value`) resolves to all element values and matches when any
//!   element does; `ne` matches when no element is equal
//! - An unresolvable path is false, except for `ne` which treats an absent
//!   value as not equal
//!
//! Evaluation never fails.

use std::{cmp::Ordering, str::FromStr};

use chrono::DateTime;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde_json::{Number, Value};

use super::{
    parser::Node,
    path,
    schema::{Attribute, AttributeType},
    token::{Constant, Operator, TokenType},
};

/// Evaluate a filter tree, resolving attribute paths with `resolve`.
pub fn evaluate<'s, F>(node: &Node, resolve: &F) -> bool
where
    F: Fn(&str) -> Option<(Value, &'s Attribute)>,
{
    let Some(op) = node.operator() else {
        return false;
    };
    match op {
        Operator::And => both(node, |n| evaluate(n, resolve), true),
        Operator::Or => both(node, |n| evaluate(n, resolve), false),
        Operator::Not => node.left().is_some_and(|n| !evaluate(n, resolve)),
        Operator::Pr => {
            let Some(path) = node.left().filter(|n| n.data.kind == TokenType::Path) else {
                return false;
            };
            resolve(&path.data.value)
                .is_some_and(|(value, attribute)| is_assigned(&value, attribute))
        }
        _ => {
            let (Some(path), Some(constant)) = (
                node.left().filter(|n| n.data.kind == TokenType::Path),
                node.right().and_then(|n| n.data.constant()),
            ) else {
                return false;
            };
            let resolved = resolve(&path.data.value);
            let result = compare(op, resolved.as_ref().map(|(v, a)| (v, *a)), constant);
            tracing::trace!(path = %path.data.value, op = %op, result, "Evaluated comparison");
            result
        }
    }
}

/// Evaluate a filter against a value described by `attribute`, resolving
/// filter paths relative to it.
pub fn matches(node: &Node, value: &Value, attribute: &Attribute) -> bool {
    evaluate(node, &|p: &str| path::resolve(value, p, attribute).ok())
}

/// Short-circuit `and` (`all = true`) or `or` (`all = false`).
fn both<F: Fn(&Node) -> bool>(node: &Node, eval: F, all: bool) -> bool {
    let (Some(left), Some(right)) = (node.left(), node.right()) else {
        return false;
    };
    if all {
        eval(left) && eval(right)
    } else {
        eval(left) || eval(right)
    }
}

/// Whether a value counts as present for its attribute.
pub fn is_assigned(value: &Value, attribute: &Attribute) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => items.iter().any(|v| is_assigned(v, attribute.element())),
        Value::Object(map) => {
            if attribute.is_complex() {
                map.iter().any(|(key, v)| {
                    attribute
                        .sub_attribute(key)
                        .is_some_and(|sub| is_assigned(v, sub))
                })
            } else {
                !map.is_empty()
            }
        }
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn compare(op: Operator, resolved: Option<(&Value, &Attribute)>, constant: &Constant) -> bool {
    let absent = match resolved {
        None => true,
        Some((value, _)) => value.is_null(),
    };
    if absent {
        return match op {
            Operator::Ne => !matches!(constant, Constant::Null),
            Operator::Eq => matches!(constant, Constant::Null),
            _ => false,
        };
    }
    let Some((value, attribute)) = resolved else {
        return false;
    };

    if attribute.multi_valued || attribute.is_complex() {
        return false;
    }

    match value {
        Value::Array(items) => {
            if op == Operator::Ne {
                !items
                    .iter()
                    .any(|v| compare_scalar(Operator::Eq, v, attribute, constant))
            } else {
                items
                    .iter()
                    .any(|v| compare_scalar(op, v, attribute, constant))
            }
        }
        _ => compare_scalar(op, value, attribute, constant),
    }
}

fn compare_scalar(op: Operator, value: &Value, attribute: &Attribute, constant: &Constant) -> bool {
    if let Constant::Null = constant {
        return op == Operator::Ne;
    }

    match attribute.kind {
        AttributeType::String | AttributeType::Reference => match (value, constant) {
            (Value::String(v), Constant::String(c)) => compare_strings(op, v, c, attribute.case_exact),
            _ => false,
        },
        AttributeType::DateTime => match (value, constant) {
            (Value::String(v), Constant::String(c)) => compare_date_times(op, v, c, attribute.case_exact),
            _ => false,
        },
        AttributeType::Boolean => match (value, constant) {
            (Value::Bool(v), Constant::Boolean(c)) => match op {
                Operator::Eq => v == c,
                Operator::Ne => v != c,
                _ => false,
            },
            _ => false,
        },
        AttributeType::Integer => match (value.as_i64(), constant) {
            (Some(v), Constant::Integer(c)) => compare_ordered(op, v.cmp(c)),
            _ => false,
        },
        AttributeType::Decimal => match (value, constant) {
            (Value::Number(n), Constant::Decimal(c)) => {
                to_decimal(n).is_some_and(|v| compare_ordered(op, v.cmp(c)))
            }
            _ => false,
        },
        AttributeType::Complex => false,
    }
}

fn compare_strings(op: Operator, value: &str, constant: &str, case_exact: bool) -> bool {
    let (value, constant) = if case_exact {
        (value.to_string(), constant.to_string())
    } else {
        (value.to_lowercase(), constant.to_lowercase())
    };
    match op {
        Operator::Sw => value.starts_with(&constant),
        Operator::Ew => value.ends_with(&constant),
        Operator::Co => value.contains(&constant),
        _ => compare_ordered(op, value.cmp(&constant)),
    }
}

/// Compare as instants when both sides parse as RFC 3339, otherwise as text.
fn compare_date_times(op: Operator, value: &str, constant: &str, case_exact: bool) -> bool {
    if matches!(op, Operator::Sw | Operator::Ew | Operator::Co) {
        return compare_strings(op, value, constant, case_exact);
    }
    match (
        DateTime::parse_from_rfc3339(value),
        DateTime::parse_from_rfc3339(constant),
    ) {
        (Ok(v), Ok(c)) => compare_ordered(op, v.cmp(&c)),
        _ => compare_strings(op, value, constant, case_exact),
    }
}

fn compare_ordered(op: Operator, ordering: Ordering) -> bool {
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        _ => false,
    }
}

fn to_decimal(n: &Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    Decimal::from_str(&n.to_string())
        .ok()
        .or_else(|| n.as_f64().and_then(Decimal::from_f64))
}
