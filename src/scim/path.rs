//! SCIM 2.0 Attribute Paths
//!
//! Compiles attribute paths such as `emails[type eq "work"].value` into a
//! queue of components and resolves them against resource data.
//!
//! ## Grammar
//!
//! Segments are separated by `.` outside brackets and quoted text. At most
//! one segment may carry a bracketed value filter, which is parsed with the
//! filter grammar and kept as an expression tree. A leading schema URN
//! qualifier (`urn:...:User:userName`) is dropped.
//!
//! ## Resolution
//!
//! Stepping into an array maps the remaining path over every element and
//! collects the results. A value filter is only legal directly beneath an
//! array and keeps the elements it matches.

use serde_json::{Map, Value};

use super::{
    collections::Queue,
    error::PathError,
    evaluator,
    parser::{DEFAULT_MAX_FILTER_LENGTH, Node, parse_filter_with_limit},
    schema::Attribute,
    types::URN_PREFIX,
};

/// One compiled path component.
#[derive(Debug, Clone, PartialEq)]
pub enum PathToken {
    /// Attribute name, matched case-insensitively.
    Attr(String),
    /// Value filter applied to the elements of the preceding array.
    Filter(Node),
}

/// Compile a path string into its components, limiting the value filter to
/// [`DEFAULT_MAX_FILTER_LENGTH`].
///
/// # Errors
///
/// Returns [`PathError::Syntax`] for empty segments, unbalanced brackets or
/// more than one value filter, and [`PathError::Filter`] when the bracketed
/// filter is too long or does not parse.
pub fn compile(path: &str) -> Result<Queue<PathToken>, PathError> {
    compile_with_limit(path, DEFAULT_MAX_FILTER_LENGTH)
}

/// [`compile`] with an explicit length limit for the value filter.
pub fn compile_with_limit(
    path: &str,
    max_filter_length: usize,
) -> Result<Queue<PathToken>, PathError> {
    let trimmed = strip_urn(path.trim());
    if trimmed.is_empty() {
        return Err(PathError::syntax(path, "path is empty"));
    }

    let mut queue = Queue::new();
    let mut filters = 0;
    for segment in split_segments(path, trimmed)? {
        let Some(open) = segment.find('[') else {
            queue.offer(PathToken::Attr(segment.to_string()));
            continue;
        };

        filters += 1;
        if filters > 1 {
            return Err(PathError::syntax(path, "only one value filter is allowed"));
        }
        let name = segment[..open].trim();
        if name.is_empty() {
            return Err(PathError::syntax(
                path,
                "value filter must follow an attribute name",
            ));
        }
        let Some(inner) = segment[open + 1..].strip_suffix(']') else {
            return Err(PathError::syntax(
                path,
                "value filter must close at the end of its segment",
            ));
        };

        let node = parse_filter_with_limit(inner, max_filter_length)
            .map_err(|source| PathError::Filter {
                path: path.to_string(),
                source,
            })?;
        queue.offer(PathToken::Attr(name.to_string()));
        queue.offer(PathToken::Filter(node));
    }
    Ok(queue)
}

/// Split on `.` outside brackets and quoted text.
fn split_segments<'p>(original: &str, path: &'p str) -> Result<Vec<&'p str>, PathError> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in path.char_indices() {
        if in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '[' => {
                depth += 1;
                if depth > 1 {
                    return Err(PathError::syntax(
                        original,
                        "only one level of nested filter is allowed",
                    ));
                }
            }
            ']' => {
                if depth == 0 {
                    return Err(PathError::syntax(original, "unbalanced ']'"));
                }
                depth -= 1;
            }
            '.' if depth == 0 => {
                segments.push(path[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_quote {
        return Err(PathError::syntax(original, "unterminated string"));
    }
    if depth != 0 {
        return Err(PathError::syntax(original, "unbalanced '['"));
    }
    segments.push(path[start..].trim());

    if segments.iter().any(|s| s.is_empty()) {
        return Err(PathError::syntax(original, "path has an empty segment"));
    }
    Ok(segments)
}

/// Drop a leading schema URN qualifier: everything up to the last `:` that
/// precedes any bracket.
fn strip_urn(path: &str) -> &str {
    if !path
        .get(..URN_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(URN_PREFIX))
    {
        return path;
    }
    let head = path.find('[').map_or(path, |i| &path[..i]);
    match head.rfind(':') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Resolve a path string against a value described by `attribute`.
///
/// Returns the resolved value (`Null` when absent) and the descriptor of the
/// attribute the path names.
pub fn resolve<'s>(
    value: &Value,
    path: &str,
    attribute: &'s Attribute,
) -> Result<(Value, &'s Attribute), PathError> {
    let tokens: Vec<PathToken> = compile(path)?.into_iter().collect();
    resolve_tokens(value, &tokens, attribute, path)
}

/// Resolve pre-compiled components. `path` is only used in errors.
pub fn resolve_tokens<'s>(
    value: &Value,
    tokens: &[PathToken],
    attribute: &'s Attribute,
    path: &str,
) -> Result<(Value, &'s Attribute), PathError> {
    let target = target_attribute(attribute, tokens, path)?;
    let resolved = step_in(value, tokens, attribute, path)?;
    Ok((resolved, target))
}

/// Descriptor reached by following the attribute components.
pub fn target_attribute<'s>(
    attribute: &'s Attribute,
    tokens: &[PathToken],
    path: &str,
) -> Result<&'s Attribute, PathError> {
    let mut current = attribute;
    for token in tokens {
        if let PathToken::Attr(name) = token {
            current = current
                .sub_attribute(name)
                .ok_or_else(|| PathError::missing(path, name))?;
        }
    }
    Ok(current)
}

fn step_in(
    value: &Value,
    tokens: &[PathToken],
    attribute: &Attribute,
    path: &str,
) -> Result<Value, PathError> {
    let Some((head, rest)) = tokens.split_first() else {
        return Ok(value.clone());
    };

    match head {
        PathToken::Attr(name) => match value {
            Value::Null => Ok(Value::Null),
            Value::Object(map) => {
                let sub = attribute
                    .sub_attribute(name)
                    .ok_or_else(|| PathError::missing(path, name))?;
                match get_ignore_case(map, &sub.name) {
                    Some(child) => step_in(child, rest, sub, path),
                    None => Ok(Value::Null),
                }
            }
            Value::Array(items) => {
                let mut collected = Vec::with_capacity(items.len());
                for item in items {
                    match step_in(item, tokens, attribute, path)? {
                        Value::Null => {}
                        Value::Array(inner) => collected.extend(inner),
                        other => collected.push(other),
                    }
                }
                Ok(Value::Array(collected))
            }
            other => Err(PathError::Shape {
                path: path.to_string(),
                segment: name.clone(),
                found: kind_of(other),
            }),
        },
        PathToken::Filter(node) => match value {
            Value::Null => Ok(Value::Null),
            Value::Array(items) if attribute.multi_valued => {
                let element = attribute.element();
                let selected = items
                    .iter()
                    .filter(|item| evaluator::matches(node, item, element))
                    .cloned()
                    .collect();
                step_in(&Value::Array(selected), rest, attribute, path)
            }
            _ => Err(PathError::FilterOnSingleValue {
                path: path.to_string(),
            }),
        },
    }
}

/// Case-insensitive key lookup.
pub fn get_ignore_case<'v>(map: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Existing key in `map` matching `name` case-insensitively.
pub fn find_key(map: &Map<String, Value>, name: &str) -> Option<String> {
    if map.contains_key(name) {
        return Some(name.to_string());
    }
    map.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
