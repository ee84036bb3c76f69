//! SCIM 2.0 Filter Parser
//!
//! Operator-precedence (shunting-yard) parser that builds a binary expression
//! tree from the tokens produced by [`tokenize`].
//!
//! ## Nested paths
//!
//! Before the main loop, every nested-path token such as
//! `emails[type eq "work" and primary eq true]` is spliced into the flat token
//! stream as `( emails.type eq "work" and emails.primary eq true )`. The
//! parentheses keep the bracketed expression grouped regardless of the
//! operators that surround it.
//!
//! ## Example
//!
//! ```ignore
//! use scim_engine::scim::parse_filter;
//!
//! let filter = parse_filter(r#"userName eq "john" or age gt 18"#)?;
//! assert_eq!(filter.operator(), Some(Operator::Or));
//! ```

use std::fmt;

use super::{
    collections::Stack,
    error::FilterError,
    token::{Associativity, Operator, Params, Token, TokenType, tokenize},
};

/// Default upper bound on filter text length, in bytes.
pub const DEFAULT_MAX_FILTER_LENGTH: usize = 4096;

/// Upper bound on expression tree depth. Evaluation, display and drop all
/// recurse over the tree.
pub const MAX_FILTER_DEPTH: usize = 512;

/// Binary expression tree node.
///
/// Leaves carry path or constant tokens. Internal nodes carry operators; unary
/// operators (`not`, `pr`) keep their operand in `left`.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub data: Token,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
}

impl Node {
    pub fn leaf(data: Token) -> Self {
        Self {
            data,
            left: None,
            right: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn operator(&self) -> Option<Operator> {
        self.data.operator()
    }

    pub fn left(&self) -> Option<&Node> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&Node> {
        self.right.as_deref()
    }

    /// Visit every node in pre-order.
    pub fn walk<F: FnMut(&Node)>(&self, f: &mut F) {
        f(self);
        if let Some(left) = &self.left {
            left.walk(f);
        }
        if let Some(right) = &self.right {
            right.walk(f);
        }
    }

    /// Count internal (operator) nodes and leaves.
    pub fn counts(&self) -> (usize, usize) {
        let mut internal = 0;
        let mut leaves = 0;
        self.walk(&mut |node| {
            if node.is_leaf() {
                leaves += 1;
            } else {
                internal += 1;
            }
        });
        (internal, leaves)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.operator() else {
            return f.write_str(&self.data.value);
        };
        match (op, self.left(), self.right()) {
            (Operator::Not, Some(operand), _) => write!(f, "not ({})", operand),
            (Operator::Pr, Some(operand), _) => write!(f, "{} pr", operand),
            (Operator::And | Operator::Or, Some(l), Some(r)) => write!(f, "({} {} {})", l, op, r),
            (_, Some(l), Some(r)) => write!(f, "{} {} {}", l, op, r),
            _ => f.write_str(&self.data.value),
        }
    }
}

/// Tokenize and parse filter text, rejecting input longer than
/// [`DEFAULT_MAX_FILTER_LENGTH`].
pub fn parse_filter(input: &str) -> Result<Node, FilterError> {
    parse_filter_with_limit(input, DEFAULT_MAX_FILTER_LENGTH)
}

/// Tokenize and parse filter text with an explicit length limit.
pub fn parse_filter_with_limit(input: &str, max_length: usize) -> Result<Node, FilterError> {
    if input.len() > max_length {
        return Err(FilterError::TooLong {
            length: input.len(),
            max: max_length,
        });
    }
    let tokens = tokenize(input)?;
    let node = parse(tokens)?;
    tracing::trace!(filter = %input, tree = %node, "Parsed filter");
    Ok(node)
}

/// Build an expression tree from a token sequence.
///
/// # Errors
///
/// Returns a [`FilterError`] when an operator lacks operands, when
/// parentheses do not balance, when operands remain without an operator to
/// join them, when an operand has the wrong kind (for example a constant
/// on the left of `eq`), or when the tree would nest deeper than
/// [`MAX_FILTER_DEPTH`].
pub fn parse(tokens: Vec<Token>) -> Result<Node, FilterError> {
    let tokens = splice(tokens)?;

    // Each output entry carries the depth of its subtree.
    let mut output: Stack<(Node, usize)> = Stack::with_capacity(tokens.len());
    let mut operators: Stack<Token> = Stack::new();

    for token in tokens {
        match token.kind {
            TokenType::Path | TokenType::Constant => output.push((Node::leaf(token), 1)),
            TokenType::Relational | TokenType::Logical => {
                let Some(incoming) = token.operator() else {
                    return Err(FilterError::InvalidOperand {
                        operator: token.value.clone(),
                        found: "operator token without operator metadata".to_string(),
                    });
                };
                while let Some(top) = operators.peek() {
                    let Some(stacked) = top.operator() else {
                        break;
                    };
                    let yields = match incoming.associativity() {
                        Associativity::Left => incoming.precedence() <= stacked.precedence(),
                        Associativity::Right => incoming.precedence() < stacked.precedence(),
                    };
                    if !yields {
                        break;
                    }
                    if let Some(top) = operators.pop() {
                        reduce(top, &mut output)?;
                    }
                }
                operators.push(token);
            }
            TokenType::Parenthesis if token.is_open_paren() => operators.push(token),
            TokenType::Parenthesis => loop {
                match operators.pop() {
                    None => return Err(FilterError::MismatchedParenthesis),
                    Some(top) if top.is_open_paren() => break,
                    Some(top) => reduce(top, &mut output)?,
                }
            },
            TokenType::NestedPath => {
                // splice() flattens every nested path
                return Err(FilterError::NestingTooDeep { position: 0 });
            }
        }
    }

    while let Some(top) = operators.pop() {
        if top.kind == TokenType::Parenthesis {
            return Err(FilterError::MismatchedParenthesis);
        }
        reduce(top, &mut output)?;
    }

    let root = match output.len() {
        0 => return Err(FilterError::Empty),
        1 => output.pop().map(|(node, _)| node).ok_or(FilterError::Empty)?,
        count => return Err(FilterError::ExcessOperands { count }),
    };
    check_operands(&root)?;
    Ok(root)
}

/// Flatten nested-path tokens into parenthesized, prefixed token runs.
fn splice(tokens: Vec<Token>) -> Result<Vec<Token>, FilterError> {
    let mut flat = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.kind != TokenType::NestedPath {
            flat.push(token);
            continue;
        }
        let outer = token.value;
        let Params::Nested(nested) = token.params else {
            return Err(FilterError::DanglingFilter { position: 0 });
        };
        flat.push(Token::parenthesis(true));
        for inner in nested {
            match inner.kind {
                TokenType::Path => flat.push(Token::path(format!("{}.{}", outer, inner.value))),
                TokenType::NestedPath => return Err(FilterError::NestingTooDeep { position: 0 }),
                _ => flat.push(inner),
            }
        }
        flat.push(Token::parenthesis(false));
    }
    Ok(flat)
}

/// Pop an operator's operands off the output stack and push the joined node.
fn reduce(token: Token, output: &mut Stack<(Node, usize)>) -> Result<(), FilterError> {
    let Some(op) = token.operator() else {
        return Err(FilterError::MismatchedParenthesis);
    };
    let (node, depth) = match op.arity() {
        1 => {
            let (operand, depth) =
                output
                    .pop()
                    .ok_or_else(|| FilterError::InsufficientArguments {
                        operator: token.value.clone(),
                    })?;
            let node = Node {
                data: token,
                left: Some(Box::new(operand)),
                right: None,
            };
            (node, depth + 1)
        }
        2 => {
            let (Some((right, right_depth)), Some((left, left_depth))) =
                (output.pop(), output.pop())
            else {
                return Err(FilterError::InsufficientArguments {
                    operator: token.value.clone(),
                });
            };
            let node = Node {
                data: token,
                left: Some(Box::new(left)),
                right: Some(Box::new(right)),
            };
            (node, left_depth.max(right_depth) + 1)
        }
        arity => {
            return Err(FilterError::UnsupportedArity {
                operator: token.value.clone(),
                arity,
            });
        }
    };
    if depth > MAX_FILTER_DEPTH {
        return Err(FilterError::TooDeep {
            max: MAX_FILTER_DEPTH,
        });
    }
    output.push((node, depth));
    Ok(())
}

/// Reject trees whose operand kinds make no sense: relational operators need
/// a path on the left and a constant on the right, logical operators need
/// sub-expressions.
fn check_operands(node: &Node) -> Result<(), FilterError> {
    let Some(op) = node.operator() else {
        return match node.data.kind {
            TokenType::Path | TokenType::Constant if node.is_leaf() => Err(
                FilterError::InvalidOperand {
                    operator: "(none)".to_string(),
                    found: node.data.value.clone(),
                },
            ),
            _ => Ok(()),
        };
    };

    let invalid = |found: &Node| FilterError::InvalidOperand {
        operator: op.to_string(),
        found: found.to_string(),
    };

    if op.is_logical() {
        for child in [node.left(), node.right()].into_iter().flatten() {
            if child.operator().is_none() {
                return Err(invalid(child));
            }
            check_operands(child)?;
        }
        return Ok(());
    }

    match node.left() {
        Some(left) if left.data.kind == TokenType::Path => {}
        Some(left) => return Err(invalid(left)),
        None => {
            return Err(FilterError::InsufficientArguments {
                operator: op.to_string(),
            });
        }
    }
    if op != Operator::Pr {
        match node.right() {
            Some(right) if right.data.kind == TokenType::Constant => {}
            Some(right) => return Err(invalid(right)),
            None => {
                return Err(FilterError::InsufficientArguments {
                    operator: op.to_string(),
                });
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
