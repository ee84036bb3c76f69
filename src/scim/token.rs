//! SCIM 2.0 Filter Tokenizer
//!
//! Single-pass character scanner that turns filter text into typed tokens.
//!
//! ## Rules
//!
//! - Whitespace ends the pending word, except inside double-quoted text
//! - `(` and `)` are emitted immediately as parenthesis tokens
//! - `[` opens a nested value filter attached to the preceding path; only one
//!   level of nesting is allowed
//! - A path followed by a bracketed region becomes a single nested-path token
//!   carrying the bracketed tokens
//!
//! Words are classified in order: operator keyword, parenthesis, quoted string,
//! boolean, null, integer, decimal, and finally attribute path.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;

use super::error::FilterError;

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Relational,
    Logical,
    Parenthesis,
    Constant,
    Path,
    NestedPath,
}

/// Operator associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// Logical and relational operators per RFC 7644.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Starts with
    Sw,
    /// Ends with
    Ew,
    /// Contains
    Co,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Present
    Pr,
}

impl Operator {
    /// Match an operator keyword, ignoring case.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let op = match word.to_ascii_lowercase().as_str() {
            "and" => Operator::And,
            "or" => Operator::Or,
            "not" => Operator::Not,
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "sw" => Operator::Sw,
            "ew" => Operator::Ew,
            "co" => Operator::Co,
            "gt" => Operator::Gt,
            "ge" => Operator::Ge,
            "lt" => Operator::Lt,
            "le" => Operator::Le,
            "pr" => Operator::Pr,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Sw => "sw",
            Operator::Ew => "ew",
            Operator::Co => "co",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Pr => "pr",
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }

    /// Binding strength; relational operators bind tightest, `or` loosest.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Or => 1,
            Operator::And => 2,
            Operator::Not => 3,
            _ => 4,
        }
    }

    pub fn associativity(&self) -> Associativity {
        match self {
            Operator::Not => Associativity::Right,
            _ => Associativity::Left,
        }
    }

    /// Number of operands consumed by this operator.
    pub fn arity(&self) -> usize {
        match self {
            Operator::Not | Operator::Pr => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed comparison value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    String(String),
    Boolean(bool),
    Null,
    Integer(i64),
    Decimal(Decimal),
}

impl Constant {
    /// Human-readable kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Constant::String(_) => "string",
            Constant::Boolean(_) => "boolean",
            Constant::Null => "null",
            Constant::Integer(_) => "integer",
            Constant::Decimal(_) => "decimal",
        }
    }

    fn parse(word: &str) -> Option<Self> {
        if word.len() >= 2 && word.starts_with('"') && word.ends_with('"') {
            return Some(Constant::String(unescape(&word[1..word.len() - 1])));
        }
        if word.eq_ignore_ascii_case("true") {
            return Some(Constant::Boolean(true));
        }
        if word.eq_ignore_ascii_case("false") {
            return Some(Constant::Boolean(false));
        }
        if word.eq_ignore_ascii_case("null") {
            return Some(Constant::Null);
        }
        if let Ok(i) = word.parse::<i64>() {
            return Some(Constant::Integer(i));
        }
        if !word.bytes().any(|b| b.is_ascii_digit()) {
            return None;
        }
        Decimal::from_str(word)
            .or_else(|_| Decimal::from_scientific(word))
            .ok()
            .map(Constant::Decimal)
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Metadata attached to a token.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    None,
    Operator(Operator),
    Constant(Constant),
    /// Tokens of the bracketed filter of a nested path.
    Nested(Vec<Token>),
}

/// A lexical token. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub value: String,
    pub kind: TokenType,
    pub params: Params,
}

impl Token {
    /// Classify a word into a token.
    pub fn create(word: &str) -> Self {
        if let Some(op) = Operator::from_keyword(word) {
            let kind = if op.is_logical() {
                TokenType::Logical
            } else {
                TokenType::Relational
            };
            return Self {
                value: word.to_string(),
                kind,
                params: Params::Operator(op),
            };
        }

        if word == "(" || word == ")" {
            return Self::parenthesis(word == "(");
        }

        if let Some(constant) = Constant::parse(word) {
            return Self {
                value: word.to_string(),
                kind: TokenType::Constant,
                params: Params::Constant(constant),
            };
        }

        Self::path(word)
    }

    pub fn path(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: TokenType::Path,
            params: Params::None,
        }
    }

    pub fn parenthesis(open: bool) -> Self {
        Self {
            value: if open { "(" } else { ")" }.to_string(),
            kind: TokenType::Parenthesis,
            params: Params::None,
        }
    }

    pub fn operator(&self) -> Option<Operator> {
        match self.params {
            Params::Operator(op) => Some(op),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<&Constant> {
        match &self.params {
            Params::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn nested(&self) -> Option<&[Token]> {
        match &self.params {
            Params::Nested(tokens) => Some(tokens),
            _ => None,
        }
    }

    pub fn is_open_paren(&self) -> bool {
        self.kind == TokenType::Parenthesis && self.value == "("
    }

    pub fn is_close_paren(&self) -> bool {
        self.kind == TokenType::Parenthesis && self.value == ")"
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            Params::Nested(tokens) => {
                write!(f, "{}[", self.value)?;
                for (i, token) in tokens.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", token)?;
                }
                f.write_str("]")
            }
            _ => f.write_str(&self.value),
        }
    }
}

/// Split filter text into tokens.
///
/// # Errors
///
/// Returns an error on unbalanced quotes, brackets or parentheses, on a
/// second level of bracket nesting, or when the input holds no tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut lexer = Lexer::default();
    for (position, c) in input.char_indices() {
        lexer.feed(position, c)?;
    }
    lexer.finish()
}

#[derive(Default)]
struct Lexer {
    outer: Vec<Token>,
    nested: Vec<Token>,
    buffer: String,
    in_quote: bool,
    quote_start: usize,
    escaped: bool,
    nesting: usize,
    /// Open parenthesis count, outside and inside the bracketed region.
    parens: [usize; 2],
    after_filter: bool,
}

impl Lexer {
    fn feed(&mut self, position: usize, c: char) -> Result<(), FilterError> {
        if self.in_quote {
            self.buffer.push(c);
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_quote = false;
            }
            return Ok(());
        }

        if self.after_filter {
            if !(c.is_whitespace() || c == ')') {
                return Err(FilterError::UnexpectedAfterFilter { found: c, position });
            }
            self.after_filter = false;
        }

        match c {
            '"' => {
                self.in_quote = true;
                self.quote_start = position;
                self.buffer.push(c);
            }
            c if c.is_whitespace() => self.flush(),
            '[' => {
                self.flush();
                if self.nesting >= 1 {
                    return Err(FilterError::NestingTooDeep { position });
                }
                if !matches!(self.outer.last(), Some(t) if t.kind == TokenType::Path) {
                    return Err(FilterError::DanglingFilter { position });
                }
                self.nesting = 1;
            }
            ']' => {
                if self.nesting == 0 {
                    return Err(FilterError::MismatchedBracket { position });
                }
                self.flush();
                if self.parens[1] != 0 {
                    return Err(FilterError::MismatchedParenthesis);
                }
                if self.nested.is_empty() {
                    return Err(FilterError::Empty);
                }
                self.nesting = 0;
                let tokens = std::mem::take(&mut self.nested);
                // The '[' guard guarantees a path token on top of the outer list.
                let Some(path) = self.outer.pop() else {
                    return Err(FilterError::DanglingFilter { position });
                };
                self.outer.push(Token {
                    value: path.value,
                    kind: TokenType::NestedPath,
                    params: Params::Nested(tokens),
                });
                self.after_filter = true;
            }
            '(' => {
                self.flush();
                self.parens[self.nesting] += 1;
                self.emit(Token::parenthesis(true));
            }
            ')' => {
                self.flush();
                if self.parens[self.nesting] == 0 {
                    return Err(FilterError::MismatchedParenthesis);
                }
                self.parens[self.nesting] -= 1;
                self.emit(Token::parenthesis(false));
            }
            _ => self.buffer.push(c),
        }
        Ok(())
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.buffer);
        self.emit(Token::create(&word));
    }

    fn emit(&mut self, token: Token) {
        if self.nesting > 0 {
            self.nested.push(token);
        } else {
            self.outer.push(token);
        }
    }

    fn finish(mut self) -> Result<Vec<Token>, FilterError> {
        if self.in_quote {
            return Err(FilterError::UnterminatedString {
                position: self.quote_start,
            });
        }
        self.flush();
        if self.nesting > 0 {
            return Err(FilterError::MismatchedBracket {
                position: self.quote_start.max(self.outer.len()),
            });
        }
        if self.parens[0] != 0 {
            return Err(FilterError::MismatchedParenthesis);
        }
        if self.outer.is_empty() {
            return Err(FilterError::Empty);
        }
        Ok(self.outer)
    }
}

// =============================================================================
// Tests
// =============================================================================
