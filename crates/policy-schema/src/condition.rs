//! Rule conditions: boolean expressions over JSONPath selections.
//!
//! ```text
//! $.encryption != null
//! $.versioning == true && $.logging.enabled
//! $.acl in ['private', 'log-delivery-write'] || !($.public)
//! $.name =~ '^prod-[a-z]+$'
//! ```
//!
//! A condition states the compliant shape of a resource; the rules engine
//! reports a violation when it evaluates to false.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::path::JsonPath;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,

    #[error("at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("condition must reference the resource via a JSONPath starting with '$'")]
    NoPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::In => "in",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Operand {
    Path(JsonPath),
    Literal(Value),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Matches {
        left: Operand,
        pattern: Regex,
    },
    Truthy(Operand),
}

/// A parsed rule condition. Keeps its source text for messages.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(ConditionError::Syntax {
                offset: token.offset,
                message: format!("unexpected {}", token.kind),
            });
        }
        if !references_path(&expr) {
            return Err(ConditionError::NoPath);
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, properties: &Value) -> bool {
        eval(&self.expr, properties)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn references_path(expr: &Expr) -> bool {
    match expr {
        Expr::Or(items) | Expr::And(items) => items.iter().any(references_path),
        Expr::Not(inner) => references_path(inner),
        Expr::Compare { left, right, .. } => {
            matches!(left, Operand::Path(_)) || matches!(right, Operand::Path(_))
        }
        Expr::Matches { left, .. } | Expr::Truthy(left) => matches!(left, Operand::Path(_)),
    }
}

// ---------------------------------------------------------------------------
// Evaluation

static NULL: Value = Value::Null;

fn resolve<'a>(operand: &'a Operand, root: &'a Value) -> Vec<&'a Value> {
    match operand {
        Operand::Literal(value) => vec![value],
        Operand::Path(path) => {
            let selected = path.select(root);
            if selected.is_empty() {
                vec![&NULL]
            } else {
                selected
            }
        }
    }
}

fn eval(expr: &Expr, root: &Value) -> bool {
    match expr {
        Expr::Or(items) => items.iter().any(|e| eval(e, root)),
        Expr::And(items) => items.iter().all(|e| eval(e, root)),
        Expr::Not(inner) => !eval(inner, root),
        Expr::Truthy(operand) => resolve(operand, root).into_iter().any(is_truthy),
        Expr::Matches { left, pattern } => resolve(left, root)
            .into_iter()
            .any(|v| v.as_str().is_some_and(|s| pattern.is_match(s))),
        Expr::Compare { left, op, right } => {
            let lhs = resolve(left, root);
            let rhs = resolve(right, root);
            lhs.iter()
                .any(|l| rhs.iter().any(|r| compare(l, *op, r)))
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Gt => ordering(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            ordering(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Lt => ordering(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::In => match (left, right) {
            (_, Value::Array(items)) => items.iter().any(|item| values_equal(left, item)),
            (Value::String(needle), Value::String(haystack)) => haystack.contains(needle.as_str()),
            _ => false,
        },
    }
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone)]
enum TokenKind {
    Path(JsonPath),
    Literal(Value),
    Op(CompareOp),
    Match,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Path(path) => write!(f, "path '{}'", path),
            TokenKind::Literal(value) => write!(f, "literal {}", value),
            TokenKind::Op(op) => write!(f, "operator '{}'", op.symbol()),
            TokenKind::Match => f.write_str("operator '=~'"),
            TokenKind::And => f.write_str("'&&'"),
            TokenKind::Or => f.write_str("'||'"),
            TokenKind::Not => f.write_str("'!'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Comma => f.write_str("','"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn syntax(offset: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Syntax {
        offset,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let b = bytes[pos];
        let start = pos;
        let two = bytes.get(pos + 1).copied();

        let kind = match b {
            b' ' | b'\t' | b'\n' | b'\r' => {
                pos += 1;
                continue;
            }
            b'$' => {
                let (path, consumed) = JsonPath::parse_prefix(&source[pos..]).map_err(|e| {
                    syntax(pos + e.offset, format!("invalid JSONPath: {}", e.message))
                })?;
                pos += consumed;
                TokenKind::Path(path)
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b'[' => {
                pos += 1;
                TokenKind::LBracket
            }
            b']' => {
                pos += 1;
                TokenKind::RBracket
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b'&' if two == Some(b'&') => {
                pos += 2;
                TokenKind::And
            }
            b'|' if two == Some(b'|') => {
                pos += 2;
                TokenKind::Or
            }
            b'=' if two == Some(b'=') => {
                pos += 2;
                TokenKind::Op(CompareOp::Eq)
            }
            b'=' if two == Some(b'~') => {
                pos += 2;
                TokenKind::Match
            }
            b'!' if two == Some(b'=') => {
                pos += 2;
                TokenKind::Op(CompareOp::Ne)
            }
            b'!' => {
                pos += 1;
                TokenKind::Not
            }
            b'>' if two == Some(b'=') => {
                pos += 2;
                TokenKind::Op(CompareOp::Ge)
            }
            b'>' => {
                pos += 1;
                TokenKind::Op(CompareOp::Gt)
            }
            b'<' if two == Some(b'=') => {
                pos += 2;
                TokenKind::Op(CompareOp::Le)
            }
            b'<' => {
                pos += 1;
                TokenKind::Op(CompareOp::Lt)
            }
            b'\'' | b'"' => {
                let (text, next) = lex_string(source, pos)?;
                pos = next;
                TokenKind::Literal(Value::String(text))
            }
            b'-' | b'0'..=b'9' => {
                let (number, next) = lex_number(source, pos)?;
                pos = next;
                TokenKind::Literal(Value::Number(number))
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                match &source[start..pos] {
                    "null" => TokenKind::Literal(Value::Null),
                    "true" => TokenKind::Literal(Value::Bool(true)),
                    "false" => TokenKind::Literal(Value::Bool(false)),
                    "in" => TokenKind::Op(CompareOp::In),
                    word => {
                        return Err(syntax(
                            start,
                            format!(
                                "unexpected identifier '{}'; JSONPath expressions must start with '$'",
                                word
                            ),
                        ))
                    }
                }
            }
            _ => {
                let ch = source[pos..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character '{}'", ch)));
            }
        };

        tokens.push(Token { kind, offset: start });
    }

    Ok(tokens)
}

fn lex_string(source: &str, open: usize) -> Result<(String, usize), ConditionError> {
    let quote = source.as_bytes()[open] as char;
    let mut text = String::new();
    let mut chars = source[open + 1..].char_indices();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, escaped)) => text.push(escaped),
                None => break,
            },
            c if c == quote => return Ok((text, open + 1 + idx + 1)),
            c => text.push(c),
        }
    }

    Err(syntax(open, "unterminated string literal"))
}

fn lex_number(source: &str, start: usize) -> Result<(Number, usize), ConditionError> {
    let bytes = source.as_bytes();
    let mut pos = start;
    if bytes[pos] == b'-' {
        pos += 1;
    }
    let digits_start = pos;
    while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
        pos += 1;
    }
    if digits_start == pos {
        return Err(syntax(start, "expected a number after '-'"));
    }

    let text = &source[start..pos];
    if let Ok(int) = text.parse::<i64>() {
        return Ok((Number::from(int), pos));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(|n| (n, pos))
        .ok_or_else(|| syntax(start, format!("invalid number '{}'", text)))
}

// ---------------------------------------------------------------------------
// Parser

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, pred: impl Fn(&TokenKind) -> bool) -> bool {
        if self.peek().is_some_and(|t| pred(&t.kind)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut items = vec![self.parse_and()?];
        while self.eat(|k| matches!(k, TokenKind::Or)) {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut items = vec![self.parse_unary()?];
        while self.eat(|k| matches!(k, TokenKind::And)) {
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.eat(|k| matches!(k, TokenKind::Not)) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(|k| matches!(k, TokenKind::LParen)) {
            let inner = self.parse_or()?;
            if !self.eat(|k| matches!(k, TokenKind::RParen)) {
                return Err(syntax(self.offset(), "expected ')'"));
            }
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_operand()?;

        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Op(op)) => {
                self.pos += 1;
                let right = self.parse_operand()?;
                Ok(Expr::Compare { left, op, right })
            }
            Some(TokenKind::Match) => {
                let offset = self.offset();
                self.pos += 1;
                let pattern = match self.next() {
                    Some(Token {
                        kind: TokenKind::Literal(Value::String(pattern)),
                        ..
                    }) => pattern,
                    _ => return Err(syntax(offset, "'=~' expects a string pattern")),
                };
                let pattern = Regex::new(&pattern).map_err(|e| ConditionError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                Ok(Expr::Matches { left, pattern })
            }
            _ => Ok(Expr::Truthy(left)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ConditionError> {
        let offset = self.offset();
        match self.next() {
            Some(Token {
                kind: TokenKind::Path(path),
                ..
            }) => Ok(Operand::Path(path)),
            Some(Token {
                kind: TokenKind::Literal(value),
                ..
            }) => Ok(Operand::Literal(value)),
            Some(Token {
                kind: TokenKind::LBracket,
                ..
            }) => self.parse_list().map(Operand::Literal),
            Some(token) => Err(syntax(
                token.offset,
                format!("expected a JSONPath or literal, found {}", token.kind),
            )),
            None => Err(syntax(offset, "unexpected end of condition")),
        }
    }

    fn parse_list(&mut self) -> Result<Value, ConditionError> {
        let mut items = Vec::new();
        if self.eat(|k| matches!(k, TokenKind::RBracket)) {
            return Ok(Value::Array(items));
        }
        loop {
            let offset = self.offset();
            match self.next() {
                Some(Token {
                    kind: TokenKind::Literal(value),
                    ..
                }) => items.push(value),
                _ => return Err(syntax(offset, "list items must be literals")),
            }
            if self.eat(|k| matches!(k, TokenKind::Comma)) {
                continue;
            }
            if self.eat(|k| matches!(k, TokenKind::RBracket)) {
                return Ok(Value::Array(items));
            }
            return Err(syntax(self.offset(), "expected ',' or ']'"));
        }
    }
}
