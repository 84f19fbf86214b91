//! Predicate engine for `when` expressions
//!
//! Evaluates a small expression language over JSON values:
//! - comparisons: == != < > <= >=
//! - logic: && || !
//! - literals: numbers, single/double-quoted strings, true, false, null
//! - identifiers: dotted paths resolved against the binding
//!
//! A `when` predicate must evaluate to a bool; anything else is a type
//! error. The expression arrives pre-interpolated, so `"{{x}} > 3"` is
//! usually evaluated as `"5 > 3"`.

use serde_json::Value;

use crate::binding::template::lookup_path;
use crate::binding::{value_kind, Binding};
use crate::error::{PlaitError, Result};

/// Evaluate an expression against a binding.
pub fn evaluate(expression: &str, binding: &Binding) -> Result<Value> {
    let tokens = tokenize(expression).map_err(|reason| PlaitError::PredicateFailed {
        expression: expression.to_string(),
        reason,
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        binding,
    };
    let value = parser
        .parse_or()
        .and_then(|v| {
            if parser.pos == parser.tokens.len() {
                Ok(v)
            } else {
                Err("trailing tokens after expression".to_string())
            }
        })
        .map_err(|reason| PlaitError::PredicateFailed {
            expression: expression.to_string(),
            reason,
        })?;
    Ok(value)
}

/// Evaluate a `when` predicate. A non-bool result is a type error.
pub fn evaluate_predicate(expression: &str, binding: &Binding) -> Result<bool> {
    match evaluate(expression, binding)? {
        Value::Bool(b) => Ok(b),
        other => Err(PlaitError::PredicateNotBool {
            expression: expression.to_string(),
            value_type: value_kind(&other).to_string(),
        }),
    }
}

// ═══════════════════════════════════════════
// TOKENIZER
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(i, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' => {
                chars.next();
                match chars.next() {
                    Some((_, '&')) => tokens.push(Token::And),
                    _ => return Err("expected '&&'".to_string()),
                }
            }
            '|' => {
                chars.next();
                match chars.next() {
                    Some((_, '|')) => tokens.push(Token::Or),
                    _ => return Err("expected '||'".to_string()),
                }
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => tokens.push(Token::Eq),
                    _ => return Err("expected '=='".to_string()),
                }
            }
            '!' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    s.push(c);
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                chars.next();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map(|&(j, _)| j).unwrap_or(expr.len());
                let text = &expr[start..end];
                let n: f64 = text
                    .parse()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                chars.next();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map(|&(j, _)| j).unwrap_or(expr.len());
                match &expr[start..end] {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    word => tokens.push(Token::Ident(word.to_string())),
                }
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }

    Ok(tokens)
}

// ═══════════════════════════════════════════
// PARSER / EVALUATOR
// ═══════════════════════════════════════════

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    binding: &'a Binding,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> std::result::Result<Value, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Value::Bool(as_bool(&left, "||")? || as_bool(&right, "||")?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<Value, String> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_unary()?;
            left = Value::Bool(as_bool(&left, "&&")? && as_bool(&right, "&&")?);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> std::result::Result<Value, String> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!as_bool(&value, "!")?));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> std::result::Result<Value, String> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => Cmp::Eq,
            Some(Token::Ne) => Cmp::Ne,
            Some(Token::Lt) => Cmp::Lt,
            Some(Token::Gt) => Cmp::Gt,
            Some(Token::Le) => Cmp::Le,
            Some(Token::Ge) => Cmp::Ge,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_primary()?;
        compare(&left, &right, op).map(Value::Bool)
    }

    fn parse_primary(&mut self) -> std::result::Result<Value, String> {
        match self.next() {
            Some(Token::Number(n)) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| "number is not finite".to_string()),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Ident(path)) => lookup_path(self.binding, &path)
                .cloned()
                .ok_or_else(|| format!("unknown identifier '{}'", path)),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("expected ')'".to_string()),
                }
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

#[derive(Clone, Copy)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

fn as_bool(value: &Value, op: &str) -> std::result::Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(format!("'{}' requires bool operands, got {}", op, other)),
    }
}

/// Numeric view of a value: numbers directly, numeric strings parsed.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value, op: Cmp) -> std::result::Result<bool, String> {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return Ok(match op {
            Cmp::Eq => l == r,
            Cmp::Ne => l != r,
            Cmp::Lt => l < r,
            Cmp::Gt => l > r,
            Cmp::Le => l <= r,
            Cmp::Ge => l >= r,
        });
    }

    match op {
        Cmp::Eq => Ok(left == right),
        Cmp::Ne => Ok(left != right),
        _ => match (left, right) {
            (Value::String(l), Value::String(r)) => Ok(match op {
                Cmp::Lt => l < r,
                Cmp::Gt => l > r,
                Cmp::Le => l <= r,
                Cmp::Ge => l >= r,
                _ => unreachable!("eq/ne handled above"),
            }),
            _ => Err(format!(
                "cannot order {} against {}",
                value_kind(left),
                value_kind(right)
            )),
        },
    }
}
