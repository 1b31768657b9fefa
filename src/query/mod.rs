//! Filter-expression language for ticket listings.
//!
//! A small jq-flavored language evaluated against the externally visible
//! ticket shape (the same lowercase field names that appear on the branch):
//!
//! ```text
//! query   := ".tickets[]" ( "|" "select" "(" cond ")" )*
//! cond    := and ( "or" and )*
//! and     := cmp ( "and" cmp )*
//! cmp     := "(" cond ")"
//!          | "contains" "(" path "," literal ")"
//!          | operand ( "==" | "!=" | "<" | "<=" | ">" | ">=" ) operand
//! operand := path | literal
//! path    := "." field ( "." field )*
//! literal := string | integer | "true" | "false"
//! ```
//!
//! `contains` matches membership in a sequence field (`.labels`) or a
//! substring of a string field. [`apply`] preserves input order among
//! matches. [`validate`] parses and then runs the expression over a fixed
//! synthetic ticket set so parse and evaluation errors surface before a
//! filter is ever persisted; it says nothing about whether the filter is
//! *useful*.

use crate::models::{Comment, Ticket};
use crate::{Error, Result};
use serde_json::Value;

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    stages: Vec<Cond>,
}

#[derive(Debug, Clone, PartialEq)]
enum Cond {
    Or(Box<Cond>, Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Cmp {
        lhs: Operand,
        op: CmpOp,
        rhs: Operand,
    },
    Contains {
        path: Vec<String>,
        needle: Literal,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(Vec<String>),
    Lit(Literal),
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Query {
    /// Compile an expression.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        Parser { tokens, pos: 0 }.parse_query()
    }

    /// Does this ticket pass every stage?
    pub fn matches(&self, ticket: &Ticket) -> Result<bool> {
        let value = ticket.to_value();
        for stage in &self.stages {
            if !eval(stage, &value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Filter `tickets` by `expression`, preserving input order among matches.
pub fn apply(expression: &str, tickets: &[Ticket]) -> Result<Vec<Ticket>> {
    let query = Query::parse(expression)?;
    let mut matched = Vec::new();
    for ticket in tickets {
        if query.matches(ticket)? {
            matched.push(ticket.clone());
        }
    }
    Ok(matched)
}

/// Check that an expression parses and evaluates cleanly.
///
/// Runs against one synthetic ticket per representative status, so field
/// typos and type mismatches are rejected before the filter is persisted.
pub fn validate(expression: &str) -> Result<()> {
    let query = Query::parse(expression)?;
    for ticket in synthetic_tickets() {
        query.matches(&ticket)?;
    }
    Ok(())
}

fn synthetic_tickets() -> Vec<Ticket> {
    ["new", "open", "closed"]
        .iter()
        .enumerate()
        .map(|(i, status)| Ticket {
            id: i as u64 + 1,
            title: format!("Synthetic {}", status),
            description: "validation probe".to_string(),
            labels: vec!["probe".to_string()],
            priority: 1,
            severity: 1,
            status: (*status).to_string(),
            created: 0,
            comments: vec![Comment {
                id: 0,
                created: 0,
                body: "probe".to_string(),
                author: "probe <probe@example.com>".to_string(),
            }],
            next_comment_id: 1,
        })
        .collect()
}

// === Tokenizer ===

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Ident(String),
    Str(String),
    Int(i64),
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Eq);
                } else {
                    return Err(Error::InvalidFilter("expected ==".to_string()));
                }
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    return Err(Error::InvalidFilter("expected !=".to_string()));
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => literal.push('"'),
                            Some('\\') => literal.push('\\'),
                            Some(other) => {
                                return Err(Error::InvalidFilter(format!(
                                    "unsupported escape \\{}",
                                    other
                                )));
                            }
                            None => {
                                return Err(Error::InvalidFilter(
                                    "unterminated string".to_string(),
                                ));
                            }
                        },
                        Some(other) => literal.push(other),
                        None => {
                            return Err(Error::InvalidFilter("unterminated string".to_string()));
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '-' | '0'..='9' => {
                let mut literal = String::new();
                if c == '-' {
                    literal.push(c);
                    chars.next();
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: i64 = literal
                    .parse()
                    .map_err(|_| Error::InvalidFilter(format!("bad integer {}", literal)))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(Error::InvalidFilter(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

// === Parser ===

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
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

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        match self.next() {
            Some(ref t) if t == token => Ok(()),
            other => Err(Error::InvalidFilter(format!(
                "expected {}, found {:?}",
                what, other
            ))),
        }
    }

    fn expect_ident(&mut self, name: &str) -> Result<()> {
        match self.next() {
            Some(Token::Ident(ref id)) if id == name => Ok(()),
            other => Err(Error::InvalidFilter(format!(
                "expected '{}', found {:?}",
                name, other
            ))),
        }
    }

    fn parse_query(mut self) -> Result<Query> {
        // Head: .tickets[]
        self.expect(&Token::Dot, "'.tickets[]'")?;
        self.expect_ident("tickets")?;
        self.expect(&Token::LBracket, "'['")?;
        self.expect(&Token::RBracket, "']'")?;

        let mut stages = Vec::new();
        while let Some(token) = self.next() {
            if token != Token::Pipe {
                return Err(Error::InvalidFilter(format!(
                    "expected '|', found {:?}",
                    token
                )));
            }
            self.expect_ident("select")?;
            self.expect(&Token::LParen, "'('")?;
            let cond = self.parse_cond()?;
            self.expect(&Token::RParen, "')'")?;
            stages.push(cond);
        }

        Ok(Query { stages })
    }

    fn parse_cond(&mut self) -> Result<Cond> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Ident(id)) if id == "or") {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Cond::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Cond> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::Ident(id)) if id == "and") {
            self.next();
            let rhs = self.parse_cmp()?;
            lhs = Cond::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Cond> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.next();
            let cond = self.parse_cond()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(cond);
        }

        if matches!(self.peek(), Some(Token::Ident(id)) if id == "contains") {
            self.next();
            self.expect(&Token::LParen, "'('")?;
            let path = self.parse_path()?;
            self.expect(&Token::Comma, "','")?;
            let needle = self.parse_literal()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(Cond::Contains { path, needle });
        }

        let lhs = self.parse_operand()?;
        let op = match self.next() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            other => {
                return Err(Error::InvalidFilter(format!(
                    "expected comparison operator, found {:?}",
                    other
                )));
            }
        };
        let rhs = self.parse_operand()?;
        Ok(Cond::Cmp { lhs, op, rhs })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        if matches!(self.peek(), Some(Token::Dot)) {
            return Ok(Operand::Path(self.parse_path()?));
        }
        Ok(Operand::Lit(self.parse_literal()?))
    }

    fn parse_path(&mut self) -> Result<Vec<String>> {
        self.expect(&Token::Dot, "'.'")?;
        let mut path = Vec::new();
        loop {
            match self.next() {
                Some(Token::Ident(field)) => path.push(field),
                other => {
                    return Err(Error::InvalidFilter(format!(
                        "expected field name, found {:?}",
                        other
                    )));
                }
            }
            if matches!(self.peek(), Some(Token::Dot)) {
                self.next();
            } else {
                break;
            }
        }
        Ok(path)
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Int(n)) => Ok(Literal::Int(n)),
            Some(Token::Ident(ref id)) if id == "true" => Ok(Literal::Bool(true)),
            Some(Token::Ident(ref id)) if id == "false" => Ok(Literal::Bool(false)),
            other => Err(Error::InvalidFilter(format!(
                "expected literal, found {:?}",
                other
            ))),
        }
    }
}

// === Evaluation ===

fn eval(cond: &Cond, record: &Value) -> Result<bool> {
    match cond {
        Cond::Or(a, b) => Ok(eval(a, record)? || eval(b, record)?),
        Cond::And(a, b) => Ok(eval(a, record)? && eval(b, record)?),
        Cond::Cmp { lhs, op, rhs } => {
            let lhs = resolve(lhs, record)?;
            let rhs = resolve(rhs, record)?;
            compare(&lhs, *op, &rhs)
        }
        Cond::Contains { path, needle } => {
            let haystack = lookup(record, path)?;
            let needle = literal_value(needle);
            match haystack {
                Value::Array(items) => Ok(items.iter().any(|item| item == &needle)),
                Value::String(s) => match needle {
                    Value::String(sub) => Ok(s.contains(&sub)),
                    _ => Err(Error::InvalidFilter(
                        "contains on a string field needs a string literal".to_string(),
                    )),
                },
                _ => Err(Error::InvalidFilter(format!(
                    "contains needs a sequence or string field, .{} is neither",
                    path.join(".")
                ))),
            }
        }
    }
}

fn resolve(operand: &Operand, record: &Value) -> Result<Value> {
    match operand {
        Operand::Path(path) => lookup(record, path).cloned(),
        Operand::Lit(lit) => Ok(literal_value(lit)),
    }
}

fn lookup<'a>(record: &'a Value, path: &[String]) -> Result<&'a Value> {
    let mut value = record;
    for field in path {
        value = value.get(field).ok_or_else(|| {
            Error::InvalidFilter(format!("unknown field .{}", path.join(".")))
        })?;
    }
    Ok(value)
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Int(n) => Value::Number((*n).into()),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> Result<bool> {
    // Equality is structural and works for any value type; ordering
    // requires two numbers or two strings.
    match op {
        CmpOp::Eq => return Ok(lhs == rhs),
        CmpOp::Ne => return Ok(lhs != rhs),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {}
    }
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a
                .as_f64()
                .ok_or_else(|| Error::InvalidFilter("non-finite number".to_string()))?;
            let b = b
                .as_f64()
                .ok_or_else(|| Error::InvalidFilter("non-finite number".to_string()))?;
            a.partial_cmp(&b)
                .ok_or_else(|| Error::InvalidFilter("numbers are not comparable".to_string()))?
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            return Err(Error::InvalidFilter(format!(
                "cannot order {} against {}",
                type_name(lhs),
                type_name(rhs)
            )));
        }
    };
    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => !ordering.is_eq(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
