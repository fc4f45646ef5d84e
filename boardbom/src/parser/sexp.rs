//! S-expression reader for KiCad board files.
//!
//! Produces a generic tree of symbols, strings, numbers and lists. Nothing in
//! here knows what a footprint is: any well-formed nested-list text parses.
//! List nodes remember the position of their opening paren so later stages
//! can point back into the source.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Location in the source text. Line and column are 1-based (columns count
/// characters), the offset is a 0-based byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("empty input")]
    Empty,
    #[error("unclosed list")]
    UnclosedList,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unexpected ')'")]
    UnexpectedClose,
    #[error("unexpected content after the root expression")]
    TrailingContent,
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {position}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: Position) -> Self {
        Self { kind, position }
    }
}

/// A numeric literal. The literal text is kept so printing a tree gives back
/// exactly what was read (`1e3` stays `1e3`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Number {
    pub value: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub enum SExp {
    Symbol(String),
    Str(String),
    Number(Number),
    List { items: Vec<SExp>, pos: Position },
}

/// Structural equality; list positions are ignored.
impl PartialEq for SExp {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SExp::Symbol(a), SExp::Symbol(b)) => a == b,
            (SExp::Str(a), SExp::Str(b)) => a == b,
            (SExp::Number(a), SExp::Number(b)) => a == b,
            (SExp::List { items: a, .. }, SExp::List { items: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl SExp {
    pub fn list(items: Vec<SExp>) -> Self {
        SExp::List {
            items,
            pos: Position::default(),
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            SExp::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Text of any atom: symbol, string, or the literal text of a number.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Symbol(s) | SExp::Str(s) => Some(s),
            SExp::Number(n) => Some(&n.text),
            SExp::List { .. } => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SExp::Number(n) => Some(n.value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List { items, .. } => Some(items),
            _ => None,
        }
    }

    /// The leading symbol of a list, which names the construct it represents.
    pub fn tag(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(SExp::as_symbol)
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            SExp::List { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    /// First child list whose tag is `key`.
    pub fn get(&self, key: &str) -> Option<&SExp> {
        self.as_list()?
            .iter()
            .find(|item| item.tag() == Some(key))
    }

    /// Every child list whose tag is `key`, in source order.
    pub fn get_all(&self, key: &str) -> Vec<&SExp> {
        self.as_list()
            .map(|items| items.iter().filter(|item| item.tag() == Some(key)).collect())
            .unwrap_or_default()
    }

    /// Atom text of the first argument of child `(key value ...)`.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|child| child.as_list())
            .and_then(|items| items.get(1))
            .and_then(SExp::as_atom)
    }

    /// Multi-line rendering with two-space indentation. Lists that hold only
    /// atoms stay on one line.
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out.push('\n');
        out
    }

    fn write_pretty(&self, out: &mut String, indent: usize) {
        match self {
            SExp::List { items, .. } if items.iter().any(|i| i.as_list().is_some()) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        if item.as_list().is_some() {
                            out.push('\n');
                            out.push_str(&"  ".repeat(indent + 1));
                        } else {
                            out.push(' ');
                        }
                    }
                    item.write_pretty(out, indent + 1);
                }
                out.push(')');
            }
            other => out.push_str(&other.to_string()),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            _ => write!(f, "{}", ch)?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Symbol(s) => f.write_str(s),
            SExp::Number(n) => f.write_str(&n.text),
            SExp::Str(s) => write_quoted(f, s),
            SExp::List { items, .. } => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// True when the whole token is a decimal literal: optional sign, digits with
/// an optional fraction, optional exponent.
fn is_number_literal(token: &str) -> bool {
    let bytes = token.as_bytes();
    let mut i = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        digits += i - frac_start;
    }

    if digits == 0 {
        return false;
    }

    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if i < bytes.len() && matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }

    i == bytes.len()
}

pub struct SExpParser {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    offset: usize,
}

impl SExpParser {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Parse exactly one root expression; only whitespace may follow it.
    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            return Err(self.error(ParseErrorKind::Empty));
        }

        let root = self.parse_sexp()?;

        self.skip_whitespace();
        if !self.is_eof() {
            return Err(self.error(ParseErrorKind::TrailingContent));
        }
        Ok(root)
    }

    fn parse_sexp(&mut self) -> Result<SExp, ParseError> {
        match self.peek() {
            Some('(') => self.parse_list(),
            Some(')') => Err(self.error(ParseErrorKind::UnexpectedClose)),
            Some('"') => self.parse_string(),
            Some(_) => Ok(self.parse_bare()),
            None => Err(self.error(ParseErrorKind::Empty)),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        let open = self.position();
        self.advance();
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(ParseError::new(ParseErrorKind::UnclosedList, open)),
                Some(')') => {
                    self.advance();
                    break;
                }
                Some(_) => items.push(self.parse_sexp()?),
            }
        }

        Ok(SExp::List { items, pos: open })
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        let open = self.position();
        self.advance();
        let mut s = String::new();
        let mut escaped = false;

        while let Some(ch) = self.peek() {
            self.advance();
            if escaped {
                match ch {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    _ => s.push(ch),
                }
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return Ok(SExp::Str(s));
            } else {
                s.push(ch);
            }
        }

        Err(ParseError::new(ParseErrorKind::UnterminatedString, open))
    }

    fn parse_bare(&mut self) -> SExp {
        let mut token = String::new();

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                break;
            }
            token.push(ch);
            self.advance();
        }

        if is_number_literal(&token) {
            if let Ok(value) = token.parse::<f64>() {
                if value.is_finite() {
                    return SExp::Number(Number { value, text: token });
                }
            }
        }
        SExp::Symbol(token)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += 1;
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.offset,
        }
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.position())
    }
}
