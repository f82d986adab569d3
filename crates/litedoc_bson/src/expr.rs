//! Path expressions that extract values from documents.
//!
//! Grammar accepted by [`Expr::parse`]:
//!
//! ```text
//! expr    := call | path
//! call    := ("LOWER" | "UPPER") "(" expr ")"
//! path    := "$" segment* | ident segment*
//! segment := "." ident | "." "[" quoted "]" | "[" quoted "]" | "[" int "]" | "[" "*" "]"
//! ```
//!
//! Function names are case-insensitive. Negative indexes count from the end
//! of the array.

use crate::document::Document;
use crate::error::{BsonError, BsonResult};
use crate::value::Value;
use std::fmt;

static NULL: Value = Value::Null;

/// One step of a document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Named field of a document.
    Field(String),
    /// Array element; negative counts from the end.
    Index(i32),
    /// Every element of an array.
    All,
}

/// Scalar function applied to each value produced by its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// Lower-cases strings; other values become null.
    Lower,
    /// Upper-cases strings; other values become null.
    Upper,
}

impl Function {
    fn name(self) -> &'static str {
        match self {
            Self::Lower => "LOWER",
            Self::Upper => "UPPER",
        }
    }

    fn apply(self, value: Value) -> Value {
        match (self, value) {
            (Self::Lower, Value::String(s)) => Value::String(s.to_lowercase()),
            (Self::Upper, Value::String(s)) => Value::String(s.to_uppercase()),
            _ => Value::Null,
        }
    }
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Walks the document along the segments. An empty path is the root.
    Path(Vec<PathSegment>),
    /// Applies a function to every value of the argument.
    Call {
        /// The function.
        function: Function,
        /// Its argument.
        argument: Box<Expr>,
    },
}

#[derive(Clone, Copy)]
enum Node<'d> {
    Root(&'d Document),
    Value(&'d Value),
}

impl Expr {
    /// `$._id`.
    #[must_use]
    pub fn id() -> Self {
        Self::field("_id")
    }

    /// Single top-level field.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Path(vec![PathSegment::Field(name.into())])
    }

    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns [`BsonError::InvalidExpression`] on malformed input.
    pub fn parse(source: &str) -> BsonResult<Self> {
        let mut parser = Parser {
            source,
            chars: source.char_indices().peekable(),
        };
        let expr = parser.expr()?;
        parser.skip_ws();
        if let Some(&(at, c)) = parser.chars.peek() {
            return Err(parser.error(format!("unexpected `{c}` at {at}")));
        }
        Ok(expr)
    }

    /// Canonical text of the expression.
    ///
    /// Two expressions denote the same index key iff their sources are equal.
    #[must_use]
    pub fn source(&self) -> String {
        self.to_string()
    }

    /// True if the expression can yield several values per document.
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        match self {
            Self::Path(segments) => segments.contains(&PathSegment::All),
            Self::Call { argument, .. } => argument.is_multi_valued(),
        }
    }

    /// Evaluates the expression against a document.
    ///
    /// A missing field yields `Null`. `[*]` over an empty array or a
    /// non-array yields nothing.
    #[must_use]
    pub fn evaluate(&self, document: &Document) -> Vec<Value> {
        match self {
            Self::Path(segments) => walk(document, segments)
                .into_iter()
                .map(|node| match node {
                    Node::Root(d) => Value::Document(d.clone()),
                    Node::Value(v) => v.clone(),
                })
                .collect(),
            Self::Call { function, argument } => argument
                .evaluate(document)
                .into_iter()
                .map(|v| function.apply(v))
                .collect(),
        }
    }
}

fn walk<'d>(document: &'d Document, segments: &[PathSegment]) -> Vec<Node<'d>> {
    let mut current = vec![Node::Root(document)];
    for segment in segments {
        let mut next = Vec::with_capacity(current.len());
        for node in current {
            match segment {
                PathSegment::Field(name) => {
                    let found = match node {
                        Node::Root(d) => d.get(name),
                        Node::Value(Value::Document(d)) => d.get(name),
                        Node::Value(_) => None,
                    };
                    next.push(Node::Value(found.unwrap_or(&NULL)));
                }
                PathSegment::Index(i) => {
                    let found = match node {
                        Node::Value(Value::Array(items)) => element(items, *i),
                        _ => None,
                    };
                    next.push(Node::Value(found.unwrap_or(&NULL)));
                }
                PathSegment::All => {
                    if let Node::Value(Value::Array(items)) = node {
                        next.extend(items.iter().map(Node::Value));
                    }
                }
            }
        }
        current = next;
    }
    current
}

fn element(items: &[Value], index: i32) -> Option<&Value> {
    let len = i64::try_from(items.len()).ok()?;
    let index = i64::from(index);
    let position = if index < 0 { len + index } else { index };
    usize::try_from(position).ok().and_then(|p| items.get(p))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| is_ident_start(c) && c != '$') && chars.all(is_ident_char)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(segments) => {
                f.write_str("$")?;
                for segment in segments {
                    match segment {
                        PathSegment::Field(name) if is_plain_name(name) => write!(f, ".{name}")?,
                        PathSegment::Field(name) => {
                            write!(f, ".['{}']", name.replace('\\', "\\\\").replace('\'', "\\'"))?;
                        }
                        PathSegment::Index(i) => write!(f, "[{i}]")?,
                        PathSegment::All => f.write_str("[*]")?,
                    }
                }
                Ok(())
            }
            Self::Call { function, argument } => write!(f, "{}({argument})", function.name()),
        }
    }
}

struct Parser<'s> {
    source: &'s str,
    chars: std::iter::Peekable<std::str::CharIndices<'s>>,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> BsonError {
        BsonError::invalid_expression(self.source, message)
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    fn expect(&mut self, expected: char) -> BsonResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{expected}`")))
        }
    }

    fn ident(&mut self) -> BsonResult<String> {
        let mut out = String::new();
        match self.chars.peek() {
            Some(&(_, c)) if is_ident_start(c) => {}
            _ => return Err(self.error("expected field name")),
        }
        while let Some((_, c)) = self.chars.next_if(|&(_, c)| is_ident_char(c)) {
            out.push(c);
        }
        Ok(out)
    }

    fn expr(&mut self) -> BsonResult<Expr> {
        self.skip_ws();
        if self.eat('$') {
            return self.segments(Vec::new());
        }
        let name = self.ident()?;
        self.skip_ws();
        if self.eat('(') {
            let function = match name.to_ascii_uppercase().as_str() {
                "LOWER" => Function::Lower,
                "UPPER" => Function::Upper,
                other => return Err(self.error(format!("unknown function `{other}`"))),
            };
            let argument = self.expr()?;
            self.skip_ws();
            self.expect(')')?;
            return Ok(Expr::Call {
                function,
                argument: Box::new(argument),
            });
        }
        self.segments(vec![PathSegment::Field(name)])
    }

    fn segments(&mut self, mut segments: Vec<PathSegment>) -> BsonResult<Expr> {
        loop {
            if self.eat('.') {
                if self.eat('[') {
                    segments.push(self.bracket()?);
                } else {
                    segments.push(PathSegment::Field(self.ident()?));
                }
            } else if self.eat('[') {
                segments.push(self.bracket()?);
            } else {
                return Ok(Expr::Path(segments));
            }
        }
    }

    fn bracket(&mut self) -> BsonResult<PathSegment> {
        self.skip_ws();
        let segment = match self.chars.peek().map(|&(_, c)| c) {
            Some('*') => {
                self.chars.next();
                PathSegment::All
            }
            Some(q @ ('\'' | '"')) => {
                self.chars.next();
                PathSegment::Field(self.quoted(q)?)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => PathSegment::Index(self.integer()?),
            _ => return Err(self.error("expected `*`, index or quoted name")),
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(segment)
    }

    fn quoted(&mut self, quote: char) -> BsonResult<String> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some((_, c)) if c == quote => return Ok(out),
                Some((_, c)) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn integer(&mut self) -> BsonResult<i32> {
        let mut text = String::new();
        if self.eat('-') {
            text.push('-');
        }
        while let Some((_, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
            text.push(c);
        }
        text.parse()
            .map_err(|_| self.error(format!("invalid index `{text}`")))
    }
}
