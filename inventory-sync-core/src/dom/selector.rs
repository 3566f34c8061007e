//! CSS-like selector engine
//!
//! Supports the subset page configurations actually use: type selectors,
//! `*`, `.class`, `#id`, attribute tests (`[a]`, `[a=v]`, `[a~=v]`,
//! `[a^=v]`, `[a$=v]`, `[a*=v]`), compound selectors, descendant and child
//! combinators, and comma-separated selector lists. Pseudo-classes are
//! rejected at parse time.

use super::document::{Document, NodeId};
use crate::types::{Result, SyncError};
use std::fmt;

/// A parsed selector list (`a, b, c`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

/// One comma-separated alternative: compounds joined by combinators
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    /// `(combinator to the previous compound, compound)`; the first
    /// combinator is unused.
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Includes(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
}

impl AttrOp {
    fn test(&self, value: &str) -> bool {
        match self {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::Includes(v) => value.split_ascii_whitespace().any(|w| w == v),
            AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => !v.is_empty() && value.ends_with(v.as_str()),
            AttrOp::Substring(v) => !v.is_empty() && value.contains(v.as_str()),
        }
    }
}

impl Selector {
    /// Parse a selector list
    ///
    /// A blank string is rejected; callers treat "no selector configured"
    /// separately (see [`Selector::parse_optional`]).
    pub fn parse(source: &str) -> Result<Self> {
        let alternatives = Parser::new(source).parse_list()?;
        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    /// Parse a selector that may be left blank in configuration
    pub fn parse_optional(source: &str) -> Result<Option<Self>> {
        if source.trim().is_empty() {
            Ok(None)
        } else {
            Self::parse(source).map(Some)
        }
    }

    /// The selector text as configured
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether an element matches any alternative
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_element(node)
            && self
                .alternatives
                .iter()
                .any(|complex| complex.matches_at(doc, node, complex.parts.len() - 1))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Complex {
    /// Match `parts[..=idx]` with `parts[idx]` anchored at `node`
    fn matches_at(&self, doc: &Document, node: NodeId, idx: usize) -> bool {
        let (combinator, compound) = &self.parts[idx];
        if !compound.matches(doc, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => doc
                .parent_element(node)
                .is_some_and(|parent| self.matches_at(doc, parent, idx - 1)),
            Combinator::Descendant => {
                let mut current = doc.parent_element(node);
                while let Some(ancestor) = current {
                    if self.matches_at(doc, ancestor, idx - 1) {
                        return true;
                    }
                    current = doc.parent_element(ancestor);
                }
                false
            }
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !doc.tag(node).is_some_and(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| doc.has_class(node, class)) {
            return false;
        }
        self.attrs.iter().all(|test| {
            doc.attr(node, &test.name)
                .is_some_and(|value| test.op.test(value))
        })
    }
}

/// Hand-written recursive descent parser over the selector characters
struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> SyncError {
        SyncError::Selector(format!("{} in {:?} at offset {}", what, self.source, self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<Vec<Complex>> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                None => break,
                Some(c) => return Err(self.error(&format!("Unexpected {:?}", c))),
            }
        }
        Ok(list)
    }

    fn parse_complex(&mut self) -> Result<Complex> {
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;
        loop {
            let compound = self.parse_compound()?;
            if compound.is_empty() {
                return Err(self.error("Expected a selector"));
            }
            parts.push((combinator, compound));

            let had_ws = self.skip_ws();
            match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    combinator = Combinator::Child;
                }
                Some(',') | None => break,
                Some(_) if had_ws => combinator = Combinator::Descendant,
                Some(c) => return Err(self.error(&format!("Unexpected {:?}", c))),
            }
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();

        if self.peek() == Some('*') {
            self.pos += 1;
            compound.tag = Some("*".to_string());
        } else if self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(':') => return Err(self.error("Pseudo-classes are not supported")),
                _ => break,
            }
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("Expected an identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attr(&mut self) -> Result<AttrTest> {
        self.skip_ws();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_ws();

        let op_char = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrTest {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some('=') => None,
            Some(c @ ('~' | '^' | '$' | '*')) => {
                self.pos += 1;
                Some(c)
            }
            _ => return Err(self.error("Malformed attribute selector")),
        };
        if self.peek() != Some('=') {
            return Err(self.error("Expected '='"));
        }
        self.pos += 1;
        self.skip_ws();
        let value = self.parse_attr_value()?;
        self.skip_ws();
        if self.peek() != Some(']') {
            return Err(self.error("Expected ']'"));
        }
        self.pos += 1;

        let op = match op_char {
            None => AttrOp::Equals(value),
            Some('~') => AttrOp::Includes(value),
            Some('^') => AttrOp::Prefix(value),
            Some('$') => AttrOp::Suffix(value),
            _ => AttrOp::Substring(value),
        };
        Ok(AttrTest { name, op })
    }

    fn parse_attr_value(&mut self) -> Result<String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("Unterminated string"));
                }
                let value = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(value)
            }
            _ => self.parse_ident(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
