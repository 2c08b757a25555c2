//! Selector filters for listing objects.
//!
//! A filter is a list of arguments that are OR'ed together; each argument
//! is a comma separated list of selectors that must all match:
//!
//! ```text
//! name==docker.io/library/alpine:latest
//! labels."com.example.role"==web,target.mediatype~=index
//! labels.pinned
//! ```
//!
//! A selector without an operator only requires the field to be present
//! and non-empty. Field values are looked up through [`Adaptor`], so the
//! same filter code works for any object that can expose its fields.

use crate::error::{CtrError, Result};
use regex::Regex;


/// Exposes object fields to filters by field path.
pub trait Adaptor {
    /// Returns the value at `path`, or `None` when the field is absent.
    fn field(&self, path: &[String]) -> Option<String>;
}

/// Comparison operator of a selector.
#[derive(Debug, Clone)]
enum Operator {
    Present,
    Equal(String),
    NotEqual(String),
    Matches(Regex),
}

/// A single `fieldpath op value` term.
#[derive(Debug, Clone)]
pub struct Selector {
    fieldpath: Vec<String>,
    operator: Operator,
}

impl Selector {
    fn matches<A: Adaptor + ?Sized>(&self, obj: &A) -> bool {
        let value = obj.field(&self.fieldpath);
        match (&self.operator, value) {
            (Operator::Present, Some(v)) => !v.is_empty(),
            (Operator::Present, None) => false,
            (Operator::Equal(want), Some(v)) => &v == want,
            (Operator::Equal(_), None) => false,
            (Operator::NotEqual(want), Some(v)) => &v != want,
            (Operator::NotEqual(_), None) => true,
            (Operator::Matches(re), v) => re.is_match(v.as_deref().unwrap_or("")),
        }
    }
}

/// A parsed filter: a disjunction of conjunctions of selectors.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    any: Vec<Vec<Selector>>,
}

impl Filter {
    /// Parses each argument into a conjunction and ORs them together.
    ///
    /// No arguments produce a filter that matches everything.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut any = Vec::with_capacity(args.len());
        for arg in args {
            let arg = arg.as_ref();
            if arg.trim().is_empty() {
                continue;
            }
            any.push(Parser::new(arg).parse_all()?);
        }
        Ok(Self { any })
    }

    /// Returns true when `obj` satisfies the filter.
    pub fn matches<A: Adaptor + ?Sized>(&self, obj: &A) -> bool {
        if self.any.is_empty() {
            return true;
        }
        self.any
            .iter()
            .any(|all| all.iter().all(|sel| sel.matches(obj)))
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> CtrError {
        CtrError::invalid_argument(format!(
            "filter {:?}: {} at position {}",
            self.input, message, self.pos
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<(char, char)> {
        match (self.chars.get(self.pos), self.chars.get(self.pos + 1)) {
            (Some(a), Some(b)) => Some((*a, *b)),
            _ => None,
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse_all(&mut self) -> Result<Vec<Selector>> {
        let mut selectors = Vec::new();
        loop {
            self.skip_spaces();
            selectors.push(self.parse_selector()?);
            self.skip_spaces();
            match self.peek() {
                None => return Ok(selectors),
                Some(',') => self.pos += 1,
                Some(_) => return Err(self.error("expected ',' or end of filter")),
            }
        }
    }

    fn parse_selector(&mut self) -> Result<Selector> {
        let fieldpath = self.parse_fieldpath()?;
        self.skip_spaces();
        let operator = match self.peek2() {
            Some(('=', '=')) => {
                self.pos += 2;
                Operator::Equal(self.parse_value()?)
            }
            Some(('!', '=')) => {
                self.pos += 2;
                Operator::NotEqual(self.parse_value()?)
            }
            Some(('~', '=')) => {
                self.pos += 2;
                let pattern = self.parse_value()?;
                let re = Regex::new(&pattern).map_err(|e| {
                    CtrError::invalid_argument(format!(
                        "filter {:?}: invalid regular expression {:?}: {}",
                        self.input, pattern, e
                    ))
                })?;
                Operator::Matches(re)
            }
            _ => Operator::Present,
        };
        Ok(Selector {
            fieldpath,
            operator,
        })
    }

    fn parse_fieldpath(&mut self) -> Result<Vec<String>> {
        let mut path = Vec::new();
        loop {
            let component = match self.peek() {
                Some('"') => self.parse_quoted()?,
                _ => self.parse_identifier()?,
            };
            path.push(component);
            if self.peek() == Some('.') {
                self.pos += 1;
            } else {
                return Ok(path);
            }
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected field name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_quoted(&mut self) -> Result<String> {
        // Opening quote.
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated quoted string")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => out.push(c),
                        None => return Err(self.error("dangling escape")),
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_value(&mut self) -> Result<String> {
        self.skip_spaces();
        if self.peek() == Some('"') {
            return self.parse_quoted();
        }
        let start = self.pos;
        while self.peek().is_some_and(|c| c != ',') {
            self.pos += 1;
        }
        let value: String = self.chars[start..self.pos].iter().collect();
        let value = value.trim_end().to_string();
        if value.is_empty() {
            return Err(self.error("expected value"));
        }
        Ok(value)
    }
}
