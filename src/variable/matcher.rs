//! Tokenizer for variable expressions.
//!
//! Splits `order.items[2].jsonPath($.sku)` into ordered segments:
//! - `order`
//! - `items` with index 2
//! - the terminal path query `$.sku`

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use crate::error::{EngineError, Result};

lazy_static! {
    static ref SEGMENT_PATTERN: Regex = Regex::new(
        r"^(?:(?P<query>jsonPath|xpath)\((?P<body>.*)\)$|(?P<name>[^.\[\]()]+)(?:\[(?P<index>\d+)\])?)"
    )
    .expect("valid segment pattern");
}

/// How a segment reads its value out of the parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Plain or indexed property, `name` / `name[3]`
    Property,
    /// Terminal `jsonPath(<expr>)` query
    JsonPath,
    /// Terminal `xpath(<expr>)` query
    XPath,
}

/// One matched segment of a variable expression
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMatch {
    /// Property name, or the captured body of a path query
    pub name: String,
    /// Array index, `None` when the segment is not indexed
    pub index: Option<usize>,
    pub kind: SegmentKind,
    /// 1-based position within the expression
    pub position: usize,
    /// Segment text as written
    pub text: String,
}

impl SegmentMatch {
    pub fn is_query(&self) -> bool {
        self.kind != SegmentKind::Property
    }
}

impl fmt::Display for SegmentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Split an expression into its segments.
///
/// A path query must not be the root segment and always consumes the rest of the
/// expression. An empty expression yields no segments.
pub fn tokenize(expression: &str) -> Result<Vec<SegmentMatch>> {
    let invalid = |message: String| EngineError::InvalidExpression {
        expression: expression.to_string(),
        message,
    };

    let mut segments = Vec::new();
    let mut rest = expression;

    while !rest.is_empty() {
        let caps = SEGMENT_PATTERN
            .captures(rest)
            .ok_or_else(|| invalid(format!("unexpected input at '{}'", rest)))?;
        let consumed = caps.get(0).map_or(0, |m| m.end());
        let position = segments.len() + 1;
        let text = rest[..consumed].to_string();

        let segment = if let Some(query) = caps.name("query") {
            if position == 1 {
                return Err(invalid(format!(
                    "path query '{}' can not be the root segment",
                    text
                )));
            }
            let kind = if query.as_str() == "jsonPath" {
                SegmentKind::JsonPath
            } else {
                SegmentKind::XPath
            };
            SegmentMatch {
                name: caps.name("body").map_or("", |m| m.as_str()).to_string(),
                index: None,
                kind,
                position,
                text,
            }
        } else {
            let index = match caps.name("index") {
                Some(index) => Some(
                    index
                        .as_str()
                        .parse::<usize>()
                        .map_err(|_| invalid(format!("index out of range in '{}'", text)))?,
                ),
                None => None,
            };
            SegmentMatch {
                name: caps.name("name").map_or("", |m| m.as_str()).to_string(),
                index,
                kind: SegmentKind::Property,
                position,
                text,
            }
        };
        segments.push(segment);

        rest = &rest[consumed..];
        if rest.is_empty() {
            break;
        }
        match rest.strip_prefix('.') {
            Some(next) if !next.is_empty() => rest = next,
            Some(_) => return Err(invalid("trailing '.'".to_string())),
            None => return Err(invalid(format!("expected '.' before '{}'", rest))),
        }
    }

    Ok(segments)
}

/// Iterates the segments of one expression, keeping track of position and total count.
#[derive(Debug, Clone)]
pub struct VariableExpressionSegmentMatcher {
    expression: String,
    segments: Vec<SegmentMatch>,
    cursor: usize,
}

impl VariableExpressionSegmentMatcher {
    pub fn new(expression: &str) -> Result<Self> {
        Ok(Self {
            expression: expression.to_string(),
            segments: tokenize(expression)?,
            cursor: 0,
        })
    }

    /// The full expression being matched
    pub fn variable_expression(&self) -> &str {
        &self.expression
    }

    pub fn total_segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[SegmentMatch] {
        &self.segments
    }
}

impl Iterator for VariableExpressionSegmentMatcher {
    type Item = SegmentMatch;

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.segments.get(self.cursor).cloned();
        if segment.is_some() {
            self.cursor += 1;
        }
        segment
    }
}
