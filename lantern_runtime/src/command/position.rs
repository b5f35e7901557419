//! Position-expression grammar shared by placement-sensitive commands.
//!
//! After whitespace stripping an expression is one of:
//!
//! ```text
//! (x,y)            absolute offset, unparsable numbers read as 0
//! ANCHOR           the anchor's current position, or a fallback
//! ANCHOR(x,y)      anchor position plus offset
//! ```
//!
//! Unknown anchors never raise errors; they fall back to a stock position
//! picked by the first character of the code (`L` stage-left, `R`
//! stage-right, anything else center).

use std::ops::Add;

use serde::Serialize;

use crate::provider::ResourceProvider;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionExpr {
    Absolute(Position),
    Anchor(String),
    AnchorOffset(String, Position),
}

/// Parses one position expression. Total: every input maps to some
/// expression, with unparsable pieces reading as zero offsets.
pub fn parse_position(input: &str) -> PositionExpr {
    let stripped: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    match stripped.find('(') {
        Some(0) => PositionExpr::Absolute(parse_offset(&stripped)),
        Some(at) => {
            let (anchor, offset) = stripped.split_at(at);
            PositionExpr::AnchorOffset(anchor.to_string(), parse_offset(offset))
        }
        None => PositionExpr::Anchor(stripped),
    }
}

/// Resolves an expression against the scene's current anchors.
pub fn resolve_position(expr: &PositionExpr, provider: &dyn ResourceProvider) -> Position {
    match expr {
        PositionExpr::Absolute(offset) => *offset,
        PositionExpr::Anchor(code) => anchor_or_default(code, provider),
        PositionExpr::AnchorOffset(code, offset) => anchor_or_default(code, provider) + *offset,
    }
}

/// Stock position for an anchor the scene does not know.
pub fn default_anchor_position(code: &str) -> Position {
    match code.chars().next() {
        Some('L') => Position::new(-400.0, 0.0),
        Some('R') => Position::new(400.0, 0.0),
        _ => Position::default(),
    }
}

fn anchor_or_default(code: &str, provider: &dyn ResourceProvider) -> Position {
    provider
        .anchor_position(code)
        .unwrap_or_else(|| default_anchor_position(code))
}

/// Reads `"(x,y)"`; missing or unparsable numbers default to 0.
fn parse_offset(input: &str) -> Position {
    let inner = input
        .trim_start_matches('(')
        .trim_end_matches(')');
    let mut numbers = inner.split(',');
    let x = numbers
        .next()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(0.0);
    let y = numbers
        .next()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(0.0);
    Position::new(x, y)
}
