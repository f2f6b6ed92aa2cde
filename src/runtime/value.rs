//! Dynamic values carried by properties, variables and message arguments.
//!
//! Values are immutable: every chunk edit (see [`super::chunk`]) produces a new
//! [`Value`]. Numbers and strings coerce freely; comparison looks at the numeric
//! reading of both operands first and falls back to text according to a
//! [`SortStyle`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A point in card coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i64,
    /// Vertical coordinate.
    pub y: i64,
}

impl Point {
    /// Construct a point.
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle; `right`/`bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub left: i64,
    /// Top edge.
    pub top: i64,
    /// Right edge.
    pub right: i64,
    /// Bottom edge.
    pub bottom: i64,
}

impl Rect {
    /// Construct a rectangle from its four edges.
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width of the rectangle; `None` when it does not fit an `i64`.
    pub fn width(&self) -> Option<i64> {
        self.right.checked_sub(self.left)
    }

    /// Height of the rectangle; `None` when it does not fit an `i64`.
    pub fn height(&self) -> Option<i64> {
        self.bottom.checked_sub(self.top)
    }

    /// Centre point, rounded toward the top-left.
    pub fn center(&self) -> Option<Point> {
        Some(Point::new(
            self.left.checked_add(self.width()? / 2)?,
            self.top.checked_add(self.height()? / 2)?,
        ))
    }

    /// The same rectangle moved by `dx`, `dy`.
    pub fn offset(&self, dx: i64, dy: i64) -> Option<Rect> {
        Some(Rect::new(
            self.left.checked_add(dx)?,
            self.top.checked_add(dy)?,
            self.right.checked_add(dx)?,
            self.bottom.checked_add(dy)?,
        ))
    }

    /// Whether `point` lies inside the rectangle.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }
}

/// How two values are ordered when sorting or comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortStyle {
    /// Case-insensitive ASCII ordering of the text forms.
    #[default]
    Text,
    /// Numbers in numeric order, then everything else in text order.
    Numeric,
    /// Case-insensitive ordering over Unicode lowercase mappings.
    International,
}

/// Structured script value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// The empty value; its text form is `""`.
    #[default]
    Empty,
    /// Text.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Floating-point number.
    Real(f64),
    /// Boolean.
    Boolean(bool),
    /// Ordered items; the text form joins them with commas.
    List(Vec<Value>),
    /// Point (`x,y`).
    Point(Point),
    /// Rectangle (`left,top,right,bottom`).
    Rect(Rect),
}

impl Value {
    /// Text value.
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    /// Text form of the value.
    pub fn string_value(&self) -> String {
        self.to_string()
    }

    /// Whether the text form is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(text) => text.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Numeric reading of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(num) => Some(*num as f64),
            Value::Real(num) => Some(*num),
            Value::Text(text) => parse_number(text),
            _ => None,
        }
    }

    /// Integral reading of the value, if it is a whole number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(num) => Some(*num),
            other => {
                let num = other.as_number()?;
                if num.is_finite() && num.fract() == 0.0 && num.abs() < i64::MAX as f64 {
                    Some(num as i64)
                } else {
                    None
                }
            }
        }
    }

    /// Boolean reading of the value (`true`/`false`, case-insensitive).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(flag) => Some(*flag),
            Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Point reading of the value (`x,y`).
    pub fn as_point(&self) -> Option<Point> {
        match self {
            Value::Point(point) => Some(*point),
            other => {
                let coords = parse_coordinates(&other.string_value())?;
                match coords.as_slice() {
                    [x, y] => Some(Point::new(*x, *y)),
                    _ => None,
                }
            }
        }
    }

    /// Rectangle reading of the value (`left,top,right,bottom`).
    pub fn as_rect(&self) -> Option<Rect> {
        match self {
            Value::Rect(rect) => Some(*rect),
            other => {
                let coords = parse_coordinates(&other.string_value())?;
                match coords.as_slice() {
                    [left, top, right, bottom] => Some(Rect::new(*left, *top, *right, *bottom)),
                    _ => None,
                }
            }
        }
    }

    /// Order two values under `style`.
    pub fn compare(&self, other: &Value, style: SortStyle) -> Ordering {
        match style {
            // Total: every number sorts before every non-number.
            SortStyle::Numeric => match (self.as_number(), other.as_number()) {
                (Some(lhs), Some(rhs)) => lhs.total_cmp(&rhs),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => compare_text(&self.string_value(), &other.string_value()),
            },
            SortStyle::Text => compare_text(&self.string_value(), &other.string_value()),
            SortStyle::International => {
                let lhs = self.string_value();
                let rhs = other.string_value();
                lhs.chars()
                    .flat_map(char::to_lowercase)
                    .cmp(rhs.chars().flat_map(char::to_lowercase))
            }
        }
    }

    /// Script equality: numeric when both sides are numbers, case-insensitive text otherwise.
    pub fn equals(&self, other: &Value) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => compare_text(&self.string_value(), &other.string_value()) == Ordering::Equal,
        }
    }
}

fn compare_text(lhs: &str, rhs: &str) -> Ordering {
    lhs.bytes()
        .map(|b| b.to_ascii_lowercase())
        .cmp(rhs.bytes().map(|b| b.to_ascii_lowercase()))
}

fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Reject forms Rust accepts but scripts never write.
    if trimmed.eq_ignore_ascii_case("inf")
        || trimmed.eq_ignore_ascii_case("infinity")
        || trimmed.eq_ignore_ascii_case("nan")
    {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

fn parse_coordinates(text: &str) -> Option<Vec<i64>> {
    text.split(',')
        .map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Text form of a real number: integral values print without a fraction,
/// others with at most six decimal places.
pub fn format_real(num: f64) -> String {
    if num.is_finite() && num.fract() == 0.0 && num.abs() < 1e15 {
        return format!("{}", num as i64);
    }
    let text = format!("{:.6}", num);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Text(text) => f.write_str(text),
            Value::Integer(num) => write!(f, "{}", num),
            Value::Real(num) => f.write_str(&format_real(*num)),
            Value::Boolean(flag) => write!(f, "{}", flag),
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Point(point) => write!(f, "{},{}", point.x, point.y),
            Value::Rect(rect) => write!(
                f,
                "{},{},{},{}",
                rect.left, rect.top, rect.right, rect.bottom
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i64> for Value {
    fn from(num: i64) -> Self {
        Value::Integer(num)
    }
}

impl From<i32> for Value {
    fn from(num: i32) -> Self {
        Value::Integer(num as i64)
    }
}

impl From<usize> for Value {
    fn from(num: usize) -> Self {
        Value::Integer(num as i64)
    }
}

impl From<f64> for Value {
    fn from(num: f64) -> Self {
        Value::Real(num)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Boolean(flag)
    }
}

impl From<Point> for Value {
    fn from(point: Point) -> Self {
        Value::Point(point)
    }
}

impl From<Rect> for Value {
    fn from(rect: Rect) -> Self {
        Value::Rect(rect)
    }
}
