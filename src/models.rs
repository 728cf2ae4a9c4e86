//! Shared models and types for crosswatch
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};
use std::ops::Sub;

/// Planar coordinate in camera analytics space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Squared distance, for comparisons only
    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Scale independently in x and y
    pub fn scaled(&self, scale: &ScaleFactor) -> Point {
        Point::new(self.x * scale.x, self.y * scale.y)
    }

    /// Length when treated as a vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn dot(&self, other: &Point) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Resolution scale applied to stored calibration coordinates
///
/// Calibration rows are stored at analytics resolution (960x540) while
/// live detections arrive at working camera resolution (3840x2160).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactor {
    pub const WORKING_TO_ANALYTICS: ScaleFactor = ScaleFactor {
        x: 3840.0 / 960.0,
        y: 2160.0 / 540.0,
    };

    pub const IDENTITY: ScaleFactor = ScaleFactor { x: 1.0, y: 1.0 };
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::WORKING_TO_ANALYTICS
    }
}

/// Detected object class, normalized from the analytics type label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Vehicle,
    Human,
    Other,
}

impl ObjectKind {
    /// Normalize a type label. Several vehicle spellings are in the wild.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if ["vehicle", "vehical", "car"]
            .iter()
            .any(|v| label.eq_ignore_ascii_case(v))
        {
            ObjectKind::Vehicle
        } else if label.eq_ignore_ascii_case("human") {
            ObjectKind::Human
        } else {
            ObjectKind::Other
        }
    }
}

/// One object's position in one frame block
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub object_id: i64,
    pub kind: ObjectKind,
    pub cog: Point,
}

/// Line-crossing event parsed from an event block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCrossingEvent {
    pub object_id: i64,
    pub rule_name: String,
    pub state: bool,
}

/// Calibrated pair of physical board positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPair {
    pub id_a: i64,
    pub point_a: Point,
    pub id_b: i64,
    pub point_b: Point,
}

/// Named virtual crossing line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleLine {
    pub name: String,
    pub start: Point,
    pub end: Point,
    pub mode: String,
}

impl RuleLine {
    /// Direction vector from start to end
    pub fn vector(&self) -> Point {
        self.end - self.start
    }
}

/// Command codes understood by the indicator boards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BoardCommand {
    LcdOn = 0x01,
    LcdOff = 0x02,
}

impl BoardCommand {
    pub fn code(self) -> u8 {
        self as u8
    }
}
