//! Plain geometry used by the constraint manager.
//!
//! All frames are expressed in the coordinate space of the element's parent,
//! the same convention a view's `frame` follows.  A parent's own attributes are
//! read from its *bounds*: a rectangle of the same size anchored at the origin.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::constraint::LayoutAttribute;
use super::element::ElementId;

/// A 2-D offset or position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A width/height pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width divided by height, or `None` for a zero height.
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.height == 0.0 {
            None
        } else {
            Some(self.width / self.height)
        }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn mid_x(&self) -> f64 {
        self.origin.x + self.size.width / 2.0
    }

    pub fn mid_y(&self) -> f64 {
        self.origin.y + self.size.height / 2.0
    }

    pub fn width(&self) -> f64 {
        self.size.width
    }

    pub fn height(&self) -> f64 {
        self.size.height
    }

    /// The same size anchored at the origin.
    pub fn bounds(&self) -> Rect {
        Rect {
            origin: Point::ZERO,
            size: self.size,
        }
    }

    /// Returns this rectangle moved by `delta`.
    pub fn offset_by(&self, delta: Point) -> Rect {
        Rect::new(
            self.origin.x + delta.x,
            self.origin.y + delta.y,
            self.size.width,
            self.size.height,
        )
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.min_x().min(other.min_x());
        let min_y = self.min_y().min(other.min_y());
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Reads the value of `attribute` from this rectangle.
    ///
    /// Returns `None` for [`LayoutAttribute::NotAnAttribute`].
    pub fn value_of(&self, attribute: LayoutAttribute) -> Option<f64> {
        use LayoutAttribute::*;
        let value = match attribute {
            Left | Leading => self.min_x(),
            Right | Trailing => self.max_x(),
            Top => self.min_y(),
            Bottom | Baseline => self.max_y(),
            CenterX => self.mid_x(),
            CenterY => self.mid_y(),
            Width => self.width(),
            Height => self.height(),
            NotAnAttribute => return None,
        };
        Some(value)
    }
}

/// Current geometry snapshot supplied by the caller.
///
/// Keys are element identifiers (see [`ElementId::identifier`]); values are
/// frames in the coordinate space of the element's parent.  The constraint
/// manager never measures anything itself; this table is its only source of
/// "current" geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics {
    frames: HashMap<String, Rect>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the frame for `element`, replacing any previous value.
    pub fn insert(&mut self, element: ElementId, frame: Rect) {
        self.frames.insert(element.identifier(), frame);
    }

    /// Builder-style variant of [`Metrics::insert`].
    pub fn with(mut self, element: ElementId, frame: Rect) -> Self {
        self.insert(element, frame);
        self
    }

    /// Looks up the frame recorded for `element`.
    pub fn frame(&self, element: ElementId) -> Option<Rect> {
        self.frames.get(&element.identifier()).copied()
    }

    /// Looks up a frame by raw identifier string.
    pub fn frame_by_identifier(&self, identifier: &str) -> Option<Rect> {
        self.frames.get(identifier).copied()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<(ElementId, Rect)> for Metrics {
    fn from_iter<I: IntoIterator<Item = (ElementId, Rect)>>(iter: I) -> Self {
        let mut metrics = Metrics::new();
        for (id, frame) in iter {
            metrics.insert(id, frame);
        }
        metrics
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
