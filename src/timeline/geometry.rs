//! Boxes and points in space units

use serde::{Deserialize, Serialize};

/// Distance between two adjacent diatonic steps on an unscaled staff
pub const STEPSIZE: f64 = 0.5;

/// Standard padding between neighbouring pieces of ink
pub const STDPAD: f64 = 1.0 / 6.0;

/// Vertical distance between two beam levels
pub const BEAM_SEP: f64 = 0.75;

/// Height reserved around a note head above and below its center
pub const HEAD_HALF_HEIGHT: f64 = STEPSIZE;

/// Tolerance for floating point comparisons
pub const FUDGE: f64 = 1e-6;

/// A bounding box with its reference point.
///
/// `y` grows upward, so `n >= s`. Depending on the phase the vertical
/// fields are relative to the owner's own center, to its system, or
/// absolute on the page. Horizontal fields are final on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bbox {
    pub x: f64,
    pub y: f64,
    pub n: f64,
    pub s: f64,
    pub e: f64,
    pub w: f64,
}

impl Bbox {
    pub fn new(x: f64, y: f64, n: f64, s: f64, e: f64, w: f64) -> Self {
        Self { x, y, n, s, e, w }
    }

    pub fn height(&self) -> f64 {
        self.n - self.s
    }

    /// Absolute box for an entity whose vertical fields are relative to
    /// `origin_y`, keeping the horizontal fields.
    pub fn offset_from(&self, origin_y: f64) -> Self {
        Self {
            x: self.x,
            y: origin_y + self.y,
            n: origin_y + self.n,
            s: origin_y + self.s,
            e: self.e,
            w: self.w,
        }
    }

    pub fn shift_y(&mut self, dy: f64) {
        self.y += dy;
        self.n += dy;
        self.s += dy;
    }

    pub fn shift_x(&mut self, dx: f64) {
        self.x += dx;
        self.e += dx;
        self.w += dx;
    }

    pub fn overlaps_vertically(&self, other: &Bbox) -> bool {
        self.s < other.n - FUDGE && other.s < self.n - FUDGE
    }

    pub fn overlaps_horizontally(&self, other: &Bbox) -> bool {
        self.w < other.e - FUDGE && other.w < self.e - FUDGE
    }
}

/// One point of a curve or line
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// When set, `y` is relative to this staff instead of the owner's
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff: Option<usize>,
}
