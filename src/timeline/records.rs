//! Payloads of the timeline records

use super::geometry::{Bbox, Point};
use super::{GroupId, InputLocation, StuffId};
use num_rational::Rational64;
use serde::{Deserialize, Serialize};

/// Start or end of a run that must stay on one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneMark {
    Begin,
    End,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f64,
    pub right: f64,
}

/// Slashes printed in the left margin between two systems
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashMarker {
    /// Let the layout choose the vertical position
    pub auto_place: bool,
    pub height: f64,
    /// Center relative to the origin of the system below, used when not auto placed
    pub rel_y: f64,
    pub abs: Bbox,
}

/// Start of a system. Also holds the system's own geometry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemBreak {
    pub loc: InputLocation,
    /// User asked for a new page here
    pub page_break: bool,
    /// User-fixed distance between the outer staff lines of the previous
    /// system and this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_sep: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margins: Option<Margins>,
    /// Height of a measure number printed above the first staff
    pub measnum_height: f64,
    /// Marker between the previous system and this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slashes: Option<SlashMarker>,
    pub rel: Bbox,
    pub abs: Bbox,
    pub first_visible: usize,
    pub last_visible: usize,
    /// Ink above the top line of the first visible staff
    pub top_overflow: f64,
    /// Ink below the bottom line of the last visible staff
    pub bottom_overflow: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Clef and key signature glyphs at the start of a system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClefKeySig {
    pub glyphs: Vec<ClefGlyph>,
    pub rel: Bbox,
    pub abs: Bbox,
}

/// How far one staff's clef and key glyphs stick out past its outer lines
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClefGlyph {
    pub staff: usize,
    pub above: f64,
    pub below: f64,
}

impl ClefKeySig {
    pub fn above(&self, staff: usize) -> f64 {
        self.glyphs
            .iter()
            .filter(|g| g.staff == staff)
            .map(|g| g.above)
            .fold(0.0, f64::max)
    }

    pub fn below(&self, staff: usize) -> f64 {
        self.glyphs
            .iter()
            .filter(|g| g.staff == staff)
            .map(|g| g.below)
            .fold(0.0, f64::max)
    }
}

/// Horizontal anchor shared by all groups at one time of a measure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordAnchor {
    pub time: Rational64,
    pub rel: Bbox,
    pub abs: Bbox,
}

impl Default for ChordAnchor {
    fn default() -> Self {
        Self {
            time: Rational64::from_integer(0),
            rel: Bbox::default(),
            abs: Bbox::default(),
        }
    }
}

/// One staff of one measure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffContent {
    pub loc: InputLocation,
    pub staff: usize,
    pub visible: bool,
    /// `y` is relative to the system once positioned; `n` and `s` stay
    /// relative to the staff's middle line
    pub rel: Bbox,
    pub abs: Bbox,
    pub voices: Vec<Vec<GroupId>>,
    pub stuff: Vec<StuffId>,
    /// Height needed by items placed between this staff and the next
    pub between_height: f64,
}

impl Default for StaffContent {
    fn default() -> Self {
        Self {
            loc: InputLocation::default(),
            staff: 1,
            visible: true,
            rel: Bbox::default(),
            abs: Bbox::default(),
            voices: Vec::new(),
            stuff: Vec::new(),
            between_height: 0.0,
        }
    }
}

impl StaffContent {
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.voices.iter().flatten().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StuffKind {
    #[default]
    Text,
    Mark,
    Curve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Place {
    #[default]
    Above,
    Below,
    Between,
}

/// Text, marks and curves attached to a staff
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotation {
    pub loc: InputLocation,
    pub kind: StuffKind,
    pub place: Place,
    /// Relative to the staff, or to the center of the between region for
    /// `Place::Between` until the relative positioner re-anchors it
    pub rel: Bbox,
    pub abs: Bbox,
    pub points: Vec<Point>,
    pub abs_points: Vec<Point>,
    /// Set once a between item is relative to the staff above
    pub anchored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreeKind {
    #[default]
    Line,
    Curve,
    Print,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    #[default]
    System,
    Staff(usize),
}

/// Line, curve or print statement not tied to a group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeItem {
    pub kind: FreeKind,
    pub anchor: Anchor,
    pub rel: Bbox,
    pub abs: Bbox,
    pub points: Vec<Point>,
    pub abs_points: Vec<Point>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BarLine {
    pub loc: InputLocation,
    pub x: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_page: Option<ZoneMark>,
    pub abs: Bbox,
}

/// A block of text occupying a system slot of its own
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageBlock {
    pub loc: InputLocation,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_page: Option<ZoneMark>,
    pub rel: Bbox,
    pub abs: Bbox,
}

/// A chord grid used somewhere in the score
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordGrid {
    pub name: String,
    pub width: f64,
    pub height: f64,
    /// Height of the printed name
    pub name_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    #[default]
    Right,
}

/// Heights of the blocks printed around the music area of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorationSet {
    pub header: f64,
    pub top: f64,
    pub bottom: f64,
    pub footer: f64,
}

impl DecorationSet {
    pub fn above(&self) -> f64 {
        self.header + self.top
    }

    pub fn below(&self) -> f64 {
        self.bottom + self.footer
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sided<T> {
    pub left: T,
    pub right: T,
}

impl<T: Copy> Sided<T> {
    pub fn get(&self, side: Side) -> T {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// Decorations for the first page and for the pages after it
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Decorations {
    pub first: Sided<DecorationSet>,
    pub later: Sided<DecorationSet>,
}
