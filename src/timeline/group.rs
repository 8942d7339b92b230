//! Groups (chords, rests, spaces) and their notes

use super::geometry::{Bbox, HEAD_HALF_HEIGHT};
use super::params::Clef;
use super::{GroupId, InputLocation};
use num_rational::Rational64;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    #[default]
    Notes,
    Rest,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemDir {
    #[default]
    Up,
    Down,
}

impl StemDir {
    /// +1 for up, -1 for down
    pub fn sign(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }
}

/// Which neighbouring staff a group is drawn against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossStaff {
    #[default]
    None,
    Above,
    Below,
}

/// Position of a group within its beam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeamLoc {
    #[default]
    None,
    Start,
    Inner,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accidental {
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
}

/// Augmentation dot position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dot {
    pub rel_y: f64,
    pub abs_y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    /// Pitch letter, `a` through `g`
    pub letter: char,
    pub octave: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accidental: Option<Accidental>,
    /// Steps above the middle line of the staff the note is drawn on
    pub steps_up: i32,
    pub rel: Bbox,
    pub abs: Bbox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dot: Option<Dot>,
}

impl Default for Note {
    fn default() -> Self {
        Self {
            letter: 'c',
            octave: 4,
            accidental: None,
            steps_up: 0,
            rel: Bbox::default(),
            abs: Bbox::default(),
            dot: None,
        }
    }
}

impl Note {
    /// Diatonic steps above C0
    pub fn diatonic_steps(&self) -> i32 {
        let letter = match self.letter.to_ascii_lowercase() {
            'c' => 0,
            'd' => 1,
            'e' => 2,
            'f' => 3,
            'g' => 4,
            'a' => 5,
            'b' => 6,
            _ => 0,
        };
        self.octave * 7 + letter
    }

    pub fn shift_y(&mut self, dy: f64) {
        self.abs.shift_y(dy);
        if let Some(dot) = &mut self.dot {
            dot.abs_y += dy;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub loc: InputLocation,
    pub kind: GroupKind,
    pub grace: bool,
    /// Offset from the start of the measure, in whole notes
    pub time: Rational64,
    pub duration: Rational64,
    pub rel: Bbox,
    pub abs: Bbox,
    pub notes: Vec<Note>,
    pub stem_dir: StemDir,
    /// Measured from the note nearest the stem tip
    pub stem_len: f64,
    /// Stem length requested by the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stem_forced: Option<f64>,
    pub beam: BeamLoc,
    pub beam_levels: u8,
    /// Beam slope requested by the user, set on the first group of a beam
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beam_slope: Option<f64>,
    pub cross: CrossStaff,
    pub beam_to: CrossStaff,
    /// Clef change printed just before this group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clef_change: Option<Clef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<GroupId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<GroupId>,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            loc: InputLocation::default(),
            kind: GroupKind::Notes,
            grace: false,
            time: Rational64::from_integer(0),
            duration: Rational64::new(1, 4),
            rel: Bbox::default(),
            abs: Bbox::default(),
            notes: Vec::new(),
            stem_dir: StemDir::Up,
            stem_len: 0.0,
            stem_forced: None,
            beam: BeamLoc::None,
            beam_levels: 0,
            beam_slope: None,
            cross: CrossStaff::None,
            beam_to: CrossStaff::None,
            clef_change: None,
            prev: None,
            next: None,
        }
    }
}

impl Group {
    pub fn has_notes(&self) -> bool {
        self.kind == GroupKind::Notes && !self.notes.is_empty()
    }

    pub fn is_beamed(&self) -> bool {
        self.beam != BeamLoc::None
    }

    /// Absolute y of the highest note
    pub fn top_y(&self) -> f64 {
        self.notes
            .iter()
            .map(|n| n.abs.y)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Absolute y of the lowest note
    pub fn bottom_y(&self) -> f64 {
        self.notes.iter().map(|n| n.abs.y).fold(f64::INFINITY, f64::min)
    }

    /// Absolute y of the note the stem length is measured from
    pub fn stem_base_y(&self) -> f64 {
        match self.stem_dir {
            StemDir::Up => self.top_y(),
            StemDir::Down => self.bottom_y(),
        }
    }

    pub fn stem_tip_y(&self) -> f64 {
        self.stem_base_y() + self.stem_dir.sign() * self.stem_len
    }

    /// Recompute the absolute north and south from notes, dots and stem.
    pub fn refresh_vertical_bounds(&mut self) {
        if !self.has_notes() {
            return;
        }
        let mut n = f64::NEG_INFINITY;
        let mut s = f64::INFINITY;
        for note in &self.notes {
            n = n.max(note.abs.y + HEAD_HALF_HEIGHT);
            s = s.min(note.abs.y - HEAD_HALF_HEIGHT);
            if let Some(dot) = note.dot {
                n = n.max(dot.abs_y + HEAD_HALF_HEIGHT / 2.0);
                s = s.min(dot.abs_y - HEAD_HALF_HEIGHT / 2.0);
            }
        }
        if self.stem_len > 0.0 {
            let tip = self.stem_tip_y();
            n = n.max(tip);
            s = s.min(tip);
        }
        self.abs.n = n;
        self.abs.s = s;
    }

    pub fn shift_x(&mut self, dx: f64) {
        self.abs.shift_x(dx);
        for note in &mut self.notes {
            note.abs.shift_x(dx);
        }
    }
}
