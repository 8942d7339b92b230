//! Score, staff and voice parameters
//!
//! Parameters cascade voice → staff → score → built-in default. Their value
//! at any point of the timeline is the result of replaying every `Params`
//! record before that point, so every pass that moves around the timeline
//! keeps an explicit `ParameterContext` in step with its position.

use super::{InputLocation, Record, Timeline};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    #[default]
    Treble,
    /// Treble clef sounding an octave lower
    Treble8,
    /// Treble clef sounding an octave higher
    Treble8up,
    Soprano,
    Mezzosoprano,
    Alto,
    Tenor,
    Baritone,
    Bass,
}

impl Clef {
    /// Diatonic steps above C0 of the pitch on the middle staff line
    pub fn middle_line_steps(self) -> i32 {
        match self {
            Self::Treble => 34,
            Self::Treble8 => 27,
            Self::Treble8up => 41,
            Self::Soprano => 32,
            Self::Mezzosoprano => 30,
            Self::Alto => 28,
            Self::Tenor => 26,
            Self::Baritone => 24,
            Self::Bass => 22,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    PageHeight,
    PageWidth,
    TopMargin,
    BottomMargin,
    LeftMargin,
    RightMargin,
    /// Swap left and right margins on left pages
    FlipMargins,
    /// Pages printed on one physical sheet
    PanelsPerPage,
    MinScoreSep,
    MaxScoreSep,
    MinScorePad,
    MaxScorePad,
    /// Maximum number of systems on one page
    MaxScores,
    StaffSep,
    StaffPad,
    StaffLines,
    StaffScale,
    Clef,
    StemLen,
    BeamShort,
    BeamFactor,
    BeamMaxAngle,
    GridsAtEnd,
    GridScale,
    GridPad,
    SlashesBetween,
    SlashHeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Num,
    Bool,
    Clef,
}

impl ParamId {
    fn kind(self) -> ValueKind {
        match self {
            Self::FlipMargins | Self::GridsAtEnd | Self::SlashesBetween => ValueKind::Bool,
            Self::Clef => ValueKind::Clef,
            _ => ValueKind::Num,
        }
    }

    /// Built-in value when nothing in the score sets the parameter
    pub fn default_value(self) -> Value {
        match self {
            Self::PageHeight => Value::Num(132.0),
            Self::PageWidth => Value::Num(102.0),
            Self::TopMargin | Self::BottomMargin => Value::Num(6.0),
            Self::LeftMargin | Self::RightMargin => Value::Num(6.0),
            Self::FlipMargins => Value::Bool(false),
            Self::PanelsPerPage => Value::Num(1.0),
            Self::MinScoreSep => Value::Num(6.0),
            Self::MaxScoreSep => Value::Num(10.0),
            Self::MinScorePad => Value::Num(1.0),
            Self::MaxScorePad => Value::Num(5.0),
            Self::MaxScores => Value::Num(1000.0),
            Self::StaffSep => Value::Num(5.0),
            Self::StaffPad => Value::Num(0.0),
            Self::StaffLines => Value::Num(5.0),
            Self::StaffScale => Value::Num(1.0),
            Self::Clef => Value::Clef(Clef::Treble),
            Self::StemLen => Value::Num(3.5),
            Self::BeamShort => Value::Num(0.5),
            Self::BeamFactor => Value::Num(1.0),
            Self::BeamMaxAngle => Value::Num(20.0),
            Self::GridsAtEnd => Value::Bool(false),
            Self::GridScale => Value::Num(1.0),
            Self::GridPad => Value::Num(0.2),
            Self::SlashesBetween => Value::Bool(false),
            Self::SlashHeight => Value::Num(2.0),
        }
    }

    fn allowed_in(self, scope: &ParamScope) -> bool {
        match scope {
            ParamScope::Score => true,
            ParamScope::Staff(_) => matches!(
                self,
                Self::StaffSep
                    | Self::StaffPad
                    | Self::StaffLines
                    | Self::StaffScale
                    | Self::Clef
                    | Self::StemLen
                    | Self::BeamShort
                    | Self::BeamFactor
                    | Self::BeamMaxAngle
            ),
            ParamScope::Voice(_, _) => matches!(
                self,
                Self::StemLen | Self::BeamShort | Self::BeamFactor | Self::BeamMaxAngle
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Num(f64),
    Bool(bool),
    Clef(Clef),
}

impl Value {
    fn kind(&self) -> ValueKind {
        match self {
            Self::Num(_) => ValueKind::Num,
            Self::Bool(_) => ValueKind::Bool,
            Self::Clef(_) => ValueKind::Clef,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamScope {
    #[default]
    Score,
    Staff(usize),
    Voice(usize, usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub param: ParamId,
    pub value: Value,
}

/// A block of parameter settings in the timeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamChange {
    pub loc: InputLocation,
    pub scope: ParamScope,
    pub settings: Vec<Setting>,
}

type Settings = HashMap<ParamId, Value>;

/// Parameter values in force at one timeline position
#[derive(Debug, Clone, Default)]
pub struct ParameterContext {
    score: Settings,
    staffs: HashMap<usize, Settings>,
    voices: HashMap<(usize, usize), Settings>,
    /// Number of leading records already applied
    position: usize,
}

/// Saved state of a `ParameterContext`, see `ParameterContext::snapshot`
#[derive(Debug, Clone)]
pub struct ContextSnapshot(ParameterContext);

impl ParameterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records before this index have been applied
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn apply(&mut self, change: &ParamChange) -> Result<()> {
        for setting in &change.settings {
            if setting.value.kind() != setting.param.kind() {
                return Err(Error::internal(format!(
                    "{}: value {:?} has the wrong type for {:?}",
                    change.loc, setting.value, setting.param
                )));
            }
            if !setting.param.allowed_in(&change.scope) {
                return Err(Error::internal(format!(
                    "{}: {:?} cannot be set in {:?} context",
                    change.loc, setting.param, change.scope
                )));
            }
            let target = match change.scope {
                ParamScope::Score => &mut self.score,
                ParamScope::Staff(staff) => self.staffs.entry(staff).or_default(),
                ParamScope::Voice(staff, voice) => self.voices.entry((staff, voice)).or_default(),
            };
            target.insert(setting.param, setting.value);
        }
        Ok(())
    }

    /// Reset to defaults and replay every parameter record before `position`.
    pub fn replay_to(&mut self, timeline: &Timeline, position: usize) -> Result<()> {
        *self = Self::new();
        self.advance_to(timeline, position)
    }

    /// Bring the context to `position`, replaying only the records in
    /// between when moving forward.
    pub fn advance_to(&mut self, timeline: &Timeline, position: usize) -> Result<()> {
        if position < self.position {
            return self.replay_to(timeline, position);
        }
        let end = position.min(timeline.records.len());
        for record in &timeline.records[self.position.min(end)..end] {
            if let Record::Params(change) = record {
                self.apply(change)?;
            }
        }
        self.position = position;
        Ok(())
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: ContextSnapshot) {
        *self = snapshot.0;
    }

    pub fn resolve(&self, staff: Option<usize>, voice: Option<usize>, id: ParamId) -> Value {
        if let (Some(staff), Some(voice)) = (staff, voice) {
            if let Some(v) = self.voices.get(&(staff, voice)).and_then(|s| s.get(&id)) {
                return *v;
            }
        }
        if let Some(staff) = staff {
            if let Some(v) = self.staffs.get(&staff).and_then(|s| s.get(&id)) {
                return *v;
            }
        }
        self.score.get(&id).copied().unwrap_or_else(|| id.default_value())
    }

    /// Score-wide numeric parameter
    pub fn num(&self, id: ParamId) -> f64 {
        self.staff_num(None, id)
    }

    pub fn staff_num(&self, staff: Option<usize>, id: ParamId) -> f64 {
        self.voice_num(staff, None, id)
    }

    pub fn voice_num(&self, staff: Option<usize>, voice: Option<usize>, id: ParamId) -> f64 {
        match self.resolve(staff, voice, id) {
            Value::Num(v) => v,
            _ => match id.default_value() {
                Value::Num(v) => v,
                _ => 0.0,
            },
        }
    }

    pub fn flag(&self, id: ParamId) -> bool {
        matches!(self.resolve(None, None, id), Value::Bool(true))
    }

    pub fn clef(&self, staff: usize) -> Clef {
        match self.resolve(Some(staff), None, ParamId::Clef) {
            Value::Clef(c) => c,
            _ => Clef::default(),
        }
    }

    pub fn staff_scale(&self, staff: usize) -> f64 {
        self.staff_num(Some(staff), ParamId::StaffScale)
    }

    /// Distance from the middle line to the outer lines of a staff
    pub fn staff_half_height(&self, staff: usize) -> f64 {
        let lines = self.staff_num(Some(staff), ParamId::StaffLines).round().max(1.0);
        let steps = if lines <= 1.0 { 2.0 } else { lines - 1.0 };
        steps * super::geometry::STEPSIZE * self.staff_scale(staff)
    }
}
