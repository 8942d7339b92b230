//! The timeline: every record of the score in order, plus the arenas
//! holding groups and staff items that records refer to by handle.

pub mod geometry;
pub mod group;
pub mod params;
pub mod records;

use crate::error::{Error, Result};
use group::Group;
use records::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

pub use geometry::{Bbox, Point};
pub use params::{Clef, ParamChange, ParamId, ParameterContext};

/// Where in the input a record came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLocation {
    pub file: String,
    pub line: usize,
}

impl InputLocation {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for InputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "line {}", self.line)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

/// Handle of a group in `Timeline::groups`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub usize);

/// Handle of an annotation in `Timeline::stuff`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StuffId(pub usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Params(ParamChange),
    SystemBreak(SystemBreak),
    ClefKeySig(ClefKeySig),
    ChordAnchor(ChordAnchor),
    Staff(StaffContent),
    Free(FreeItem),
    BarLine(BarLine),
    Block(PageBlock),
}

impl Record {
    /// Same-page mark carried by this record, if any
    pub fn zone_mark(&self) -> Option<ZoneMark> {
        match self {
            Self::BarLine(bar) => bar.same_page,
            Self::Block(block) => block.same_page,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeline {
    pub records: Vec<Record>,
    pub groups: Vec<Group>,
    pub stuff: Vec<Annotation>,
    /// Chord grids used anywhere in the score
    pub grids: Vec<ChordGrid>,
    pub decorations: Decorations,
}

impl Timeline {
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id.0]
    }

    pub fn system_break(&self, index: usize) -> Option<&SystemBreak> {
        match self.records.get(index) {
            Some(Record::SystemBreak(sb)) => Some(sb),
            _ => None,
        }
    }

    pub fn system_break_mut(&mut self, index: usize) -> Option<&mut SystemBreak> {
        match self.records.get_mut(index) {
            Some(Record::SystemBreak(sb)) => Some(sb),
            _ => None,
        }
    }

    /// Record ranges of all systems, each starting at its `SystemBreak`.
    pub fn systems(&self) -> Vec<Range<usize>> {
        let starts: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Record::SystemBreak(_)))
            .map(|(i, _)| i)
            .collect();
        starts
            .iter()
            .enumerate()
            .map(|(k, &start)| {
                let end = starts.get(k + 1).copied().unwrap_or(self.records.len());
                start..end
            })
            .collect()
    }

    /// Split a system into measures. Each range ends with its bar line, if any.
    pub fn measures(&self, system: Range<usize>) -> Vec<Range<usize>> {
        let mut measures = Vec::new();
        let mut start = system.start;
        for i in system.clone() {
            if matches!(self.records[i], Record::BarLine(_)) {
                measures.push(start..i + 1);
                start = i + 1;
            }
        }
        if start < system.end
            && self.records[start..system.end]
                .iter()
                .any(|r| matches!(r, Record::Staff(_)))
        {
            measures.push(start..system.end);
        }
        measures
    }

    /// Check the structural invariants later passes rely on.
    pub fn validate(&self) -> Result<()> {
        let mut seen_system = false;
        let mut last_staff: Option<usize> = None;
        for (i, record) in self.records.iter().enumerate() {
            match record {
                Record::Params(_) => {}
                Record::SystemBreak(_) => {
                    seen_system = true;
                    last_staff = None;
                }
                Record::BarLine(_) => last_staff = None,
                Record::Staff(staff) => {
                    if !seen_system {
                        return Err(Error::internal(format!(
                            "record {i}: staff before the first system break"
                        )));
                    }
                    if let Some(prev) = last_staff {
                        if staff.staff <= prev {
                            return Err(Error::internal(format!(
                                "record {i}: staff {} follows staff {prev} in one measure",
                                staff.staff
                            )));
                        }
                    }
                    last_staff = Some(staff.staff);
                    for id in staff.group_ids() {
                        self.check_group(id)?;
                    }
                    if let Some(bad) = staff.stuff.iter().find(|s| s.0 >= self.stuff.len()) {
                        return Err(Error::internal(format!(
                            "record {i}: dangling annotation handle {}",
                            bad.0
                        )));
                    }
                }
                Record::ClefKeySig(_)
                | Record::ChordAnchor(_)
                | Record::Free(_)
                | Record::Block(_) => {
                    if !seen_system {
                        return Err(Error::internal(format!(
                            "record {i}: content before the first system break"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_group(&self, id: GroupId) -> Result<()> {
        let group = self
            .groups
            .get(id.0)
            .ok_or_else(|| Error::internal(format!("dangling group handle {}", id.0)))?;
        for link in [group.prev, group.next].into_iter().flatten() {
            if link.0 >= self.groups.len() {
                return Err(Error::internal(format!(
                    "group {} links to missing group {}",
                    id.0, link.0
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff(n: usize) -> Record {
        Record::Staff(StaffContent {
            staff: n,
            ..StaffContent::default()
        })
    }

    #[test]
    fn test_systems_and_measures() {
        let tl = Timeline {
            records: vec![
                Record::Params(ParamChange::default()),
                Record::SystemBreak(SystemBreak::default()),
                staff(1),
                staff(2),
                Record::BarLine(BarLine::default()),
                staff(1),
                staff(2),
                Record::BarLine(BarLine::default()),
                Record::SystemBreak(SystemBreak::default()),
                staff(1),
                staff(2),
            ],
            ..Timeline::default()
        };
        let systems = tl.systems();
        assert_eq!(systems, vec![1..8, 8..11]);
        assert_eq!(tl.measures(systems[0].clone()), vec![1..5, 5..8]);
        assert_eq!(tl.measures(systems[1].clone()), vec![8..11]);
        tl.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unordered_staffs() {
        let tl = Timeline {
            records: vec![
                Record::SystemBreak(SystemBreak::default()),
                staff(2),
                staff(1),
            ],
            ..Timeline::default()
        };
        assert!(matches!(tl.validate(), Err(Error::Internal(_))));
    }

    #[test]
    fn test_record_json_shape() {
        let json = r#"{"type":"bar_line","x":12.0,"same_page":"begin"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.zone_mark(), Some(ZoneMark::Begin));
    }
}
