//! Groups drawn against a neighbouring staff.
//!
//! Runs after absolute placement. A cross-staff group is moved vertically
//! onto the other staff using the clef in force there, then nudged right
//! if it lands on top of something already printed on that staff.

use crate::error::{Error, Result};
use crate::timeline::geometry::{FUDGE, STEPSIZE};
use crate::timeline::group::{BeamLoc, CrossStaff, Group, GroupKind};
use crate::timeline::params::Clef;
use crate::timeline::records::StaffContent;
use crate::timeline::{GroupId, ParameterContext, Record, Timeline};
use num_rational::Rational64;
use std::ops::Range;

/// A cross-staff group and the staff record it is drawn against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CrossGroup {
    id: GroupId,
    other: usize,
}

pub fn reposition_cross_staff(timeline: &mut Timeline, ctx: &mut ParameterContext) -> Result<()> {
    let mut moved = Vec::new();
    for system in timeline.systems() {
        for measure in timeline.measures(system) {
            moved.extend(find_cross_groups(timeline, measure)?);
        }
    }

    for cg in &moved {
        let offset = move_to_other_staff(timeline, ctx, *cg)?;
        log::debug!(
            "{}: cross-staff group moved by {:.3}",
            timeline.group(cg.id).loc,
            offset
        );
    }
    for cg in &moved {
        avoid_collisions(timeline, *cg)?;
    }
    if !moved.is_empty() {
        log::info!("{} cross-staff groups repositioned", moved.len());
    }
    Ok(())
}

/// Record indices of the staffs of one measure, top to bottom
pub(crate) fn staff_records(timeline: &Timeline, measure: Range<usize>) -> Vec<usize> {
    measure
        .filter(|&i| matches!(timeline.records[i], Record::Staff(_)))
        .collect()
}

pub(crate) fn staff_at(timeline: &Timeline, index: usize) -> Result<&StaffContent> {
    match timeline.records.get(index) {
        Some(Record::Staff(staff)) => Ok(staff),
        _ => Err(Error::internal(format!("record {index} is not a staff"))),
    }
}

/// Nearest visible staff above or below position `k` of `staffs`
pub(crate) fn neighbour(
    timeline: &Timeline,
    staffs: &[usize],
    k: usize,
    dir: CrossStaff,
) -> Option<usize> {
    let visible = |&&i: &&usize| matches!(&timeline.records[i], Record::Staff(s) if s.visible);
    match dir {
        CrossStaff::None => None,
        CrossStaff::Above => staffs[..k].iter().rev().find(visible).copied(),
        CrossStaff::Below => staffs[k + 1..].iter().find(visible).copied(),
    }
}

fn find_cross_groups(timeline: &Timeline, measure: Range<usize>) -> Result<Vec<CrossGroup>> {
    let staffs = staff_records(timeline, measure);
    let mut found = Vec::new();
    for (k, &index) in staffs.iter().enumerate() {
        let staff = staff_at(timeline, index)?;
        if !staff.visible {
            continue;
        }
        for id in staff.group_ids() {
            let group = timeline.group(id);
            if group.cross == CrossStaff::None || !group.has_notes() {
                continue;
            }
            let Some(other) = neighbour(timeline, &staffs, k, group.cross) else {
                let side = if group.cross == CrossStaff::Above { "above" } else { "below" };
                return Err(Error::CrossStaff {
                    loc: group.loc.clone(),
                    message: format!("no visible staff {side} for cross-staff notes"),
                });
            };
            found.push(CrossGroup { id, other });
        }
    }
    Ok(found)
}

/// Clef in force on the staff of record `other` at `time`: the latest clef
/// change in that measure not after `time`, else the clef the measure
/// started with.
fn effective_clef(
    timeline: &Timeline,
    ctx: &mut ParameterContext,
    other: usize,
    time: Rational64,
) -> Result<Clef> {
    let staff = staff_at(timeline, other)?;
    let change = staff
        .group_ids()
        .map(|id| timeline.group(id))
        .filter(|g| g.time <= time)
        .filter_map(|g| g.clef_change.map(|c| (g.time, c)))
        .max_by_key(|&(t, _)| t);
    if let Some((_, clef)) = change {
        return Ok(clef);
    }
    ctx.advance_to(timeline, other)?;
    Ok(ctx.clef(staff.staff))
}

/// Move the notes of a group onto the other staff. Returns the offset applied.
fn move_to_other_staff(
    timeline: &mut Timeline,
    ctx: &mut ParameterContext,
    cg: CrossGroup,
) -> Result<f64> {
    let time = timeline.group(cg.id).time;
    let clef = effective_clef(timeline, ctx, cg.other, time)?;
    let other = staff_at(timeline, cg.other)?;
    ctx.advance_to(timeline, cg.other)?;
    let center = other.abs.y;
    let step = STEPSIZE * ctx.staff_scale(other.staff);

    let group = timeline.group_mut(cg.id);
    for note in &mut group.notes {
        note.steps_up = note.diatonic_steps() - clef.middle_line_steps();
    }
    let offset = match group.notes.first() {
        Some(first) => center + first.steps_up as f64 * step - first.abs.y,
        None => return Ok(0.0),
    };

    let away = matches!(
        (group.cross, group.stem_dir.sign() > 0.0),
        (CrossStaff::Above, false) | (CrossStaff::Below, true)
    );
    if group.is_beamed() && away && group.stem_len > 0.0 {
        // the tip stays on the beam
        group.stem_len = beam_stem(group, group.stem_len - group.stem_dir.sign() * offset)?;
    }
    for note in &mut group.notes {
        note.shift_y(offset);
    }
    group.abs.shift_y(offset);
    group.refresh_vertical_bounds();
    Ok(offset)
}

/// Slope of the beam holding `id`, from its user setting or its end stems
fn beam_slope(timeline: &Timeline, id: GroupId) -> f64 {
    let mut start = id;
    while timeline.group(start).beam != BeamLoc::Start {
        match timeline.group(start).prev {
            Some(p) if timeline.group(p).is_beamed() => start = p,
            _ => break,
        }
    }
    if let Some(slope) = timeline.group(start).beam_slope {
        return slope;
    }
    let mut end = start;
    while timeline.group(end).beam != BeamLoc::End {
        match timeline.group(end).next {
            Some(n) if timeline.group(n).is_beamed() => end = n,
            _ => break,
        }
    }
    let (a, b) = (timeline.group(start), timeline.group(end));
    let run = b.abs.x - a.abs.x;
    if run.abs() < FUDGE || !a.has_notes() || !b.has_notes() {
        0.0
    } else {
        (b.stem_tip_y() - a.stem_tip_y()) / run
    }
}

/// Shift a cross-staff group right, clear of concurrent groups on the
/// other staff, but never into the next group of its own voice.
fn avoid_collisions(timeline: &mut Timeline, cg: CrossGroup) -> Result<()> {
    let other = staff_at(timeline, cg.other)?;
    let group = timeline.group(cg.id);
    let need = other
        .group_ids()
        .filter(|&id| id != cg.id)
        .map(|id| timeline.group(id))
        .filter(|o| o.time == group.time && !o.grace && o.kind != GroupKind::Space)
        .filter(|o| {
            group.abs.overlaps_vertically(&o.abs) && group.abs.overlaps_horizontally(&o.abs)
        })
        .map(|o| o.abs.e - group.abs.w)
        .fold(0.0, f64::max);
    if need <= FUDGE {
        return Ok(());
    }

    let cap = group
        .next
        .map(|n| (timeline.group(n).abs.w - group.abs.e).max(0.0))
        .unwrap_or(f64::INFINITY);
    let dx = need.min(cap);
    if dx < need {
        log::debug!(
            "{}: cross-staff group cannot fully clear the other staff",
            group.loc
        );
    }
    if dx <= FUDGE {
        return Ok(());
    }

    let slope = if group.is_beamed() { beam_slope(timeline, cg.id) } else { 0.0 };
    let group = timeline.group_mut(cg.id);
    if group.is_beamed() {
        // the tip follows the beam along its slope
        group.stem_len = beam_stem(group, group.stem_len + group.stem_dir.sign() * slope * dx)?;
    }
    group.shift_x(dx);
    group.refresh_vertical_bounds();

    let mut prev = group.prev;
    while let Some(p) = prev {
        let grace = timeline.group_mut(p);
        if !grace.grace {
            break;
        }
        grace.shift_x(dx);
        prev = grace.prev;
    }
    Ok(())
}

/// Length of a beamed stem whose tip has to stay on the beam
fn beam_stem(group: &Group, length: f64) -> Result<f64> {
    if length < -FUDGE {
        return Err(Error::StemNegative {
            loc: group.loc.clone(),
            length,
        });
    }
    Ok(length.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::group::{Group, Note, StemDir};
    use crate::timeline::params::{ParamChange, ParamId, ParamScope, Setting, Value};
    use crate::timeline::records::SystemBreak;
    use crate::timeline::Bbox;

    fn clef(staff: usize, clef: Clef) -> Record {
        Record::Params(ParamChange {
            scope: ParamScope::Staff(staff),
            settings: vec![Setting {
                param: ParamId::Clef,
                value: Value::Clef(clef),
            }],
            ..ParamChange::default()
        })
    }

    fn staff(n: usize, y: f64, groups: Vec<usize>) -> Record {
        Record::Staff(StaffContent {
            staff: n,
            abs: Bbox::new(0.0, y, y + 2.0, y - 2.0, 50.0, 0.0),
            voices: vec![groups.into_iter().map(GroupId).collect()],
            ..StaffContent::default()
        })
    }

    /// A chord at x, its notes placed on a staff centered at `center`
    fn chord(x: f64, center: f64, pitches: &[(char, i32)], clef: Clef) -> Group {
        let notes: Vec<Note> = pitches
            .iter()
            .map(|&(letter, octave)| {
                let mut note = Note { letter, octave, ..Note::default() };
                note.steps_up = note.diatonic_steps() - clef.middle_line_steps();
                let y = center + note.steps_up as f64 * STEPSIZE;
                note.abs = Bbox::new(x, y, y + 0.5, y - 0.5, x + 0.6, x - 0.6);
                note
            })
            .collect();
        let mut group = Group {
            notes,
            abs: Bbox::new(x, 0.0, 0.0, 0.0, x + 0.6, x - 0.6),
            stem_len: 3.5,
            ..Group::default()
        };
        group.refresh_vertical_bounds();
        group
    }

    fn timeline(records: Vec<Record>, groups: Vec<Group>) -> Timeline {
        Timeline {
            records,
            groups,
            ..Timeline::default()
        }
    }

    #[test]
    fn test_moves_onto_staff_above_with_its_clef() {
        // alto lower staff, tenor upper staff: a c4 moves up two steps in
        // terms of its position on the new staff
        let mut g = chord(10.0, -10.0, &[('c', 4), ('e', 4)], Clef::Alto);
        g.cross = CrossStaff::Above;
        let before: Vec<(i32, f64)> = g.notes.iter().map(|n| (n.steps_up, n.abs.y)).collect();
        let mut tl = timeline(
            vec![
                clef(1, Clef::Tenor),
                clef(2, Clef::Alto),
                Record::SystemBreak(SystemBreak::default()),
                staff(1, 0.0, vec![]),
                staff(2, -10.0, vec![0]),
            ],
            vec![g],
        );
        let mut ctx = ParameterContext::new();
        reposition_cross_staff(&mut tl, &mut ctx).unwrap();

        let g = tl.group(GroupId(0));
        assert_eq!(g.notes[0].steps_up, before[0].0 + 2);
        assert_eq!(g.notes[0].abs.y, 1.0);
        let offsets: Vec<f64> = g.notes.iter().zip(&before).map(|(n, b)| n.abs.y - b.1).collect();
        assert!(offsets.iter().all(|&o| (o - 11.0).abs() < 1e-9));
        // unbeamed stem moves with the notes
        assert_eq!(g.stem_len, 3.5);
        assert_eq!(g.abs.n, 2.0 + 3.5);
    }

    #[test]
    fn test_clef_change_on_other_staff_wins() {
        let mut g = chord(10.0, 0.0, &[('c', 4)], Clef::Treble);
        g.cross = CrossStaff::Below;
        g.time = Rational64::new(1, 4);
        let mut change = chord(2.0, -10.0, &[('g', 2)], Clef::Treble);
        change.clef_change = Some(Clef::Bass);
        let mut tl = timeline(
            vec![
                Record::SystemBreak(SystemBreak::default()),
                staff(1, 0.0, vec![0]),
                staff(2, -10.0, vec![1]),
            ],
            vec![g, change],
        );
        let mut ctx = ParameterContext::new();
        reposition_cross_staff(&mut tl, &mut ctx).unwrap();
        let g = tl.group(GroupId(0));
        assert_eq!(g.notes[0].steps_up, 28 - 22);
        assert_eq!(g.notes[0].abs.y, -10.0 + 3.0);
    }

    #[test]
    fn test_beamed_stem_pointing_away_keeps_its_tip() {
        let mut g = chord(10.0, -10.0, &[('c', 4)], Clef::Treble);
        g.cross = CrossStaff::Above;
        g.stem_dir = StemDir::Down;
        g.beam = BeamLoc::Start;
        g.refresh_vertical_bounds();
        let tip = g.stem_tip_y();
        let mut tl = timeline(
            vec![
                Record::SystemBreak(SystemBreak::default()),
                staff(1, 0.0, vec![]),
                staff(2, -10.0, vec![0]),
            ],
            vec![g],
        );
        let mut ctx = ParameterContext::new();
        reposition_cross_staff(&mut tl, &mut ctx).unwrap();
        let g = tl.group(GroupId(0));
        assert!((g.stem_tip_y() - tip).abs() < 1e-9);
        assert_eq!(g.stem_len, 13.5);
    }

    #[test]
    fn test_top_staff_cannot_cross_above() {
        let mut g = chord(10.0, 0.0, &[('c', 4)], Clef::Treble);
        g.cross = CrossStaff::Above;
        let mut tl = timeline(
            vec![Record::SystemBreak(SystemBreak::default()), staff(1, 0.0, vec![0])],
            vec![g],
        );
        let mut ctx = ParameterContext::new();
        let err = reposition_cross_staff(&mut tl, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::CrossStaff { .. }));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_avoidance_shifts_right_and_respects_next_group() {
        // g0 crosses onto staff 1 at b4, where g2 sits at the same time
        let mut g0 = chord(10.0, -10.0, &[('b', 4)], Clef::Treble);
        g0.cross = CrossStaff::Above;
        g0.next = Some(GroupId(1));
        g0.prev = Some(GroupId(3));
        let g1 = chord(20.0, -10.0, &[('c', 4)], Clef::Treble);
        let g2 = chord(10.5, 0.0, &[('b', 4)], Clef::Treble);
        let mut grace = chord(8.0, -10.0, &[('a', 4)], Clef::Treble);
        grace.grace = true;

        let mut tl = timeline(
            vec![
                Record::SystemBreak(SystemBreak::default()),
                staff(1, 0.0, vec![2]),
                staff(2, -10.0, vec![3, 0, 1]),
            ],
            vec![g0, g1, g2, grace],
        );
        let mut ctx = ParameterContext::new();
        reposition_cross_staff(&mut tl, &mut ctx).unwrap();
        // g2 spans 9.9..11.1, g0 starts at 9.4
        let g0 = tl.group(GroupId(0));
        assert!((g0.abs.w - 11.1).abs() < 1e-9);
        assert!((tl.group(GroupId(3)).abs.x - 9.7).abs() < 1e-9);

        // next group right behind caps the shift
        let mut tl2 = tl.clone();
        tl2.group_mut(GroupId(0)).shift_x(-1.7);
        tl2.group_mut(GroupId(1)).shift_x(-8.0);
        // g0 spans 9.4..10.6, g1 starts at 11.4
        avoid_collisions(&mut tl2, CrossGroup { id: GroupId(0), other: 1 }).unwrap();
        assert!((tl2.group(GroupId(0)).abs.e - 11.4).abs() < 1e-9);
    }

    #[test]
    fn test_beamed_stem_forced_through_its_notes_is_an_error() {
        // bass c4 sits a step above the lower staff's center; on the upper
        // staff in treble8up it lands well below, so the down stem would
        // have to reach upward to keep its tip
        let mut g = chord(10.0, -2.0, &[('c', 4)], Clef::Bass);
        g.cross = CrossStaff::Above;
        g.stem_dir = StemDir::Down;
        g.beam = BeamLoc::Start;
        g.refresh_vertical_bounds();
        let mut tl = timeline(
            vec![
                clef(1, Clef::Treble8up),
                Record::SystemBreak(SystemBreak::default()),
                staff(1, 0.0, vec![]),
                staff(2, -2.0, vec![0]),
            ],
            vec![g],
        );
        let mut ctx = ParameterContext::new();
        let err = reposition_cross_staff(&mut tl, &mut ctx).unwrap_err();
        match err {
            Error::StemNegative { length, .. } => assert!((length + 4.0).abs() < 1e-9),
            other => panic!("unexpected error {other:?}"),
        }
    }

    /// A beam from x=2 to x=20 on staff 2 whose inner group is drawn on
    /// staff 1 with its stem down to the beam, next to a chord of staff 1.
    fn beam_across(slope: Option<f64>) -> Timeline {
        let line = |x: f64| -6.5 + (x - 2.0) * 4.0 / 18.0;
        let mut start = chord(2.0, -10.0, &[('b', 4)], Clef::Treble);
        start.beam = BeamLoc::Start;
        start.beam_slope = slope;
        start.next = Some(GroupId(1));
        let mut inner = chord(10.0, 0.0, &[('b', 4)], Clef::Treble);
        inner.cross = CrossStaff::Above;
        inner.stem_dir = StemDir::Down;
        inner.stem_len = -line(10.0);
        inner.beam = BeamLoc::Inner;
        inner.prev = Some(GroupId(0));
        inner.next = Some(GroupId(2));
        inner.refresh_vertical_bounds();
        let mut end = chord(20.0, -6.0, &[('b', 4)], Clef::Treble);
        end.beam = BeamLoc::End;
        end.prev = Some(GroupId(1));
        let obstacle = chord(10.5, 0.0, &[('b', 4)], Clef::Treble);
        timeline(
            vec![
                Record::SystemBreak(SystemBreak::default()),
                staff(1, 0.0, vec![3]),
                staff(2, -10.0, vec![0, 1, 2]),
            ],
            vec![start, inner, end, obstacle],
        )
    }

    #[test]
    fn test_shifted_beamed_group_keeps_tip_on_beam() {
        let mut tl = beam_across(None);
        avoid_collisions(&mut tl, CrossGroup { id: GroupId(1), other: 1 }).unwrap();
        let g = tl.group(GroupId(1));
        assert!((g.abs.x - 11.7).abs() < 1e-9);
        // the line through the tips of the end stems, at the new x
        let on_beam = -6.5 + (g.abs.x - 2.0) * 4.0 / 18.0;
        assert!((g.stem_tip_y() - on_beam).abs() < 1e-9);
        assert!(g.stem_len < 4.5);
    }

    #[test]
    fn test_shift_along_steep_beam_cannot_invert_stem() {
        let mut tl = beam_across(Some(3.0));
        let err = avoid_collisions(&mut tl, CrossGroup { id: GroupId(1), other: 1 }).unwrap_err();
        assert!(matches!(err, Error::StemNegative { .. }));
    }
}
