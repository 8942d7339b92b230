//! Place the staves of each system relative to the system.
//!
//! On input every staff box is relative to its own middle line. Afterwards
//! `StaffContent::rel.y` is the offset of that middle line from the system
//! origin (the middle line of the top visible staff), and between-staff
//! items are relative to the staff above them.

use crate::error::{Error, Result};
use crate::timeline::geometry::STDPAD;
use crate::timeline::records::{ClefKeySig, Place};
use crate::timeline::{ParamId, ParameterContext, Record, StuffId, Timeline};
use std::collections::BTreeMap;
use std::ops::Range;

/// Vertical needs of one staff over all measures of a system
#[derive(Debug, Clone, Copy)]
struct StaffExtent {
    half_height: f64,
    /// Highest ink, relative to the middle line
    above: f64,
    /// Lowest ink, relative to the middle line (negative)
    below: f64,
    between: f64,
}

impl StaffExtent {
    fn overhang_above(&self) -> f64 {
        (self.above - self.half_height).max(0.0)
    }

    fn overhang_below(&self) -> f64 {
        (-self.below - self.half_height).max(0.0)
    }
}

/// Final vertical position of one visible staff
#[derive(Debug, Clone, Copy)]
struct Placed {
    staff: usize,
    offset: f64,
    extent: StaffExtent,
}

pub fn position_systems(timeline: &mut Timeline, ctx: &mut ParameterContext) -> Result<()> {
    for system in timeline.systems() {
        ctx.advance_to(timeline, system.start)?;
        position_system(timeline, ctx, system)?;
    }
    Ok(())
}

fn position_system(
    timeline: &mut Timeline,
    ctx: &ParameterContext,
    system: Range<usize>,
) -> Result<()> {
    let extents = collect_extents(timeline, ctx, system.clone());

    if extents.is_empty() {
        return position_block(timeline, system);
    }

    let clefsig = timeline.records[system.clone()].iter().find_map(|r| match r {
        Record::ClefKeySig(c) => Some(c.clone()),
        _ => None,
    });
    let placed = stack_staffs(&extents, ctx, clefsig.as_ref());
    log::debug!(
        "system at record {}: staff offsets {:?}",
        system.start,
        placed.iter().map(|p| (p.staff, p.offset)).collect::<Vec<_>>()
    );

    let mut moves: Vec<(StuffId, f64)> = Vec::new();
    let mut last_offset = 0.0;
    for i in system.clone() {
        if let Record::Staff(staff) = &mut timeline.records[i] {
            let pos = placed.iter().position(|p| p.staff == staff.staff);
            let Some(k) = pos.filter(|_| staff.visible) else {
                staff.rel.y = last_offset;
                continue;
            };
            let here = placed[k];
            staff.rel.y = here.offset;
            last_offset = here.offset;

            let center = between_center(&here, placed.get(k + 1), staff.between_height);
            for &id in &staff.stuff {
                moves.push((id, center - here.offset));
            }
        }
    }
    for (id, dy) in moves {
        let item = &mut timeline.stuff[id.0];
        if item.place == Place::Between && !item.anchored {
            item.rel.shift_y(dy);
            item.anchored = true;
        }
    }

    let first = placed[0];
    let last = placed[placed.len() - 1];
    let bottom = last.offset + last.extent.below - last.extent.between;
    let Some(sb) = timeline.system_break_mut(system.start) else {
        return Err(Error::internal(format!(
            "record {} is not a system break",
            system.start
        )));
    };
    sb.rel.y = 0.0;
    sb.rel.n = first.extent.above;
    sb.rel.s = bottom;
    sb.first_visible = first.staff;
    sb.last_visible = last.staff;
    sb.top_overflow = first.extent.overhang_above();
    sb.bottom_overflow = (last.offset - last.extent.half_height - bottom).max(0.0);
    Ok(())
}

fn collect_extents(
    timeline: &Timeline,
    ctx: &ParameterContext,
    system: Range<usize>,
) -> BTreeMap<usize, StaffExtent> {
    let mut extents: BTreeMap<usize, StaffExtent> = BTreeMap::new();
    for record in &timeline.records[system] {
        let Record::Staff(staff) = record else { continue };
        if !staff.visible {
            continue;
        }
        let half_height = ctx.staff_half_height(staff.staff);
        let ext = extents.entry(staff.staff).or_insert(StaffExtent {
            half_height,
            above: half_height,
            below: -half_height,
            between: 0.0,
        });
        ext.above = ext.above.max(staff.rel.n);
        ext.below = ext.below.min(staff.rel.s);
        ext.between = ext.between.max(staff.between_height);
    }
    extents
}

/// Walk the visible staffs top to bottom accumulating offsets.
fn stack_staffs(
    extents: &BTreeMap<usize, StaffExtent>,
    ctx: &ParameterContext,
    clefsig: Option<&ClefKeySig>,
) -> Vec<Placed> {
    let mut placed: Vec<Placed> = Vec::with_capacity(extents.len());
    for (&staff, &extent) in extents {
        let offset = match placed.last() {
            None => 0.0,
            Some(prev) => {
                let gap = staff_gap(prev, staff, &extent, ctx, clefsig);
                prev.offset - (prev.extent.half_height + gap + extent.half_height)
            }
        };
        placed.push(Placed { staff, offset, extent });
    }
    placed
}

/// Distance between the bottom line of `prev` and the top line of `staff`
fn staff_gap(
    prev: &Placed,
    staff: usize,
    extent: &StaffExtent,
    ctx: &ParameterContext,
    clefsig: Option<&ClefKeySig>,
) -> f64 {
    let needed = prev.extent.overhang_below()
        + prev.extent.between
        + extent.overhang_above()
        + ctx.staff_num(Some(prev.staff), ParamId::StaffPad);
    let clearance = clefsig
        .map(|c| c.below(prev.staff) + c.above(staff) + STDPAD)
        .unwrap_or(0.0);
    let limit = ctx.staff_num(Some(prev.staff), ParamId::StaffSep).max(clearance);
    limit.max(needed)
}

/// Center of the between region below `upper`, relative to the system.
///
/// The region starts centered between the two staffs and is then pushed
/// away from whichever staff's ink sticks out into it.
fn between_center(upper: &Placed, lower: Option<&Placed>, height: f64) -> f64 {
    let half = height / 2.0;
    let top_limit = upper.offset + upper.extent.below;
    let Some(lower) = lower else {
        return top_limit - half;
    };
    let bottom_limit = lower.offset + lower.extent.above;
    let upper_line = upper.offset - upper.extent.half_height;
    let lower_line = lower.offset + lower.extent.half_height;

    let mut center = (upper_line + lower_line) / 2.0;
    if center + half > top_limit {
        center = top_limit - half;
    }
    if center - half < bottom_limit {
        center = bottom_limit + half;
    }
    center
}

/// A system holding a block instead of staffs
fn position_block(timeline: &mut Timeline, system: Range<usize>) -> Result<()> {
    let height = timeline.records[system.clone()]
        .iter()
        .find_map(|r| match r {
            Record::Block(b) => Some(b.height),
            _ => None,
        })
        .ok_or_else(|| {
            Error::internal(format!(
                "system at record {} has no visible staff and no block",
                system.start
            ))
        })?;

    for i in system.clone() {
        if let Record::Block(block) = &mut timeline.records[i] {
            block.rel.y = 0.0;
            block.rel.n = height / 2.0;
            block.rel.s = -height / 2.0;
        }
    }
    if let Some(sb) = timeline.system_break_mut(system.start) {
        sb.rel.y = 0.0;
        sb.rel.n = height / 2.0;
        sb.rel.s = -height / 2.0;
        sb.first_visible = 0;
        sb.last_visible = 0;
        sb.top_overflow = 0.0;
        sb.bottom_overflow = 0.0;
    }
    Ok(())
}

/// True when `system` holds a block instead of visible staffs
pub fn is_block_system(timeline: &Timeline, system: Range<usize>) -> bool {
    let records = &timeline.records[system];
    !records.iter().any(|r| matches!(r, Record::Staff(s) if s.visible))
        && records.iter().any(|r| matches!(r, Record::Block(_)))
}
