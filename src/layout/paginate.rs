//! Decide which systems go on which page.
//!
//! Systems are packed greedily using their minimum spacing. A run of
//! systems marked to stay on one page is packed speculatively from a
//! checkpoint; if it overflows the page the packing rolls back to the
//! checkpoint and the whole run starts on the next page.

use super::grids::{self, GridPlan, GridRows};
use super::page::PageFrame;
use super::relative::is_block_system;
use super::LayoutOptions;
use crate::error::{Error, Result};
use crate::timeline::geometry::{FUDGE, STDPAD};
use crate::timeline::params::ContextSnapshot;
use crate::timeline::records::{ClefKeySig, ZoneMark};
use crate::timeline::{InputLocation, ParamId, ParameterContext, Record, Timeline};
use std::ops::Range;

/// What pagination needs to know about one system
#[derive(Debug, Clone)]
pub struct SystemSlot {
    /// Index of the system break record
    pub record: usize,
    pub range: Range<usize>,
    pub loc: InputLocation,
    /// Ink above the system origin
    pub north: f64,
    /// Ink below the system origin (negative)
    pub south: f64,
    pub top_overflow: f64,
    pub bottom_overflow: f64,
    /// Clef glyphs above the first staff and below the last
    pub clef_above: f64,
    pub clef_below: f64,
    pub measnum_height: f64,
    pub slash_height: Option<f64>,
    pub forced_sep: Option<f64>,
    pub first_visible: usize,
    pub last_visible: usize,
    pub page_break: bool,
    pub zone_begin: bool,
    pub zone_end: bool,
    pub block: bool,
}

impl SystemSlot {
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    fn from_timeline(timeline: &Timeline, range: Range<usize>) -> Result<Self> {
        let sb = timeline.system_break(range.start).ok_or_else(|| {
            Error::internal(format!("record {} is not a system break", range.start))
        })?;
        let records = &timeline.records[range.clone()];
        let clefsig: Option<&ClefKeySig> = records.iter().find_map(|r| match r {
            Record::ClefKeySig(c) => Some(c),
            _ => None,
        });
        let (begins_here, _) = begin_marks(records);
        let ends = records.iter().any(|r| r.zone_mark() == Some(ZoneMark::End));

        Ok(Self {
            record: range.start,
            range: range.clone(),
            loc: sb.loc.clone(),
            north: sb.rel.n,
            south: sb.rel.s,
            top_overflow: sb.top_overflow,
            bottom_overflow: sb.bottom_overflow,
            clef_above: clefsig.map_or(0.0, |c| c.above(sb.first_visible)),
            clef_below: clefsig.map_or(0.0, |c| c.below(sb.last_visible)),
            measnum_height: sb.measnum_height,
            slash_height: sb.slashes.as_ref().map(|s| s.height),
            forced_sep: sb.forced_sep,
            first_visible: sb.first_visible,
            last_visible: sb.last_visible,
            page_break: sb.page_break,
            zone_begin: begins_here,
            zone_end: ends,
            block: is_block_system(timeline, range),
        })
    }
}

/// Space between two consecutive systems on a page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    /// Ink of the upper system below its last staff line
    pub upper_overflow: f64,
    /// Ink of the lower system above its first staff line
    pub lower_overflow: f64,
    /// Clef glyphs hanging below the upper system
    pub upper_clef_below: f64,
    /// Smallest allowed ink-free distance
    pub min_pad: f64,
    /// Ink-free distance the padding pass may grow to
    pub max_pad: f64,
    /// Staff-line distance the separation pass may grow to
    pub max_sep: f64,
    /// Set by the user; never stretched
    pub forced: bool,
}

impl Gap {
    pub fn between(upper: &SystemSlot, lower: &SystemSlot, ctx: &ParameterContext) -> Self {
        let bo = upper.bottom_overflow;
        let to = lower.top_overflow;
        if let Some(forced) = lower.forced_sep {
            let pad = forced - bo - to;
            return Self {
                upper_overflow: bo,
                lower_overflow: to,
                upper_clef_below: upper.clef_below,
                min_pad: pad,
                max_pad: pad,
                max_sep: forced,
                forced: true,
            };
        }

        let mut clearance = upper.clef_below + lower.clef_above + lower.measnum_height + STDPAD;
        if ctx.flag(ParamId::SlashesBetween) {
            clearance += lower
                .slash_height
                .unwrap_or_else(|| ctx.num(ParamId::SlashHeight));
        }
        let sep_min = ctx.num(ParamId::MinScoreSep).max(clearance);
        let min_pad = ctx.num(ParamId::MinScorePad).max(sep_min - bo - to);
        let max_sep = ctx.num(ParamId::MaxScoreSep);
        let max_pad = min_pad.max(ctx.num(ParamId::MaxScorePad).min(max_sep - bo - to));
        Self {
            upper_overflow: bo,
            lower_overflow: to,
            upper_clef_below: upper.clef_below,
            min_pad,
            max_pad,
            max_sep: max_sep.max(bo + min_pad + to),
            forced: false,
        }
    }

    /// Staff-line distance for a given ink-free distance
    pub fn separation(&self, pad: f64) -> f64 {
        self.upper_overflow + pad + self.lower_overflow
    }
}

/// One system on a planned page
#[derive(Debug, Clone)]
pub struct PlannedSystem {
    pub slot: SystemSlot,
    /// Gap above this system; `None` for the first on the page
    pub gap: Option<Gap>,
}

/// Trailing chord grids on a planned page
#[derive(Debug, Clone)]
pub struct PlannedGrids {
    pub plan: GridPlan,
    pub rows: GridRows,
    /// Minimum space between the last system and the grids
    pub min_pad: f64,
}

/// Contents of one page before absolute placement
#[derive(Debug, Clone)]
pub struct PagePlan {
    pub frame: PageFrame,
    pub systems: Vec<PlannedSystem>,
    pub edge_pad: (f64, f64),
    pub grids: Option<PlannedGrids>,
    /// Height left over after packing at minimum spacing
    pub remaining: f64,
}

/// Saved packing state at the start of a same-page zone
#[derive(Debug)]
struct Checkpoint {
    remaining: f64,
    page_len: usize,
    system_index: usize,
    ctx: ContextSnapshot,
}

/// The page currently being filled
struct OpenPage {
    plan: PagePlan,
    max_systems: usize,
}

impl OpenPage {
    fn new(
        index: usize,
        timeline: &Timeline,
        ctx: &ParameterContext,
        options: &LayoutOptions,
    ) -> Self {
        let frame = PageFrame::new(index, ctx, &timeline.decorations, options);
        let min_pad = ctx.num(ParamId::MinScorePad);
        let max_pad = ctx.num(ParamId::MaxScorePad).max(min_pad);
        Self {
            plan: PagePlan {
                frame,
                systems: Vec::new(),
                edge_pad: (min_pad, max_pad),
                grids: None,
                remaining: frame.available - 2.0 * min_pad,
            },
            max_systems: ctx.num(ParamId::MaxScores).max(1.0) as usize,
        }
    }

    fn is_empty(&self) -> bool {
        self.plan.systems.is_empty()
    }

    fn checkpoint(&self, system_index: usize, ctx: &ParameterContext) -> Checkpoint {
        Checkpoint {
            remaining: self.plan.remaining,
            page_len: self.plan.systems.len(),
            system_index,
            ctx: ctx.snapshot(),
        }
    }

    /// Undo every placement made since `cp`. Returns the system to resume from.
    fn rollback(&mut self, cp: Checkpoint, ctx: &mut ParameterContext) -> usize {
        self.plan.systems.truncate(cp.page_len);
        self.plan.remaining = cp.remaining;
        ctx.restore(cp.ctx);
        cp.system_index
    }

    fn place_first(&mut self, slot: &SystemSlot) -> Result<()> {
        if slot.height() > self.plan.remaining + FUDGE {
            return Err(Error::SystemTooTall {
                loc: slot.loc.clone(),
                height: slot.height(),
                available: self.plan.remaining,
            });
        }
        self.plan.remaining -= slot.height();
        self.plan.systems.push(PlannedSystem {
            slot: slot.clone(),
            gap: None,
        });
        Ok(())
    }

    /// Place `slot` below the last system if the page allows it.
    fn try_place(&mut self, slot: &SystemSlot, ctx: &ParameterContext) -> bool {
        let Some(last) = self.plan.systems.last() else {
            return false;
        };
        if slot.page_break || self.plan.systems.len() >= self.max_systems {
            return false;
        }
        let gap = Gap::between(&last.slot, slot, ctx);
        let need = slot.height() + gap.min_pad;
        if need > self.plan.remaining + FUDGE {
            return false;
        }
        self.plan.remaining -= need;
        self.plan.systems.push(PlannedSystem {
            slot: slot.clone(),
            gap: Some(gap),
        });
        true
    }
}

/// Begin marks of one system: those on its content, and one on the bar
/// closing its last measure, which opens the zone at the next system.
fn begin_marks(records: &[Record]) -> (bool, bool) {
    let mut here = false;
    let mut next = false;
    for (i, record) in records.iter().enumerate() {
        if record.zone_mark() != Some(ZoneMark::Begin) {
            continue;
        }
        let trailing_bar = matches!(record, Record::BarLine(_))
            && !records[i + 1..].iter().any(|r| matches!(r, Record::Staff(_)));
        if trailing_bar {
            next = true;
        } else {
            here = true;
        }
    }
    (here, next)
}

/// Measure every system of the timeline.
pub fn system_slots(timeline: &Timeline) -> Result<Vec<SystemSlot>> {
    let mut slots = Vec::new();
    let mut carried_begin = false;
    for range in timeline.systems() {
        let (_, begins_next) = begin_marks(&timeline.records[range.clone()]);
        let mut slot = SystemSlot::from_timeline(timeline, range)?;
        slot.zone_begin |= carried_begin;
        carried_begin = begins_next;
        slots.push(slot);
    }
    Ok(slots)
}

/// Pack all systems onto pages. The returned plans are in page order and
/// list every system exactly once, in timeline order.
pub fn assign_pages(
    timeline: &Timeline,
    ctx: &mut ParameterContext,
    options: &LayoutOptions,
) -> Result<Vec<PagePlan>> {
    let slots = system_slots(timeline)?;
    let mut plans: Vec<PagePlan> = Vec::new();
    if slots.is_empty() {
        return Ok(plans);
    }

    ctx.advance_to(timeline, slots[0].record)?;
    let mut page = OpenPage::new(0, timeline, ctx, options);
    let mut zone: Option<Checkpoint> = None;
    let mut k = 0;

    while k < slots.len() {
        let slot = &slots[k];
        ctx.advance_to(timeline, slot.record)?;
        if slot.zone_begin && zone.is_none() {
            zone = Some(page.checkpoint(k, ctx));
        }

        if page.is_empty() {
            page.place_first(slot)?;
        } else if !page.try_place(slot, ctx) {
            match zone.take() {
                Some(cp) if cp.page_len > 0 => {
                    log::debug!(
                        "samepage zone at {} moves to the next page",
                        slots[cp.system_index].loc
                    );
                    k = page.rollback(cp, ctx);
                    plans.push(page.plan);
                    page = OpenPage::new(plans.len(), timeline, ctx, options);
                    continue;
                }
                Some(cp) => {
                    return Err(Error::ZoneTooTall {
                        loc: slots[cp.system_index].loc.clone(),
                    });
                }
                None => {
                    plans.push(page.plan);
                    page = OpenPage::new(plans.len(), timeline, ctx, options);
                    page.place_first(slot)?;
                }
            }
        }

        if slot.zone_end {
            zone = None;
        }
        k += 1;
    }

    ctx.advance_to(timeline, timeline.records.len())?;
    let grid_plan = if ctx.flag(ParamId::GridsAtEnd) {
        grids::plan_grids(&timeline.grids, ctx, page.plan.frame.width())
    } else {
        None
    };
    let plans = match grid_plan {
        Some(plan) => finish_with_grids(plans, page, plan, timeline, ctx, options),
        None => {
            plans.push(page.plan);
            plans
        }
    };
    log::info!("{} systems on {} pages", slots.len(), plans.len());
    Ok(plans)
}

/// Put the grid block on the last page of music if it fits there, else on
/// pages of its own.
fn finish_with_grids(
    mut plans: Vec<PagePlan>,
    mut page: OpenPage,
    plan: GridPlan,
    timeline: &Timeline,
    ctx: &ParameterContext,
    options: &LayoutOptions,
) -> Vec<PagePlan> {
    let min_pad = ctx.num(ParamId::MinScorePad);
    if plan.height() + min_pad <= page.plan.remaining + FUDGE {
        log::debug!("chord grids fit on the last page");
        page.plan.remaining -= plan.height() + min_pad;
        let rows = GridRows {
            first_row: 0,
            count: plan.rows,
            pitch: plan.cell_height,
        };
        page.plan.grids = Some(PlannedGrids { plan, rows, min_pad });
        plans.push(page.plan);
        return plans;
    }

    plans.push(page.plan);
    let first_index = plans.len();
    let frames: Vec<PageFrame> = (0..plan.rows)
        .map(|k| PageFrame::new(first_index + k, ctx, &timeline.decorations, options))
        .collect();
    let split = grids::split_pages(&plan, |k| frames[k].available - 2.0 * min_pad);
    log::debug!("chord grids need {} pages of their own", split.len());
    for (k, rows) in split.into_iter().enumerate() {
        let frame = frames[k];
        let used = rows.count as f64 * rows.pitch;
        plans.push(PagePlan {
            frame,
            systems: Vec::new(),
            edge_pad: (min_pad, min_pad),
            grids: Some(PlannedGrids {
                plan: plan.clone(),
                rows,
                min_pad: 0.0,
            }),
            remaining: (frame.available - 2.0 * min_pad - used).max(0.0),
        });
    }
    plans
}
