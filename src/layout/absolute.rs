//! Turn a planned page into absolute page coordinates.
//!
//! Leftover height is handed out in two water-filling passes: first to the
//! ink-free padding at the page edges and between systems, then to the
//! staff-line separations between systems. The systems are then walked top
//! to bottom and every record gets its `abs` box.

use super::grids;
use super::page::{Page, PageFrame};
use super::paginate::{Gap, PagePlan, PlannedSystem};
use super::slack::{water_fill, Level};
use crate::error::{Error, Result};
use crate::timeline::geometry::Point;
use crate::timeline::records::{Anchor, SlashMarker};
use crate::timeline::{Bbox, ParameterContext, Record, Timeline};
use std::collections::BTreeMap;

/// Ink-free space above each system and below the last one
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpacing {
    /// Pad above each system, the first one measured from the page top
    pub above: Vec<f64>,
    pub bottom: f64,
    /// Height neither pass could use
    pub leftover: f64,
}

/// Run both slack passes over a planned page.
pub fn distribute_slack(plan: &PagePlan) -> PageSpacing {
    let (edge_min, edge_max) = plan.edge_pad;
    let gaps: Vec<Option<Gap>> = plan.systems.iter().map(|s| s.gap).collect();

    let mut pads: Vec<Level> = Vec::with_capacity(gaps.len() + 1);
    for gap in &gaps {
        pads.push(match gap {
            None => Level::new(edge_min, edge_max),
            Some(g) if g.forced => Level::fixed(g.min_pad),
            Some(g) => Level::new(g.min_pad, g.max_pad),
        });
    }
    pads.push(Level::new(edge_min, edge_max));
    let leftover = water_fill(&mut pads, plan.remaining);

    let mut seps: Vec<Level> = gaps
        .iter()
        .zip(&pads)
        .filter_map(|(gap, pad)| {
            gap.map(|g| {
                let sep = g.separation(pad.value);
                if g.forced {
                    Level::fixed(sep)
                } else {
                    Level::new(sep, g.max_sep)
                }
            })
        })
        .collect();
    let leftover = water_fill(&mut seps, leftover);

    let mut above = Vec::with_capacity(gaps.len());
    let mut sep_iter = seps.iter();
    for (gap, pad) in gaps.iter().zip(&pads) {
        let value = match gap {
            Some(g) => sep_iter
                .next()
                .map_or(pad.value, |sep| sep.value - g.upper_overflow - g.lower_overflow),
            None => pad.value,
        };
        above.push(value);
    }
    log::debug!("page pads {:?}, {:.3} left over", above, leftover);

    PageSpacing {
        above,
        bottom: pads.last().map_or(edge_min, |l| l.value),
        leftover,
    }
}

/// Staff middle lines of one system, as absolute y
type StaffLines = BTreeMap<usize, f64>;

/// Place every system of `plan` and return the finished page.
pub fn place_page(
    timeline: &mut Timeline,
    ctx: &mut ParameterContext,
    plan: &PagePlan,
) -> Result<Page> {
    let frame = &plan.frame;
    let spacing = distribute_slack(plan);
    let mut page = Page::from_frame(frame);

    let mut y = frame.top_y;
    let mut previous: Option<PreviousSystem> = None;
    for (k, planned) in plan.systems.iter().enumerate() {
        y -= spacing.above[k];
        let origin = y - planned.slot.north;
        ctx.advance_to(timeline, planned.slot.record)?;
        let lines = stamp_system(timeline, ctx, planned, frame, origin)?;
        if let Some(prev) = &previous {
            place_slashes(timeline, ctx, planned, prev, &lines, origin, frame);
        }
        previous = Some(PreviousSystem::new(ctx, planned, &lines, origin));
        page.systems.push(planned.slot.record);
        y = origin + planned.slot.south;
    }

    if let Some(block) = &plan.grids {
        let top = if plan.systems.is_empty() {
            y - plan.edge_pad.0
        } else {
            y - block.min_pad
        };
        page.grids = grids::place_rows(&block.plan, &block.rows, &timeline.grids, frame, top);
    }

    log::debug!(
        "page {}: {} systems, {} grids",
        page.number,
        page.systems.len(),
        page.grids.len()
    );
    Ok(page)
}

/// Where the bottom staff of the system above ended, for slash markers
struct PreviousSystem {
    bottom_line: f64,
}

impl PreviousSystem {
    fn new(
        ctx: &ParameterContext,
        planned: &PlannedSystem,
        lines: &StaffLines,
        origin: f64,
    ) -> Self {
        let last = planned.slot.last_visible;
        let bottom_line = match lines.get(&last) {
            Some(&center) => center - ctx.staff_half_height(last),
            None => origin + planned.slot.south,
        };
        Self { bottom_line }
    }
}

/// Give every record of one system its absolute box. Returns the middle
/// line of each staff.
fn stamp_system(
    timeline: &mut Timeline,
    ctx: &ParameterContext,
    planned: &PlannedSystem,
    frame: &PageFrame,
    origin: f64,
) -> Result<StaffLines> {
    let range = planned.slot.range.clone();
    let mut lines = StaffLines::new();
    for record in &timeline.records[range.clone()] {
        if let Record::Staff(staff) = record {
            lines.entry(staff.staff).or_insert(origin + staff.rel.y);
        }
    }

    let first = planned.slot.first_visible;
    let last = planned.slot.last_visible;
    let bar_top = lines.get(&first).map(|c| c + ctx.staff_half_height(first));
    let bar_bottom = lines.get(&last).map(|c| c - ctx.staff_half_height(last));

    let Timeline {
        records,
        groups,
        stuff,
        ..
    } = timeline;
    for record in &mut records[range.clone()] {
        match record {
            Record::Params(_) => {}
            Record::SystemBreak(sb) => {
                let (left, right) = match sb.margins {
                    Some(m) => (m.left, m.right),
                    None => (frame.left, frame.right),
                };
                sb.abs = Bbox::new(
                    left,
                    origin,
                    origin + sb.rel.n,
                    origin + sb.rel.s,
                    frame.page_width - right,
                    left,
                );
                sb.page = Some(frame.number);
            }
            Record::ClefKeySig(c) => c.abs = c.rel.offset_from(origin),
            Record::ChordAnchor(c) => c.abs = c.rel.offset_from(origin),
            Record::Block(b) => b.abs = b.rel.offset_from(origin),
            Record::Free(item) => {
                let base = match item.anchor {
                    Anchor::System => origin,
                    Anchor::Staff(n) => *lines.get(&n).ok_or_else(|| {
                        Error::internal(format!(
                            "system at record {}: free item anchored to missing staff {n}",
                            range.start
                        ))
                    })?,
                };
                item.abs = item.rel.offset_from(base);
                item.abs_points = absolute_points(&item.points, base, &lines);
            }
            Record::BarLine(bar) => {
                let (n, s) = match (bar_top, bar_bottom) {
                    (Some(n), Some(s)) => (n, s),
                    _ => (origin + planned.slot.north, origin + planned.slot.south),
                };
                bar.abs = Bbox::new(bar.x, (n + s) / 2.0, n, s, bar.x, bar.x);
            }
            Record::Staff(staff) => {
                let center = origin + staff.rel.y;
                staff.abs = Bbox::new(
                    staff.rel.x,
                    center,
                    center + staff.rel.n,
                    center + staff.rel.s,
                    staff.rel.e,
                    staff.rel.w,
                );
                for id in staff.group_ids() {
                    let group = groups.get_mut(id.0).ok_or_else(|| {
                        Error::internal(format!("dangling group handle {}", id.0))
                    })?;
                    group.abs = group.rel.offset_from(center);
                    for note in &mut group.notes {
                        note.abs = note.rel.offset_from(center);
                        if let Some(dot) = &mut note.dot {
                            dot.abs_y = center + dot.rel_y;
                        }
                    }
                }
                for id in &staff.stuff {
                    let item = stuff.get_mut(id.0).ok_or_else(|| {
                        Error::internal(format!("dangling annotation handle {}", id.0))
                    })?;
                    item.abs = item.rel.offset_from(center);
                    item.abs_points = absolute_points(&item.points, center, &lines);
                }
            }
        }
    }
    Ok(lines)
}

/// Curve points relative to `base`, or to their own staff when named
fn absolute_points(points: &[Point], base: f64, lines: &StaffLines) -> Vec<Point> {
    points
        .iter()
        .map(|p| {
            let from = p.staff.and_then(|n| lines.get(&n).copied()).unwrap_or(base);
            Point {
                x: p.x,
                y: from + p.y,
                staff: p.staff,
            }
        })
        .collect()
}

/// Position the slash marker printed between the previous system and this one.
fn place_slashes(
    timeline: &mut Timeline,
    ctx: &ParameterContext,
    planned: &PlannedSystem,
    prev: &PreviousSystem,
    lines: &StaffLines,
    origin: f64,
    frame: &PageFrame,
) {
    let slot = &planned.slot;
    let first = slot.first_visible;
    let top_line = lines
        .get(&first)
        .map_or(origin + slot.north, |c| c + ctx.staff_half_height(first));
    let upper_clear = prev.bottom_line - prev_clef_below(planned);
    let lower_clear = top_line + slot.clef_above + slot.measnum_height;

    let Some(sb) = timeline.system_break_mut(slot.record) else {
        return;
    };
    let Some(marker) = sb.slashes.as_mut() else {
        return;
    };
    let center = if marker.auto_place {
        let middle = (prev.bottom_line + top_line) / 2.0;
        auto_slash_center(marker, middle, upper_clear, lower_clear)
    } else {
        origin + marker.rel_y
    };
    let half = marker.height / 2.0;
    marker.abs = Bbox::new(
        frame.left / 2.0,
        center,
        center + half,
        center - half,
        frame.left,
        0.0,
    );
}

fn prev_clef_below(planned: &PlannedSystem) -> f64 {
    planned.gap.map_or(0.0, |g| g.upper_clef_below)
}

/// Center a marker between two staff lines, kept below `upper` and above
/// `lower`. The lower bound wins when both cannot hold.
fn auto_slash_center(marker: &SlashMarker, middle: f64, upper: f64, lower: f64) -> f64 {
    let half = marker.height / 2.0;
    let mut center = middle;
    if center + half > upper {
        center = upper - half;
    }
    if center - half < lower {
        center = lower + half;
    }
    center
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::paginate::{PlannedGrids, SystemSlot};
    use crate::layout::LayoutOptions;
    use crate::timeline::records::Decorations;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn slot(record: usize, height: f64) -> SystemSlot {
        SystemSlot {
            record,
            range: record..record + 1,
            loc: Default::default(),
            north: height / 2.0,
            south: -height / 2.0,
            top_overflow: 0.0,
            bottom_overflow: 0.0,
            clef_above: 0.0,
            clef_below: 0.0,
            measnum_height: 0.0,
            slash_height: None,
            forced_sep: None,
            page_break: false,
            zone_begin: false,
            zone_end: false,
            block: false,
            first_visible: 1,
            last_visible: 1,
        }
    }

    fn gap(min_pad: f64, max_pad: f64, max_sep: f64) -> Gap {
        Gap {
            upper_overflow: 0.0,
            lower_overflow: 0.0,
            upper_clef_below: 0.0,
            min_pad,
            max_pad,
            max_sep,
            forced: false,
        }
    }

    fn plan(systems: Vec<PlannedSystem>, remaining: f64) -> PagePlan {
        let ctx = ParameterContext::new();
        PagePlan {
            frame: PageFrame::new(0, &ctx, &Decorations::default(), &LayoutOptions::default()),
            systems,
            edge_pad: (1.0, 5.0),
            grids: None,
            remaining,
        }
    }

    #[test]
    fn test_even_gaps_use_all_slack() {
        // heights 10, 12, 9 in 40: 9 units over four pads of at least 1
        let p = plan(
            vec![
                PlannedSystem { slot: slot(0, 10.0), gap: None },
                PlannedSystem { slot: slot(1, 12.0), gap: Some(gap(1.0, 5.0, 10.0)) },
                PlannedSystem { slot: slot(2, 9.0), gap: Some(gap(1.0, 5.0, 10.0)) },
            ],
            5.0,
        );
        let spacing = distribute_slack(&p);
        for pad in spacing.above.iter().chain(std::iter::once(&spacing.bottom)) {
            assert!(close(*pad, 2.25));
        }
        assert!(close(spacing.leftover, 0.0));
    }

    #[test]
    fn test_second_pass_widens_separations() {
        // pads cap at 2, leaving 4 units for the separations (max 5)
        let mut p = plan(
            vec![
                PlannedSystem { slot: slot(0, 10.0), gap: None },
                PlannedSystem { slot: slot(1, 10.0), gap: Some(gap(1.0, 2.0, 5.0)) },
            ],
            7.0,
        );
        p.edge_pad = (1.0, 2.0);
        let spacing = distribute_slack(&p);
        assert!(close(spacing.above[0], 2.0));
        assert!(close(spacing.above[1], 5.0));
        assert!(close(spacing.bottom, 2.0));
        assert!(close(spacing.leftover, 1.0));
    }

    #[test]
    fn test_forced_gap_is_not_stretched() {
        let mut forced = gap(3.0, 3.0, 3.0);
        forced.forced = true;
        let p = plan(
            vec![
                PlannedSystem { slot: slot(0, 10.0), gap: None },
                PlannedSystem { slot: slot(1, 10.0), gap: Some(forced) },
            ],
            6.0,
        );
        let spacing = distribute_slack(&p);
        assert!(close(spacing.above[1], 3.0));
        assert!(close(spacing.above[0], 4.0));
        assert!(close(spacing.bottom, 4.0));
    }

    #[test]
    fn test_slash_marker_clamped_above_clef() {
        let marker = SlashMarker {
            auto_place: true,
            height: 2.0,
            ..SlashMarker::default()
        };
        // centered would be 10; the lower system's clef reaches up to 10
        assert_eq!(auto_slash_center(&marker, 10.0, 20.0, 10.0), 11.0);
        assert_eq!(auto_slash_center(&marker, 10.0, 20.0, 0.0), 10.0);
        assert_eq!(auto_slash_center(&marker, 10.0, 10.5, 0.0), 9.5);
    }

    #[test]
    fn test_grid_only_page() {
        let grids_plan = grids::GridPlan {
            order: vec![0],
            cell_width: 2.0,
            cell_height: 2.0,
            per_row: 1,
            rows: 1,
        };
        let mut p = plan(Vec::new(), 0.0);
        p.grids = Some(PlannedGrids {
            plan: grids_plan,
            rows: grids::GridRows { first_row: 0, count: 1, pitch: 2.0 },
            min_pad: 0.0,
        });
        let mut tl = Timeline {
            grids: vec![Default::default()],
            ..Timeline::default()
        };
        let mut ctx = ParameterContext::new();
        let page = place_page(&mut tl, &mut ctx, &p).unwrap();
        assert_eq!(page.grids.len(), 1);
        assert!(close(page.grids[0].abs.n, p.frame.top_y - 1.0));
    }
}
