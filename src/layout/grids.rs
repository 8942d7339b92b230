//! Chord grids printed at the end of the score
//!
//! All grids share one cell size, the largest footprint among them. Cells
//! are packed in rows; rows go on the last page of music when they fit,
//! otherwise on pages of their own.

use super::page::{PageFrame, PlacedGrid};
use crate::timeline::geometry::FUDGE;
use crate::timeline::records::ChordGrid;
use crate::timeline::{Bbox, ParamId, ParameterContext};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Rank of the accidental following the letter of a grid name
fn accidental_rank(rest: &str) -> (u8, &str) {
    const SPELLINGS: [(&str, u8); 11] = [
        ("&&", 0),
        ("bb", 0),
        ("\u{1d12b}", 0),
        ("##", 4),
        ("x", 4),
        ("\u{1d12a}", 4),
        ("&", 1),
        ("b", 1),
        ("\u{266d}", 1),
        ("#", 3),
        ("\u{266f}", 3),
    ];
    for (spelling, rank) in SPELLINGS {
        if let Some(tail) = rest.strip_prefix(spelling) {
            return (rank, tail);
        }
    }
    (2, rest)
}

fn sort_key(name: &str) -> (Option<char>, u8, String) {
    let mut chars = name.chars();
    let letter = chars.next().map(|c| c.to_ascii_lowercase());
    let (rank, rest) = accidental_rank(chars.as_str());
    (letter, rank, rest.to_lowercase())
}

/// Order grid names by letter, then accidental from double flat to double
/// sharp, then the rest of the name ignoring case. Names equal on all three
/// are ordered case-sensitively.
pub fn grid_name_cmp(a: &str, b: &str) -> Ordering {
    sort_key(a).cmp(&sort_key(b)).then_with(|| a.cmp(b))
}

/// Number of grids per row: the widest row that fits, then as narrow as
/// possible without needing another row.
pub fn grids_per_row(count: usize, available_width: f64, cell_width: f64) -> usize {
    if count == 0 {
        return 0;
    }
    let fit = ((available_width + FUDGE) / cell_width).floor();
    let mut per_row = if fit < 1.0 {
        log::warn!("chord grids are wider than the page");
        1
    } else {
        (fit as usize).min(count)
    };
    let rows = count.div_ceil(per_row);
    while per_row > 1 && count.div_ceil(per_row - 1) == rows {
        per_row -= 1;
    }
    per_row
}

/// Size and arrangement of the grid block
#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan {
    /// Indices into `Timeline::grids`, in print order
    pub order: Vec<usize>,
    pub cell_width: f64,
    pub cell_height: f64,
    pub per_row: usize,
    pub rows: usize,
}

impl GridPlan {
    /// Height of all rows packed tightly
    pub fn height(&self) -> f64 {
        self.rows as f64 * self.cell_height
    }
}

/// Rows of the grid block that go on one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRows {
    pub first_row: usize,
    pub count: usize,
    /// Distance from the top of one row to the top of the next
    pub pitch: f64,
}

/// Sort and size the grids. `None` when there is nothing to print.
pub fn plan_grids(
    grids: &[ChordGrid],
    ctx: &ParameterContext,
    available_width: f64,
) -> Option<GridPlan> {
    let mut seen = HashSet::new();
    let mut order: Vec<usize> = Vec::new();
    for (i, grid) in grids.iter().enumerate() {
        if seen.insert(grid.name.as_str()) {
            order.push(i);
        } else {
            log::warn!("chord grid '{}' listed more than once", grid.name);
        }
    }
    if order.is_empty() {
        return None;
    }
    order.sort_by(|&a, &b| grid_name_cmp(&grids[a].name, &grids[b].name));

    let scale = ctx.num(ParamId::GridScale);
    let pad = ctx.num(ParamId::GridPad);
    let widest = order.iter().map(|&i| grids[i].width).fold(0.0, f64::max);
    let tallest = order
        .iter()
        .map(|&i| grids[i].height + grids[i].name_height)
        .fold(0.0, f64::max);
    let cell_width = (widest + 2.0 * pad) * scale;
    let cell_height = (tallest + 2.0 * pad) * scale;

    let per_row = grids_per_row(order.len(), available_width, cell_width);
    let rows = order.len().div_ceil(per_row);
    log::debug!(
        "{} chord grids: {} per row, {} rows of {:.2}",
        order.len(),
        per_row,
        rows,
        cell_height
    );
    Some(GridPlan {
        order,
        cell_width,
        cell_height,
        per_row,
        rows,
    })
}

/// Split the rows over dedicated pages. `available` gives the music area
/// height of the n-th dedicated page.
///
/// When more than one full page is needed the rows of each full page are
/// spread over its height, and a final partial page reuses that spacing.
pub fn split_pages(plan: &GridPlan, mut available: impl FnMut(usize) -> f64) -> Vec<GridRows> {
    let mut pages: Vec<GridRows> = Vec::new();
    let mut next_row = 0;
    while next_row < plan.rows {
        let height = available(pages.len());
        let fit = (((height + FUDGE) / plan.cell_height).floor() as usize).max(1);
        let count = fit.min(plan.rows - next_row);
        pages.push(GridRows {
            first_row: next_row,
            count,
            pitch: plan.cell_height,
        });
        next_row += count;
    }

    if pages.len() > 1 {
        let mut pitch = plan.cell_height;
        for (k, page) in pages.iter_mut().enumerate() {
            let full = ((available(k) + FUDGE) / plan.cell_height).floor() as usize;
            if page.count >= full.max(1) {
                pitch = available(k) / page.count as f64;
            }
            page.pitch = pitch;
        }
    }
    pages
}

/// Boxes of the grids in `rows`, hanging from `top_y`, centered between
/// the page margins.
pub fn place_rows(
    plan: &GridPlan,
    rows: &GridRows,
    grids: &[ChordGrid],
    frame: &PageFrame,
    top_y: f64,
) -> Vec<PlacedGrid> {
    let row_width = plan.per_row as f64 * plan.cell_width;
    let start_x = frame.left + (frame.width() - row_width).max(0.0) / 2.0;
    let mut placed = Vec::new();
    for r in 0..rows.count {
        let row = rows.first_row + r;
        let n = top_y - r as f64 * rows.pitch;
        let first = row * plan.per_row;
        let last = (first + plan.per_row).min(plan.order.len());
        for (col, &grid) in plan.order[first..last].iter().enumerate() {
            let w = start_x + col as f64 * plan.cell_width;
            let s = n - plan.cell_height;
            placed.push(PlacedGrid {
                grid,
                name: grids[grid].name.clone(),
                abs: Bbox::new(
                    w + plan.cell_width / 2.0,
                    (n + s) / 2.0,
                    n,
                    s,
                    w + plan.cell_width,
                    w,
                ),
            });
        }
    }
    placed
}
